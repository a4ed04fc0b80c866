//! Rhai-based script executor
//!
//! Learned skills are Rhai source text. A script can only reach the outside
//! world through the functions registered for the capabilities it was
//! granted; Rhai's own packages are pure (strings, math, arrays, maps) and
//! `eval`/`import`/`export` are disabled.

use anyhow::{anyhow, Result};
use rhai::{Dynamic, Engine, EvalAltResult};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::SkillsConfig;

/// One family of side-effecting functions a script may call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    FileSystem,
    Process,
    Http,
    Browser,
    Regex,
    Timer,
}

impl Capability {
    pub fn all() -> &'static [Capability] {
        &[
            Capability::FileSystem,
            Capability::Process,
            Capability::Http,
            Capability::Browser,
            Capability::Regex,
            Capability::Timer,
        ]
    }

    /// Signatures exposed by this capability, one per line
    pub fn functions(self) -> &'static [&'static str] {
        match self {
            Capability::FileSystem => &[
                "read_file(path) -> string",
                "write_file(path, content)",
                "append_file(path, content)",
                "file_exists(path) -> bool",
                "list_dir(path) -> array of #{name, path, is_dir}",
                "create_dir(path)",
                "delete_file(path)",
                "home_dir() -> string",
            ],
            Capability::Process => &[
                "run_command(cmd) -> #{success, stdout, stderr, code}",
                "launch(cmd)  // start without waiting",
                "list_processes() -> array of strings",
                "kill_process(name) -> bool",
            ],
            Capability::Http => &[
                "http_get(url) -> string",
                "http_post(url, body) -> string",
            ],
            Capability::Browser => &["open_url(url)"],
            Capability::Regex => &[
                "regex_match(pattern, text) -> bool",
                "regex_find(pattern, text) -> array of strings",
                "regex_replace(pattern, text, replacement) -> string",
            ],
            Capability::Timer => &[
                "sleep_ms(ms)",
                "now_ms() -> int",
                "timestamp() -> string",
            ],
        }
    }
}

/// Explicit allow-list of capabilities
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    /// Nothing beyond the pure language
    pub fn none() -> Self {
        Self::default()
    }

    /// The fixed set granted to learned skills
    pub fn standard() -> Self {
        Self(Capability::all().iter().copied().collect())
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.0.insert(capability);
        self
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    /// Function listing for prompts
    pub fn describe(&self) -> String {
        let mut lines = vec!["- print(text), log(text)".to_string()];
        for cap in self.iter() {
            for f in cap.functions() {
                lines.push(format!("- {}", f));
            }
        }
        lines.join("\n")
    }
}

/// Result of a successful run
#[derive(Debug, Clone, Default)]
pub struct ScriptOutcome {
    /// Final expression value, rendered
    pub value: String,
    /// Lines passed to `print`
    pub printed: Vec<String>,
    pub duration_ms: u64,
}

impl ScriptOutcome {
    /// Printed lines, or the final value if nothing was printed
    pub fn summary(&self) -> String {
        if self.printed.is_empty() {
            self.value.clone()
        } else {
            self.printed.join("\n")
        }
    }
}

/// Runs scripts inside a fresh engine per call
#[derive(Debug, Clone)]
pub struct ScriptExecutor {
    capabilities: CapabilitySet,
    timeout: Duration,
    max_operations: u64,
}

impl ScriptExecutor {
    pub fn new(capabilities: CapabilitySet, timeout: Duration, max_operations: u64) -> Self {
        Self {
            capabilities,
            timeout,
            max_operations,
        }
    }

    /// Standard capabilities with configured limits
    pub fn from_config(config: &SkillsConfig) -> Self {
        Self::new(
            CapabilitySet::standard(),
            Duration::from_secs(config.timeout_secs),
            config.max_operations,
        )
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// Compile and run a script on the current thread
    pub fn run(&self, code: &str) -> Result<ScriptOutcome> {
        let start = Instant::now();
        let deadline = start + self.timeout;
        let printed = Arc::new(Mutex::new(Vec::new()));
        let engine = self.build_engine(deadline, printed.clone());

        let ast = engine
            .compile(code)
            .map_err(|e| anyhow!("Script compilation failed: {}", e))?;

        let value: Dynamic = engine
            .eval_ast(&ast)
            .map_err(|e| anyhow!("{}", describe_error(&e)))?;

        let printed = printed.lock().map(|p| p.clone()).unwrap_or_default();
        let outcome = ScriptOutcome {
            value: dynamic_to_string(&value),
            printed,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        debug!("Script finished in {}ms", outcome.duration_ms);
        Ok(outcome)
    }

    /// Run a script on the blocking pool
    ///
    /// Script bindings perform blocking I/O, so they must stay off the async workers.
    pub async fn run_blocking(&self, code: String) -> Result<ScriptOutcome> {
        let executor = self.clone();
        tokio::task::spawn_blocking(move || executor.run(&code))
            .await
            .map_err(|e| anyhow!("Script task panicked: {}", e))?
    }

    fn build_engine(&self, deadline: Instant, printed: Arc<Mutex<Vec<String>>>) -> Engine {
        let mut engine = Engine::new();

        engine.set_max_expr_depths(100, 100);
        engine.set_max_functions(100);
        engine.set_max_string_size(1_000_000);
        engine.set_max_array_size(10_000);
        engine.set_max_map_size(1_000);
        engine.set_max_operations(self.max_operations);

        engine.disable_symbol("eval");
        engine.disable_symbol("import");
        engine.disable_symbol("export");

        engine.on_progress(move |_| {
            if Instant::now() >= deadline {
                Some(Dynamic::from("time budget exceeded".to_string()))
            } else {
                None
            }
        });

        engine.on_print(move |text| {
            if let Ok(mut lines) = printed.lock() {
                lines.push(text.to_string());
            }
        });

        engine.register_fn("log", |s: &str| {
            info!("[skill] {}", s);
        });

        for capability in self.capabilities.iter() {
            match capability {
                Capability::FileSystem => register_filesystem(&mut engine),
                Capability::Process => register_process(&mut engine),
                Capability::Http => register_http(&mut engine),
                Capability::Browser => register_browser(&mut engine),
                Capability::Regex => register_regex(&mut engine),
                Capability::Timer => register_timer(&mut engine, deadline),
            }
        }

        engine
    }
}

fn describe_error(error: &EvalAltResult) -> String {
    match error {
        EvalAltResult::ErrorTerminated(reason, _) => {
            format!("script stopped: {}", dynamic_to_string(reason))
        }
        EvalAltResult::ErrorRuntime(value, _) => dynamic_to_string(value),
        other => other.to_string(),
    }
}

/// Convert a Rhai Dynamic value to a string
fn dynamic_to_string(value: &Dynamic) -> String {
    if value.is::<String>() {
        value.clone_cast::<String>()
    } else if value.is::<rhai::Array>() {
        let arr = value.clone_cast::<rhai::Array>();
        let items: Vec<String> = arr.iter().map(dynamic_to_string).collect();
        format!("[{}]", items.join(", "))
    } else if value.is::<rhai::Map>() {
        let map = value.clone_cast::<rhai::Map>();
        let items: Vec<String> = map.iter()
            .map(|(k, v)| format!("{}: {}", k, dynamic_to_string(v)))
            .collect();
        format!("{{{}}}", items.join(", "))
    } else if value.is_unit() {
        String::new()
    } else {
        value.to_string()
    }
}

/// Helper to create an error
fn make_error(msg: String) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorRuntime(msg.into(), rhai::Position::NONE))
}

fn register_filesystem(engine: &mut Engine) {
    engine.register_fn("read_file", |path: &str| -> Result<String, Box<EvalAltResult>> {
        std::fs::read_to_string(path)
            .map_err(|e| make_error(format!("Failed to read file: {}", e)))
    });

    engine.register_fn("write_file", |path: &str, content: &str| -> Result<(), Box<EvalAltResult>> {
        std::fs::write(path, content)
            .map_err(|e| make_error(format!("Failed to write file: {}", e)))
    });

    engine.register_fn("append_file", |path: &str, content: &str| -> Result<(), Box<EvalAltResult>> {
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| make_error(format!("Failed to open file: {}", e)))?;

        file.write_all(content.as_bytes())
            .map_err(|e| make_error(format!("Failed to append to file: {}", e)))
    });

    engine.register_fn("file_exists", |path: &str| -> bool {
        std::path::Path::new(path).exists()
    });

    engine.register_fn("list_dir", |path: &str| -> Result<rhai::Array, Box<EvalAltResult>> {
        let entries = std::fs::read_dir(path)
            .map_err(|e| make_error(format!("Failed to list directory: {}", e)))?;

        let mut result = rhai::Array::new();
        for entry in entries.flatten() {
            let mut map = rhai::Map::new();
            map.insert("name".into(), entry.file_name().to_string_lossy().to_string().into());
            map.insert("path".into(), entry.path().to_string_lossy().to_string().into());
            map.insert("is_dir".into(), entry.file_type().map(|t| t.is_dir()).unwrap_or(false).into());
            result.push(map.into());
        }
        Ok(result)
    });

    engine.register_fn("create_dir", |path: &str| -> Result<(), Box<EvalAltResult>> {
        std::fs::create_dir_all(path)
            .map_err(|e| make_error(format!("Failed to create directory: {}", e)))
    });

    engine.register_fn("delete_file", |path: &str| -> Result<(), Box<EvalAltResult>> {
        std::fs::remove_file(path)
            .map_err(|e| make_error(format!("Failed to delete file: {}", e)))
    });

    engine.register_fn("home_dir", || -> Result<String, Box<EvalAltResult>> {
        directories::BaseDirs::new()
            .map(|d| d.home_dir().to_string_lossy().to_string())
            .ok_or_else(|| make_error("Home directory is unknown".to_string()))
    });
}

fn register_process(engine: &mut Engine) {
    engine.register_fn("run_command", |cmd: &str| -> Result<rhai::Map, Box<EvalAltResult>> {
        let output = crate::tools::desktop::shell_command(cmd)
            .output()
            .map_err(|e| make_error(format!("Failed to run command: {}", e)))?;

        let mut result = rhai::Map::new();
        result.insert("success".into(), output.status.success().into());
        result.insert("stdout".into(), String::from_utf8_lossy(&output.stdout).to_string().into());
        result.insert("stderr".into(), String::from_utf8_lossy(&output.stderr).to_string().into());
        result.insert("code".into(), (output.status.code().unwrap_or(-1) as i64).into());
        Ok(result)
    });

    engine.register_fn("launch", |cmd: &str| -> Result<(), Box<EvalAltResult>> {
        crate::tools::desktop::shell_command(cmd)
            .spawn()
            .map(|_| ())
            .map_err(|e| make_error(format!("Failed to launch: {}", e)))
    });

    engine.register_fn("list_processes", || -> Result<rhai::Array, Box<EvalAltResult>> {
        crate::tools::desktop::list_process_names()
            .map(|names| names.into_iter().map(Dynamic::from).collect())
            .map_err(|e| make_error(format!("Failed to list processes: {}", e)))
    });

    engine.register_fn("kill_process", |name: &str| -> Result<bool, Box<EvalAltResult>> {
        crate::tools::desktop::kill_processes(name)
            .map_err(|e| make_error(format!("Failed to kill process: {}", e)))
    });
}

fn register_http(engine: &mut Engine) {
    engine.register_fn("http_get", |url: &str| -> Result<String, Box<EvalAltResult>> {
        let response = blocking_client()?
            .get(url)
            .send()
            .map_err(|e| make_error(format!("HTTP request failed: {}", e)))?;

        response.text()
            .map_err(|e| make_error(format!("Failed to read response: {}", e)))
    });

    engine.register_fn("http_post", |url: &str, body: &str| -> Result<String, Box<EvalAltResult>> {
        let response = blocking_client()?
            .post(url)
            .body(body.to_string())
            .send()
            .map_err(|e| make_error(format!("HTTP POST failed: {}", e)))?;

        response.text()
            .map_err(|e| make_error(format!("Failed to read response: {}", e)))
    });
}

fn blocking_client() -> Result<reqwest::blocking::Client, Box<EvalAltResult>> {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(20))
        .build()
        .map_err(|e| make_error(format!("HTTP client unavailable: {}", e)))
}

fn register_browser(engine: &mut Engine) {
    engine.register_fn("open_url", |url: &str| -> Result<(), Box<EvalAltResult>> {
        crate::tools::desktop::open_in_browser(url)
            .map_err(|e| make_error(format!("Failed to open browser: {}", e)))
    });
}

fn register_regex(engine: &mut Engine) {
    fn compile(pattern: &str) -> Result<regex::Regex, Box<EvalAltResult>> {
        regex::Regex::new(pattern).map_err(|e| make_error(format!("Invalid regex: {}", e)))
    }

    engine.register_fn("regex_match", |pattern: &str, text: &str| -> Result<bool, Box<EvalAltResult>> {
        Ok(compile(pattern)?.is_match(text))
    });

    engine.register_fn("regex_find", |pattern: &str, text: &str| -> Result<rhai::Array, Box<EvalAltResult>> {
        Ok(compile(pattern)?
            .find_iter(text)
            .map(|m| Dynamic::from(m.as_str().to_string()))
            .collect())
    });

    engine.register_fn(
        "regex_replace",
        |pattern: &str, text: &str, replacement: &str| -> Result<String, Box<EvalAltResult>> {
            Ok(compile(pattern)?.replace_all(text, replacement).into_owned())
        },
    );
}

fn register_timer(engine: &mut Engine, deadline: Instant) {
    engine.register_fn("sleep_ms", move |ms: i64| -> Result<(), Box<EvalAltResult>> {
        let wanted = Duration::from_millis(ms.max(0) as u64);
        let remaining = deadline.saturating_duration_since(Instant::now());
        if wanted > remaining {
            return Err(make_error("sleep exceeds the script time budget".to_string()));
        }
        std::thread::sleep(wanted);
        Ok(())
    });

    engine.register_fn("now_ms", || -> i64 {
        chrono::Utc::now().timestamp_millis()
    });

    engine.register_fn("timestamp", || -> String {
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn executor(capabilities: CapabilitySet) -> ScriptExecutor {
        ScriptExecutor::new(capabilities, Duration::from_secs(5), 1_000_000)
    }

    #[test]
    fn test_simple_execution() {
        let outcome = executor(CapabilitySet::none()).run("2 + 2").unwrap();
        assert_eq!(outcome.value, "4");
        assert!(outcome.printed.is_empty());
    }

    #[test]
    fn test_print_is_captured() {
        let outcome = executor(CapabilitySet::none())
            .run(r#"print("hello"); print("world");"#)
            .unwrap();
        assert_eq!(outcome.printed, vec!["hello", "world"]);
        assert_eq!(outcome.summary(), "hello\nworld");
    }

    #[test]
    fn test_ungranted_capability_is_missing() {
        let result = executor(CapabilitySet::none()).run(r#"file_exists("/")"#);
        assert!(result.is_err());

        let granted = executor(CapabilitySet::none().with(Capability::FileSystem))
            .run(r#"file_exists("/nonexistent/path")"#)
            .unwrap();
        assert_eq!(granted.value, "false");
    }

    #[test]
    fn test_filesystem_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let code = format!(
            r#"write_file("{p}", "a"); append_file("{p}", "b"); read_file("{p}")"#,
            p = path.display()
        );

        let outcome = executor(CapabilitySet::standard()).run(&code).unwrap();
        assert_eq!(outcome.value, "ab");
    }

    #[test]
    fn test_regex_bindings() {
        let outcome = executor(CapabilitySet::none().with(Capability::Regex))
            .run(r#"regex_find("\\d+", "a1b22c333").len()"#)
            .unwrap();
        assert_eq!(outcome.value, "3");
    }

    #[test]
    fn test_runtime_error_reported() {
        let err = executor(CapabilitySet::standard())
            .run(r#"throw "boom";"#)
            .unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_eval_disabled() {
        let result = executor(CapabilitySet::standard()).run(r#"eval("1 + 1")"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_runaway_script_is_stopped() {
        let executor = ScriptExecutor::new(CapabilitySet::none(), Duration::from_millis(100), u64::MAX);
        let err = executor.run("loop { }").unwrap_err();
        assert!(err.to_string().contains("time budget"));
    }

    #[test]
    fn test_describe_lists_granted_functions_only() {
        let text = CapabilitySet::none().with(Capability::Browser).describe();
        assert!(text.contains("open_url(url)"));
        assert!(!text.contains("read_file"));
    }

    #[tokio::test]
    async fn test_run_blocking() {
        let outcome = executor(CapabilitySet::none())
            .run_blocking("let x = 20; x + 1".to_string())
            .await
            .unwrap();
        assert_eq!(outcome.value, "21");
    }
}
