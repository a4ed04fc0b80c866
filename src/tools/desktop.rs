//! Desktop integration
//!
//! Application launch/close, browser, media keys, screenshots and system
//! load, behind the [`Desktop`] trait so command handlers can be exercised
//! without touching the real machine.
//!
//! Media keys and screenshots use enigo/screenshots when built with the
//! `desktop` feature; otherwise media and volume fall back to `playerctl` /
//! `pactl` on Linux.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;
use tracing::debug;

/// Media and volume keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKey {
    PlayPause,
    Next,
    Previous,
    VolumeUp,
    VolumeDown,
    Mute,
}

/// Instantaneous machine load
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SystemStatus {
    pub cpu_percent: f32,
    pub ram_percent: f32,
}

/// Operations the assistant performs on the host desktop
pub trait Desktop: Send + Sync {
    fn open_application(&self, name: &str) -> Result<()>;

    /// Terminate processes matching `name`; false if none matched
    fn close_application(&self, name: &str) -> Result<bool>;

    fn open_url(&self, url: &str) -> Result<()>;

    fn press_media_key(&self, key: MediaKey) -> Result<()>;

    /// Capture the primary screen into `dir`, returning the file written
    fn screenshot(&self, dir: &Path) -> Result<PathBuf>;

    fn system_status(&self) -> Result<SystemStatus>;
}

/// The real desktop
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDesktop;

impl Desktop for SystemDesktop {
    fn open_application(&self, name: &str) -> Result<()> {
        launch_command(name)?
            .spawn()
            .with_context(|| format!("Failed to launch {}", name.trim()))?;
        Ok(())
    }

    fn close_application(&self, name: &str) -> Result<bool> {
        kill_processes(name)
    }

    fn open_url(&self, url: &str) -> Result<()> {
        open_in_browser(url)
    }

    fn press_media_key(&self, key: MediaKey) -> Result<()> {
        #[cfg(feature = "desktop")]
        {
            use enigo::{Direction, Enigo, Keyboard, Settings};

            let mut enigo = Enigo::new(&Settings::default()).context("Failed to create Enigo")?;
            let enigo_key = match key {
                MediaKey::PlayPause => enigo::Key::MediaPlayPause,
                MediaKey::Next => enigo::Key::MediaNextTrack,
                MediaKey::Previous => enigo::Key::MediaPrevTrack,
                MediaKey::VolumeUp => enigo::Key::VolumeUp,
                MediaKey::VolumeDown => enigo::Key::VolumeDown,
                MediaKey::Mute => enigo::Key::VolumeMute,
            };
            enigo.key(enigo_key, Direction::Click).context("Failed to press key")?;
            return Ok(());
        }

        #[cfg(not(feature = "desktop"))]
        {
            let (program, args): (&str, &[&str]) = match key {
                MediaKey::PlayPause => ("playerctl", &["play-pause"]),
                MediaKey::Next => ("playerctl", &["next"]),
                MediaKey::Previous => ("playerctl", &["previous"]),
                MediaKey::VolumeUp => ("pactl", &["set-sink-volume", "@DEFAULT_SINK@", "+10%"]),
                MediaKey::VolumeDown => ("pactl", &["set-sink-volume", "@DEFAULT_SINK@", "-10%"]),
                MediaKey::Mute => ("pactl", &["set-sink-mute", "@DEFAULT_SINK@", "toggle"]),
            };

            if !cfg!(target_os = "linux") {
                bail!("Media keys need the `desktop` feature on this platform");
            }

            let status = Command::new(program)
                .args(args)
                .status()
                .with_context(|| format!("Failed to run {}", program))?;
            if !status.success() {
                bail!("{} exited with {}", program, status);
            }
            Ok(())
        }
    }

    fn screenshot(&self, dir: &Path) -> Result<PathBuf> {
        #[cfg(feature = "desktop")]
        {
            use image::ImageBuffer;
            use screenshots::Screen;

            let screens = Screen::all().context("Failed to get screen list")?;
            let screen = screens.into_iter().next().context("No primary screen available")?;
            let capture = screen.capture().context("Failed to capture screenshot")?;

            let img_buffer: ImageBuffer<image::Rgba<u8>, Vec<u8>> =
                ImageBuffer::from_raw(capture.width(), capture.height(), capture.as_raw().clone())
                    .context("Failed to create image buffer")?;

            std::fs::create_dir_all(dir).context("Failed to create screenshot directory")?;
            let path = dir.join(screenshot_file_name(chrono::Local::now()));
            img_buffer
                .save_with_format(&path, image::ImageFormat::Png)
                .context("Failed to write screenshot")?;
            return Ok(path);
        }

        #[cfg(not(feature = "desktop"))]
        {
            let _ = dir;
            bail!("Desktop features not enabled. Build with --features desktop")
        }
    }

    fn system_status(&self) -> Result<SystemStatus> {
        if !cfg!(target_os = "linux") {
            bail!("System status is only implemented for Linux");
        }

        let meminfo = std::fs::read_to_string("/proc/meminfo").context("Failed to read /proc/meminfo")?;
        let loadavg = std::fs::read_to_string("/proc/loadavg").context("Failed to read /proc/loadavg")?;
        let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);

        Ok(SystemStatus {
            cpu_percent: parse_load_percent(&loadavg, cpus).context("Unexpected /proc/loadavg format")?,
            ram_percent: parse_memory_percent(&meminfo).context("Unexpected /proc/meminfo format")?,
        })
    }
}

/// `screenshot_%Y%m%d_%H%M%S.png`
pub fn screenshot_file_name(at: chrono::DateTime<chrono::Local>) -> String {
    format!("screenshot_{}.png", at.format("%Y%m%d_%H%M%S"))
}

/// Used memory as a percentage of total, from `/proc/meminfo`
pub fn parse_memory_percent(meminfo: &str) -> Option<f32> {
    let field = |name: &str| -> Option<f64> {
        meminfo
            .lines()
            .find(|l| l.starts_with(name))
            .and_then(|l| l.split_whitespace().nth(1))
            .and_then(|v| v.parse().ok())
    };

    let total = field("MemTotal:")?;
    let available = field("MemAvailable:")?;
    if total <= 0.0 {
        return None;
    }
    Some((((total - available) / total) * 100.0) as f32)
}

/// One-minute load average as a percentage of available cores, capped at 100
pub fn parse_load_percent(loadavg: &str, cpus: usize) -> Option<f32> {
    let load: f64 = loadavg.split_whitespace().next()?.parse().ok()?;
    Some(((load / cpus.max(1) as f64) * 100.0).min(100.0) as f32)
}

/// Process that starts the application called `name`
///
/// The whole name is the program (or, on macOS, the application bundle); it
/// is never split into arguments nor handed to a shell.
pub fn launch_command(name: &str) -> Result<Command> {
    let name = name.trim();
    if name.is_empty() || name.chars().any(char::is_control) {
        bail!("Invalid application name");
    }

    let command = if cfg!(target_os = "macos") {
        let mut c = Command::new("open");
        c.args(["-a", name]);
        c
    } else {
        Command::new(name)
    };
    Ok(command)
}

/// Platform shell invocation for a command line
pub fn shell_command(cmd: &str) -> Command {
    if cfg!(target_os = "windows") {
        let mut command = Command::new("cmd");
        command.args(["/C", cmd]);
        command
    } else {
        let mut command = Command::new("sh");
        command.args(["-c", cmd]);
        command
    }
}

/// Open a URL (or URI such as `spotify:`) with the default handler
pub fn open_in_browser(url: &str) -> Result<()> {
    let mut command = if cfg!(target_os = "windows") {
        let mut c = Command::new("rundll32");
        c.args(["url.dll,FileProtocolHandler", url]);
        c
    } else if cfg!(target_os = "macos") {
        let mut c = Command::new("open");
        c.arg(url);
        c
    } else {
        let mut c = Command::new("xdg-open");
        c.arg(url);
        c
    };

    let status = command.status().context("Failed to launch URL handler")?;
    if !status.success() {
        bail!("URL handler exited with {}", status);
    }
    debug!("Opened {}", url);
    Ok(())
}

/// Names of running processes
pub fn list_process_names() -> Result<Vec<String>> {
    if cfg!(target_os = "windows") {
        let output = Command::new("tasklist")
            .args(["/FO", "CSV", "/NH"])
            .output()
            .context("Failed to run tasklist")?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|l| l.split(',').next())
            .map(|n| n.trim_matches('"').to_string())
            .filter(|n| !n.is_empty())
            .collect())
    } else {
        let output = Command::new("ps")
            .args(["-A", "-o", "comm="])
            .output()
            .context("Failed to run ps")?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect())
    }
}

/// Pids from `ps -o pid=,comm=` output whose process name contains `name`
///
/// Matching is case-insensitive and looks at the name only, never at the
/// arguments. `own_pid` is always left out.
pub fn matching_pids(listing: &str, name: &str, own_pid: u32) -> Vec<u32> {
    let needle = name.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }

    listing
        .lines()
        .filter_map(|line| {
            let (pid, comm) = line.trim().split_once(char::is_whitespace)?;
            let pid: u32 = pid.parse().ok()?;
            (pid != own_pid && comm.trim().to_lowercase().contains(&needle)).then_some(pid)
        })
        .collect()
}

/// Terminate processes whose name contains `name` (case-insensitive)
///
/// Returns false when no process matched.
pub fn kill_processes(name: &str) -> Result<bool> {
    let name = name.trim();
    if name.is_empty() {
        bail!("Empty process name");
    }

    if cfg!(target_os = "windows") {
        let pattern = format!("{}*", name);
        let status = Command::new("taskkill")
            .args(["/F", "/IM", pattern.as_str()])
            .status()
            .context("Failed to run taskkill")?;
        return Ok(status.success());
    }

    let output = Command::new("ps")
        .args(["-A", "-o", "pid=,comm="])
        .output()
        .context("Failed to run ps")?;
    let pids = matching_pids(&String::from_utf8_lossy(&output.stdout), name, std::process::id());
    if pids.is_empty() {
        return Ok(false);
    }

    debug!("Terminating {:?} for '{}'", pids, name);
    let status = Command::new("kill")
        .args(pids.iter().map(|p| p.to_string()))
        .status()
        .context("Failed to run kill")?;
    Ok(status.success())
}

/// Everything a [`RecordingDesktop`] was asked to do
#[derive(Debug, Clone, PartialEq)]
pub enum DesktopCall {
    Open(String),
    Close(String),
    Url(String),
    Key(MediaKey),
    Screenshot(PathBuf),
    Status,
}

/// In-memory desktop that records calls instead of performing them
#[derive(Debug, Default)]
pub struct RecordingDesktop {
    calls: Mutex<Vec<DesktopCall>>,
    /// Names `close_application` reports as running
    pub running: Vec<String>,
}

impl RecordingDesktop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_running(names: &[&str]) -> Self {
        Self {
            running: names.iter().map(|s| s.to_lowercase()).collect(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<DesktopCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn push(&self, call: DesktopCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl Desktop for RecordingDesktop {
    fn open_application(&self, name: &str) -> Result<()> {
        self.push(DesktopCall::Open(name.to_string()));
        Ok(())
    }

    fn close_application(&self, name: &str) -> Result<bool> {
        self.push(DesktopCall::Close(name.to_string()));
        let lower = name.to_lowercase();
        Ok(self.running.iter().any(|r| r.contains(&lower)))
    }

    fn open_url(&self, url: &str) -> Result<()> {
        self.push(DesktopCall::Url(url.to_string()));
        Ok(())
    }

    fn press_media_key(&self, key: MediaKey) -> Result<()> {
        self.push(DesktopCall::Key(key));
        Ok(())
    }

    fn screenshot(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(screenshot_file_name(chrono::Local::now()));
        self.push(DesktopCall::Screenshot(path.clone()));
        Ok(path)
    }

    fn system_status(&self) -> Result<SystemStatus> {
        self.push(DesktopCall::Status);
        Ok(SystemStatus {
            cpu_percent: 12.5,
            ram_percent: 40.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_memory_percent() {
        let meminfo = "MemTotal:       16000000 kB\nMemFree:         1000000 kB\nMemAvailable:    4000000 kB\n";
        let pct = parse_memory_percent(meminfo).unwrap();
        assert!((pct - 75.0).abs() < 0.01);
        assert!(parse_memory_percent("garbage").is_none());
    }

    #[test]
    fn test_parse_load_percent() {
        assert_eq!(parse_load_percent("2.00 1.50 1.00 2/300 1234", 4), Some(50.0));
        assert_eq!(parse_load_percent("9.00 1.50 1.00 2/300 1234", 2), Some(100.0));
        assert_eq!(parse_load_percent("", 2), None);
    }

    #[test]
    fn test_screenshot_file_name() {
        let at = chrono::Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(screenshot_file_name(at), "screenshot_20240309_140507.png");
    }

    #[test]
    fn test_launch_command_never_uses_a_shell() {
        let command = launch_command("  nonexistent-app; touch /tmp/marker & ").unwrap();
        let program = command.get_program().to_string_lossy().into_owned();
        let args: Vec<String> = command.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        if cfg!(target_os = "macos") {
            assert_eq!(program, "open");
            assert_eq!(args, vec!["-a", "nonexistent-app; touch /tmp/marker &"]);
        } else {
            assert_eq!(program, "nonexistent-app; touch /tmp/marker &");
            assert!(args.is_empty());
        }

        assert!(launch_command("   ").is_err());
        assert!(launch_command("firefox\nrm -rf ~").is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_open_application_does_not_interpret_metacharacters() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let name = format!("nonexistent-app-xyz; touch {}", marker.display());

        assert!(SystemDesktop.open_application(&name).is_err());
        std::thread::sleep(std::time::Duration::from_millis(200));
        assert!(!marker.exists());
    }

    #[test]
    fn test_matching_pids_uses_process_name_only() {
        let listing = "    1 systemd\n  412 firefox\n  413 Firefox-bin\n  900 sh\n  901 autodidact\n garbage\n";

        assert_eq!(matching_pids(listing, "firefox", 901), vec![412, 413]);
        assert_eq!(matching_pids(listing, "autodidact", 901), Vec::<u32>::new());
        assert_eq!(matching_pids(listing, "sleep 30; echo", 1), Vec::<u32>::new());
        assert!(matching_pids(listing, "  ", 1).is_empty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_kill_processes_ignores_command_line_arguments() {
        let mut child = Command::new("sh")
            .args(["-c", "sleep 30; echo closewordxyz"])
            .spawn()
            .unwrap();

        assert!(!kill_processes("closewordxyz").unwrap());
        assert!(child.try_wait().unwrap().is_none());

        child.kill().unwrap();
        child.wait().unwrap();
    }

    #[test]
    fn test_recording_desktop_close() {
        let desktop = RecordingDesktop::with_running(&["Firefox"]);
        assert!(desktop.close_application("firefox").unwrap());
        assert!(!desktop.close_application("gimp").unwrap());
        assert_eq!(desktop.calls().len(), 2);
    }
}
