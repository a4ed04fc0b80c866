//! Spoken arithmetic
//!
//! Rewrites spoken operators ("times", "divided by", "por", "entre") into
//! symbols and evaluates the result with a small recursive-descent parser.
//! Only numbers, `+ - * / % ^`, and parentheses are accepted.

use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use regex::Regex;

/// Deepest nesting of parentheses, signs and exponents accepted
pub const MAX_NESTING: usize = 64;

static WORD_OPERATORS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"\b(?:divided by|dividido entre|dividido por|entre)\b", " / "),
        (r"\b(?:multiplied by|multiplicado por|times|por)\b", " * "),
        (r"\b(?:plus|más|mas)\b", " + "),
        (r"\b(?:minus|menos)\b", " - "),
        (r"\b(?:modulo|mod)\b", " % "),
        (r"\b(?:to the power of|elevado a)\b", " ^ "),
    ]
    .into_iter()
    .filter_map(|(pattern, symbol)| Regex::new(&format!("(?i){}", pattern)).ok().map(|r| (r, symbol)))
    .collect()
});

// "3 x 4", "3x4", "(2)x(5)"
static LETTER_TIMES: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)([\d.)])\s*x\s*([\d.(])").ok());

/// Replace spoken operators with symbols
pub fn prepare(expression: &str) -> String {
    let mut text = expression.trim().to_string();
    for (pattern, symbol) in WORD_OPERATORS.iter() {
        text = pattern.replace_all(&text, *symbol).into_owned();
    }
    if let Some(re) = LETTER_TIMES.as_ref() {
        // Twice so chains like 2x3x4 are fully rewritten
        for _ in 0..2 {
            text = re.replace_all(&text, "$1*$2").into_owned();
        }
    }
    text.replace('×', "*")
        .replace('÷', "/")
        .replace("**", "^")
        .trim_end_matches(['=', '.', ' '])
        .to_string()
}

/// Evaluate a spoken or written arithmetic expression
pub fn evaluate(expression: &str) -> Result<f64> {
    let prepared = prepare(expression);
    let tokens = tokenize(&prepared)?;
    if tokens.is_empty() {
        bail!("Empty expression");
    }

    let mut parser = Parser { tokens, pos: 0, depth: 0 };
    let value = parser.expression()?;
    if parser.pos != parser.tokens.len() {
        bail!("Unexpected input after expression");
    }
    if !value.is_finite() {
        bail!("Result is not a finite number");
    }
    Ok(value)
}

/// Integers without a decimal point, others trimmed to 10 places
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    let text = format!("{:.10}", value);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    LParen,
    RParen,
}

fn tokenize(text: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => {}
            '+' => tokens.push(Token::Plus),
            '-' => tokens.push(Token::Minus),
            '*' => tokens.push(Token::Star),
            '/' => tokens.push(Token::Slash),
            '%' => tokens.push(Token::Percent),
            '^' => tokens.push(Token::Caret),
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            d if d.is_ascii_digit() || d == '.' || d == ',' => {
                let start = i;
                while i + 1 < chars.len() && (chars[i + 1].is_ascii_digit() || chars[i + 1] == '.' || chars[i + 1] == ',') {
                    i += 1;
                }
                let literal: String = chars[start..=i].iter().collect::<String>().replace(',', ".");
                let number = literal
                    .parse::<f64>()
                    .map_err(|_| anyhow::anyhow!("Invalid number: {}", literal))?;
                tokens.push(Token::Number(number));
            }
            other => bail!("Unexpected character: {}", other),
        }
        i += 1;
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.peek();
        self.pos += 1;
        token
    }

    // expression := term (('+' | '-') term)*
    fn expression(&mut self) -> Result<f64> {
        let mut value = self.term()?;
        while let Some(op @ (Token::Plus | Token::Minus)) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == Token::Plus { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    // term := unary (('*' | '/' | '%') unary)*
    fn term(&mut self) -> Result<f64> {
        let mut value = self.unary()?;
        while let Some(op @ (Token::Star | Token::Slash | Token::Percent)) = self.peek() {
            self.pos += 1;
            let rhs = self.unary()?;
            value = match op {
                Token::Star => value * rhs,
                _ if rhs == 0.0 => bail!("Division by zero"),
                Token::Slash => value / rhs,
                _ => value % rhs,
            };
        }
        Ok(value)
    }

    // All recursion passes through here
    fn unary(&mut self) -> Result<f64> {
        if self.depth >= MAX_NESTING {
            bail!("Expression is nested too deeply");
        }
        self.depth += 1;
        let value = self.signed();
        self.depth -= 1;
        value
    }

    // unary := ('-' | '+') unary | power
    fn signed(&mut self) -> Result<f64> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    // power := primary ('^' unary)?   (right-associative)
    fn power(&mut self) -> Result<f64> {
        let base = self.primary()?;
        if self.peek() == Some(Token::Caret) {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<f64> {
        match self.next() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.expression()?;
                match self.next() {
                    Some(Token::RParen) => Ok(value),
                    _ => bail!("Missing closing parenthesis"),
                }
            }
            _ => bail!("Expected a number"),
        }
    }
}
