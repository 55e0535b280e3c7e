//! Fuel-capped code runner — the [`CodeRunner`] implementation.
//!
//! Executes a small expression language over the knowledge snapshot:
//! numbers, strings, booleans, `let` bindings, arithmetic, comparison,
//! string builtins, and `knowledge("pattern")` lookups into the inputs.
//! Isolation holds by construction: the language has no I/O primitives,
//! and every interpreter operation consumes fuel, so runaway programs
//! stop at the cap rather than the wall clock.
//!
//! Grammar (one statement per line, last expression is the result):
//!
//! ```text
//! program   = { "let" ident "=" expr | expr }
//! expr      = comparison
//! comparison= additive (("=="|"!="|"<"|">"|"<="|">=") additive)?
//! additive  = term (("+"|"-") term)*
//! term      = unary (("*"|"/"|"%") unary)*
//! unary     = "-" unary | primary
//! primary   = number | string | "true" | "false" | ident | call | "(" expr ")"
//! ```

use async_trait::async_trait;
use scour_core::{CodeError, CodeLimits, CodeOutput, CodeRunner};
use std::collections::HashMap;
use std::fmt;

/// The in-process interpreter behind the code port.
pub struct FuelCodeRunner;

impl FuelCodeRunner {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FuelCodeRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CodeRunner for FuelCodeRunner {
    async fn run(
        &self,
        program: &str,
        inputs: &serde_json::Value,
        limits: &CodeLimits,
    ) -> Result<CodeOutput, CodeError> {
        let program = program.to_string();
        let inputs = inputs.clone();
        let fuel = limits.fuel;
        let wall = limits.wall;

        // Interpretation is pure CPU; the wall cap rides on top of fuel in
        // case a pathological program burns fuel slowly.
        let run = tokio::task::spawn_blocking(move || execute(&program, &inputs, fuel));
        match tokio::time::timeout(wall, run).await {
            Err(_) => Err(CodeError::Timeout),
            Ok(Err(join)) => Err(CodeError::Runtime(join.to_string())),
            Ok(Ok(result)) => result,
        }
    }
}

fn execute(program: &str, inputs: &serde_json::Value, fuel: u64) -> Result<CodeOutput, CodeError> {
    let mut interp = Interp {
        vars: HashMap::new(),
        inputs,
        fuel,
        fuel_cap: fuel,
    };

    match interp.run_program(program) {
        Ok(Some(value)) => Ok(CodeOutput {
            stdout: value.to_string(),
            stderr: String::new(),
            exit_ok: true,
        }),
        Ok(None) => Ok(CodeOutput {
            stdout: String::new(),
            stderr: "program produced no value".into(),
            exit_ok: false,
        }),
        Err(CodeError::FuelExhausted(n)) => Err(CodeError::FuelExhausted(n)),
        Err(CodeError::Parse(e)) => Ok(CodeOutput {
            stdout: String::new(),
            stderr: format!("parse error: {e}"),
            exit_ok: false,
        }),
        Err(CodeError::Runtime(e)) => Ok(CodeOutput {
            stdout: String::new(),
            stderr: format!("runtime error: {e}"),
            exit_ok: false,
        }),
        Err(other) => Err(other),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Num(f64),
    Str(String),
    Bool(bool),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Num(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Value::Num(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Bool(b) => write!(f, "{b}"),
        }
    }
}

struct Interp<'a> {
    vars: HashMap<String, Value>,
    inputs: &'a serde_json::Value,
    fuel: u64,
    fuel_cap: u64,
}

impl<'a> Interp<'a> {
    fn burn(&mut self) -> Result<(), CodeError> {
        if self.fuel == 0 {
            return Err(CodeError::FuelExhausted(self.fuel_cap));
        }
        self.fuel -= 1;
        Ok(())
    }

    fn run_program(&mut self, program: &str) -> Result<Option<Value>, CodeError> {
        let mut last = None;
        for line in program.lines() {
            let line = line.trim().trim_end_matches(';');
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            self.burn()?;
            if let Some(rest) = line.strip_prefix("let ") {
                let (name, expr) = rest
                    .split_once('=')
                    .ok_or_else(|| CodeError::Parse(format!("expected '=' in: {line}")))?;
                let name = name.trim();
                if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                    return Err(CodeError::Parse(format!("bad binding name: {name}")));
                }
                let value = self.eval(expr)?;
                self.vars.insert(name.to_string(), value);
            } else {
                last = Some(self.eval(line)?);
            }
        }
        Ok(last)
    }

    fn eval(&mut self, expr: &str) -> Result<Value, CodeError> {
        let tokens = tokenize(expr)?;
        let mut pos = 0;
        let value = self.comparison(&tokens, &mut pos)?;
        if pos < tokens.len() {
            return Err(CodeError::Parse(format!("unexpected token: {:?}", tokens[pos])));
        }
        Ok(value)
    }

    fn comparison(&mut self, tokens: &[Token], pos: &mut usize) -> Result<Value, CodeError> {
        let left = self.additive(tokens, pos)?;
        let op = match tokens.get(*pos) {
            Some(Token::Op(op)) if ["==", "!=", "<", ">", "<=", ">="].contains(&op.as_str()) => {
                op.clone()
            }
            _ => return Ok(left),
        };
        *pos += 1;
        self.burn()?;
        let right = self.additive(tokens, pos)?;
        let result = match (op.as_str(), &left, &right) {
            ("==", a, b) => a == b,
            ("!=", a, b) => a != b,
            ("<", Value::Num(a), Value::Num(b)) => a < b,
            (">", Value::Num(a), Value::Num(b)) => a > b,
            ("<=", Value::Num(a), Value::Num(b)) => a <= b,
            (">=", Value::Num(a), Value::Num(b)) => a >= b,
            _ => {
                return Err(CodeError::Runtime(format!(
                    "cannot compare {left:?} {op} {right:?}"
                )))
            }
        };
        Ok(Value::Bool(result))
    }

    fn additive(&mut self, tokens: &[Token], pos: &mut usize) -> Result<Value, CodeError> {
        let mut left = self.term(tokens, pos)?;
        while let Some(Token::Op(op)) = tokens.get(*pos) {
            let op = op.clone();
            if op != "+" && op != "-" {
                break;
            }
            *pos += 1;
            self.burn()?;
            let right = self.term(tokens, pos)?;
            left = match (op.as_str(), left, right) {
                ("+", Value::Num(a), Value::Num(b)) => Value::Num(a + b),
                ("+", Value::Str(a), b) => Value::Str(format!("{a}{b}")),
                ("+", a, Value::Str(b)) => Value::Str(format!("{a}{b}")),
                ("-", Value::Num(a), Value::Num(b)) => Value::Num(a - b),
                (op, a, b) => {
                    return Err(CodeError::Runtime(format!("cannot apply {op} to {a:?}, {b:?}")))
                }
            };
        }
        Ok(left)
    }

    fn term(&mut self, tokens: &[Token], pos: &mut usize) -> Result<Value, CodeError> {
        let mut left = self.unary(tokens, pos)?;
        while let Some(Token::Op(op)) = tokens.get(*pos) {
            let op = op.clone();
            if op != "*" && op != "/" && op != "%" {
                break;
            }
            *pos += 1;
            self.burn()?;
            let right = self.unary(tokens, pos)?;
            left = match (op.as_str(), left, right) {
                ("*", Value::Num(a), Value::Num(b)) => Value::Num(a * b),
                ("/", Value::Num(_), Value::Num(b)) if b == 0.0 => {
                    return Err(CodeError::Runtime("division by zero".into()))
                }
                ("/", Value::Num(a), Value::Num(b)) => Value::Num(a / b),
                ("%", Value::Num(a), Value::Num(b)) => Value::Num(a % b),
                (op, a, b) => {
                    return Err(CodeError::Runtime(format!("cannot apply {op} to {a:?}, {b:?}")))
                }
            };
        }
        Ok(left)
    }

    fn unary(&mut self, tokens: &[Token], pos: &mut usize) -> Result<Value, CodeError> {
        if let Some(Token::Op(op)) = tokens.get(*pos) {
            if op == "-" {
                *pos += 1;
                self.burn()?;
                return match self.unary(tokens, pos)? {
                    Value::Num(n) => Ok(Value::Num(-n)),
                    other => Err(CodeError::Runtime(format!("cannot negate {other:?}"))),
                };
            }
        }
        self.primary(tokens, pos)
    }

    fn primary(&mut self, tokens: &[Token], pos: &mut usize) -> Result<Value, CodeError> {
        self.burn()?;
        match tokens.get(*pos) {
            Some(Token::Number(n)) => {
                *pos += 1;
                Ok(Value::Num(*n))
            }
            Some(Token::Str(s)) => {
                *pos += 1;
                Ok(Value::Str(s.clone()))
            }
            Some(Token::Ident(name)) => {
                *pos += 1;
                if tokens.get(*pos) == Some(&Token::LParen) {
                    *pos += 1;
                    let mut args = Vec::new();
                    loop {
                        match tokens.get(*pos) {
                            Some(Token::RParen) => {
                                *pos += 1;
                                break;
                            }
                            Some(Token::Comma) => {
                                *pos += 1;
                            }
                            Some(_) => args.push(self.comparison(tokens, pos)?),
                            None => return Err(CodeError::Parse("unclosed call".into())),
                        }
                    }
                    return self.call(name.clone(), args);
                }
                match name.as_str() {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    _ => self
                        .vars
                        .get(name)
                        .cloned()
                        .ok_or_else(|| CodeError::Runtime(format!("unknown variable: {name}"))),
                }
            }
            Some(Token::LParen) => {
                *pos += 1;
                let value = self.comparison(tokens, pos)?;
                if tokens.get(*pos) != Some(&Token::RParen) {
                    return Err(CodeError::Parse("expected ')'".into()));
                }
                *pos += 1;
                Ok(value)
            }
            other => Err(CodeError::Parse(format!("unexpected token: {other:?}"))),
        }
    }

    fn call(&mut self, name: String, args: Vec<Value>) -> Result<Value, CodeError> {
        self.burn()?;
        let arity = |n: usize| -> Result<(), CodeError> {
            if args.len() == n {
                Ok(())
            } else {
                Err(CodeError::Runtime(format!("{name}() expects {n} argument(s)")))
            }
        };
        match name.as_str() {
            "len" => {
                arity(1)?;
                match &args[0] {
                    Value::Str(s) => Ok(Value::Num(s.chars().count() as f64)),
                    other => Err(CodeError::Runtime(format!("len() of {other:?}"))),
                }
            }
            "upper" | "lower" => {
                arity(1)?;
                match &args[0] {
                    Value::Str(s) => Ok(Value::Str(if name == "upper" {
                        s.to_uppercase()
                    } else {
                        s.to_lowercase()
                    })),
                    other => Err(CodeError::Runtime(format!("{name}() of {other:?}"))),
                }
            }
            "contains" => {
                arity(2)?;
                match (&args[0], &args[1]) {
                    (Value::Str(hay), Value::Str(needle)) => {
                        Ok(Value::Bool(hay.to_lowercase().contains(&needle.to_lowercase())))
                    }
                    _ => Err(CodeError::Runtime("contains() expects strings".into())),
                }
            }
            "count" => {
                arity(2)?;
                match (&args[0], &args[1]) {
                    (Value::Str(hay), Value::Str(needle)) if !needle.is_empty() => {
                        Ok(Value::Num(hay.matches(needle.as_str()).count() as f64))
                    }
                    _ => Err(CodeError::Runtime("count() expects (string, non-empty string)".into())),
                }
            }
            "num" => {
                arity(1)?;
                match &args[0] {
                    Value::Str(s) => s
                        .trim()
                        .parse::<f64>()
                        .map(Value::Num)
                        .map_err(|_| CodeError::Runtime(format!("num() cannot parse: {s}"))),
                    Value::Num(n) => Ok(Value::Num(*n)),
                    other => Err(CodeError::Runtime(format!("num() of {other:?}"))),
                }
            }
            // knowledge("pattern"): concatenated answers whose question or
            // answer contains the pattern, from the inputs snapshot.
            "knowledge" => {
                arity(1)?;
                let Value::Str(pattern) = &args[0] else {
                    return Err(CodeError::Runtime("knowledge() expects a string".into()));
                };
                let pattern = pattern.to_lowercase();
                let mut out = Vec::new();
                if let Some(items) = self.inputs.get("knowledge").and_then(|v| v.as_array()) {
                    for item in items {
                        self.burn()?;
                        let question = item.get("question").and_then(|v| v.as_str()).unwrap_or("");
                        let answer = item.get("answer").and_then(|v| v.as_str()).unwrap_or("");
                        if question.to_lowercase().contains(&pattern)
                            || answer.to_lowercase().contains(&pattern)
                        {
                            out.push(answer.to_string());
                        }
                    }
                }
                Ok(Value::Str(out.join("\n")))
            }
            other => Err(CodeError::Runtime(format!("unknown function: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Op(String),
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<Token>, CodeError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '"' | '\'' => {
                let quote = chars[i];
                i += 1;
                let start = i;
                while i < chars.len() && chars[i] != quote {
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(CodeError::Parse("unterminated string".into()));
                }
                tokens.push(Token::Str(chars[start..i].iter().collect()));
                i += 1;
            }
            '=' | '!' | '<' | '>' => {
                let mut op = chars[i].to_string();
                if chars.get(i + 1) == Some(&'=') {
                    op.push('=');
                    i += 1;
                }
                i += 1;
                if op == "=" || op == "!" {
                    return Err(CodeError::Parse(format!("unexpected operator: {op}")));
                }
                tokens.push(Token::Op(op));
            }
            c @ ('+' | '-' | '*' | '/' | '%') => {
                tokens.push(Token::Op(c.to_string()));
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let raw: String = chars[start..i].iter().collect();
                let n: f64 = raw
                    .parse()
                    .map_err(|_| CodeError::Parse(format!("invalid number: {raw}")))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_alphanumeric() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            c => return Err(CodeError::Parse(format!("unexpected character: '{c}'"))),
        }
    }
    Ok(tokens)
}
