//! JSON recovery for LLM output: extraction, tolerant repair, and a
//! lenient dialect parser.
//!
//! Models asked for JSON return it wrapped in prose, fenced in markdown,
//! with trailing commas, single quotes, or unquoted keys. The chain here
//! runs strictly in order of increasing tolerance so well-formed output
//! never pays for the recovery machinery.

use serde_json::Value;

/// Parse with escalating tolerance:
/// 1. the text as-is,
/// 2. the extracted JSON span (fenced block or first balanced braces),
/// 3. the repaired extraction,
/// 4. the lenient-dialect parse of the extraction.
pub fn parse_chain(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
        return Some(value);
    }
    let span = extract_json(text)?;
    if let Ok(value) = serde_json::from_str::<Value>(&span) {
        return Some(value);
    }
    if let Ok(value) = serde_json::from_str::<Value>(&repair(&span)) {
        return Some(value);
    }
    lenient_parse(&span)
}

/// Pull the most plausible JSON span out of surrounding prose: a fenced
/// ```json block if present, otherwise the first balanced `{…}` or `[…]`.
pub fn extract_json(text: &str) -> Option<String> {
    for fence in ["```json", "```"] {
        if let Some(start) = text.find(fence) {
            let body = &text[start + fence.len()..];
            if let Some(end) = body.find("```") {
                let candidate = body[..end].trim();
                if candidate.starts_with('{') || candidate.starts_with('[') {
                    return Some(candidate.to_string());
                }
            }
        }
    }

    let open = text.find(['{', '['])?;
    let bytes = text.as_bytes();
    let (open_ch, close_ch) = if bytes[open] == b'{' { (b'{', b'}') } else { (b'[', b']') };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b if b == open_ch => depth += 1,
            b if b == close_ch => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[open..=i].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// String-aware repairs: drop `//` and `/* */` comments, remove trailing
/// commas, convert single-quoted strings to double-quoted.
pub fn repair(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    let mut in_string = false;
    let mut single_quoted = false;

    while i < chars.len() {
        let c = chars[i];

        if in_string {
            let quote = if single_quoted { '\'' } else { '"' };
            if c == '\\' && i + 1 < chars.len() {
                out.push(c);
                out.push(chars[i + 1]);
                i += 2;
                continue;
            }
            if c == quote {
                in_string = false;
                out.push('"');
            } else if c == '"' && single_quoted {
                // Escape inner double quotes when normalizing.
                out.push_str("\\\"");
            } else {
                out.push(c);
            }
            i += 1;
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                single_quoted = false;
                out.push('"');
                i += 1;
            }
            '\'' => {
                in_string = true;
                single_quoted = true;
                out.push('"');
                i += 1;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i + 1 < chars.len() && !(chars[i] == '*' && chars[i + 1] == '/') {
                    i += 1;
                }
                i = (i + 2).min(chars.len());
            }
            ',' => {
                // Trailing comma: lookahead to the next non-whitespace.
                let mut j = i + 1;
                while j < chars.len() && chars[j].is_whitespace() {
                    j += 1;
                }
                if matches!(chars.get(j), Some('}') | Some(']')) {
                    i += 1; // drop the comma
                } else {
                    out.push(',');
                    i += 1;
                }
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// Recursive-descent parser for a lenient JSON dialect: unquoted object
/// keys, single-quoted strings, trailing commas, and bare `true` /
/// `false` / `null`. Returns `None` on anything it cannot make sense of.
pub fn lenient_parse(text: &str) -> Option<Value> {
    let mut parser = Lenient { chars: text.chars().collect(), pos: 0 };
    let value = parser.value()?;
    parser.skip_ws();
    parser.at_end().then_some(value)
}

struct Lenient {
    chars: Vec<char>,
    pos: usize,
}

impl Lenient {
    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn value(&mut self) -> Option<Value> {
        self.skip_ws();
        match self.peek()? {
            '{' => self.object(),
            '[' => self.array(),
            '"' | '\'' => self.string().map(Value::String),
            c if c == '-' || c.is_ascii_digit() => self.number(),
            _ => self.word(),
        }
    }

    fn object(&mut self) -> Option<Value> {
        self.bump(); // '{'
        let mut map = serde_json::Map::new();
        loop {
            self.skip_ws();
            match self.peek()? {
                '}' => {
                    self.bump();
                    return Some(Value::Object(map));
                }
                ',' => {
                    self.bump();
                }
                _ => {
                    let key = self.key()?;
                    self.skip_ws();
                    if self.bump()? != ':' {
                        return None;
                    }
                    let value = self.value()?;
                    map.insert(key, value);
                }
            }
        }
    }

    fn array(&mut self) -> Option<Value> {
        self.bump(); // '['
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.peek()? {
                ']' => {
                    self.bump();
                    return Some(Value::Array(items));
                }
                ',' => {
                    self.bump();
                }
                _ => items.push(self.value()?),
            }
        }
    }

    fn key(&mut self) -> Option<String> {
        match self.peek()? {
            '"' | '\'' => self.string(),
            c if c.is_alphanumeric() || c == '_' => {
                let mut key = String::new();
                while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '-') {
                    key.push(self.bump()?);
                }
                Some(key)
            }
            _ => None,
        }
    }

    fn string(&mut self) -> Option<String> {
        let quote = self.bump()?;
        let mut out = String::new();
        loop {
            let c = self.bump()?;
            if c == quote {
                return Some(out);
            }
            if c == '\\' {
                match self.bump()? {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    'u' => {
                        let mut code = 0u32;
                        for _ in 0..4 {
                            code = code * 16 + self.bump()?.to_digit(16)?;
                        }
                        out.push(char::from_u32(code)?);
                    }
                    other => out.push(other),
                }
            } else {
                out.push(c);
            }
        }
    }

    fn number(&mut self) -> Option<Value> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.bump();
        }
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || c == '+' || c == '-')
        {
            self.bump();
        }
        let raw: String = self.chars[start..self.pos].iter().collect();
        serde_json::from_str::<serde_json::Number>(&raw).ok().map(Value::Number)
    }

    fn word(&mut self) -> Option<Value> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_alphanumeric()) {
            self.bump();
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            "null" => Some(Value::Null),
            _ => None,
        }
    }
}
