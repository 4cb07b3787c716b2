//! ASN 值的文本记法
//!
//! 支持的子集：
//!
//! ```text
//! value := label ':' value                 CHOICE
//!        | '{' '}'                         空 SEQUENCE / SEQUENCE OF
//!        | '{' label value (',' ...)* '}'  SEQUENCE
//!        | '{' value (',' value)* '}'      SEQUENCE OF
//!        | ['-'] digits | '"' chars '"' | '\'' hex '\'' 'H' | TRUE | FALSE
//! ```

use std::fmt;
use std::str::FromStr;

use super::value::AsnValue;
use crate::error::{Result, TadError};

impl AsnValue {
    /// 解析文本，返回值与消耗的字符数（不含尾部空白）
    pub fn parse_text(text: &str) -> Result<(AsnValue, usize)> {
        let mut p = Parser { s: text.as_bytes(), pos: 0 };
        let v = p.value()?;
        Ok((v, p.pos))
    }

    /// 解析完整文本，尾部只允许空白
    pub fn from_text(text: &str) -> Result<AsnValue> {
        let (v, used) = Self::parse_text(text)?;
        if text[used..].trim().is_empty() {
            Ok(v)
        } else {
            Err(TadError::AsnParse {
                pos: used,
                msg: "trailing characters".into(),
            })
        }
    }
}

impl FromStr for AsnValue {
    type Err = TadError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_text(s)
    }
}

struct Parser<'a> {
    s: &'a [u8],
    pos: usize,
}

fn is_label_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'-' || c == b'_'
}

impl Parser<'_> {
    fn err<T>(&self, msg: &str) -> Result<T> {
        Err(TadError::AsnParse {
            pos: self.pos,
            msg: msg.to_string(),
        })
    }

    fn peek(&self) -> Option<u8> {
        self.s.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn label(&mut self) -> &str {
        let start = self.pos;
        while self.peek().is_some_and(is_label_char) {
            self.pos += 1;
        }
        // 标签只含 ASCII 字符
        std::str::from_utf8(&self.s[start..self.pos]).unwrap_or_default()
    }

    fn value(&mut self) -> Result<AsnValue> {
        self.skip_ws();
        match self.peek() {
            Some(b'{') => self.braced(),
            Some(b'"') => self.char_string(),
            Some(b'\'') => self.octets(),
            Some(c) if c == b'-' || c.is_ascii_digit() => self.integer(),
            Some(c) if c.is_ascii_alphabetic() => {
                let label = self.label().to_string();
                self.after_label(label)
            }
            Some(_) => self.err("unexpected character"),
            None => self.err("unexpected end of text"),
        }
    }

    /// 标签之后只能是 `:`（CHOICE），或者布尔字面量本身
    fn after_label(&mut self, label: String) -> Result<AsnValue> {
        self.skip_ws();
        if self.peek() == Some(b':') {
            self.pos += 1;
            let inner = self.value()?;
            return Ok(AsnValue::Choice(label, Box::new(inner)));
        }
        match label.as_str() {
            "TRUE" => Ok(AsnValue::Bool(true)),
            "FALSE" => Ok(AsnValue::Bool(false)),
            _ => self.err("expected ':' after label"),
        }
    }

    fn braced(&mut self) -> Result<AsnValue> {
        self.pos += 1;
        self.skip_ws();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(AsnValue::empty());
        }

        let mut named: Vec<(String, AsnValue)> = Vec::new();
        let mut unnamed: Vec<AsnValue> = Vec::new();
        loop {
            self.skip_ws();
            if self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
                let label = self.label().to_string();
                self.skip_ws();
                match self.peek() {
                    Some(b':') | Some(b',') | Some(b'}') => unnamed.push(self.after_label(label)?),
                    _ => named.push((label, self.value()?)),
                }
            } else {
                unnamed.push(self.value()?);
            }
            if !named.is_empty() && !unnamed.is_empty() {
                return self.err("mixed named and unnamed items");
            }

            self.skip_ws();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {
                    self.pos += 1;
                    break;
                }
                _ => return self.err("expected ',' or '}'"),
            }
        }

        if named.is_empty() {
            Ok(AsnValue::SequenceOf(unnamed))
        } else {
            Ok(AsnValue::Sequence(named))
        }
    }

    fn integer(&mut self) -> Result<AsnValue> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let digits = std::str::from_utf8(&self.s[start..self.pos]).unwrap_or_default();
        match digits.parse::<i64>() {
            Ok(v) => Ok(AsnValue::Integer(v)),
            Err(_) => {
                self.pos = start;
                self.err("bad integer")
            }
        }
    }

    fn char_string(&mut self) -> Result<AsnValue> {
        self.pos += 1;
        let mut out = Vec::new();
        loop {
            match self.peek() {
                None => return self.err("unterminated string"),
                Some(b'"') => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(c) => out.push(c),
                        None => return self.err("unterminated string"),
                    }
                    self.pos += 1;
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
        match String::from_utf8(out) {
            Ok(s) => Ok(AsnValue::CharString(s)),
            Err(_) => self.err("string is not UTF-8"),
        }
    }

    fn octets(&mut self) -> Result<AsnValue> {
        self.pos += 1;
        let mut digits = String::new();
        loop {
            match self.peek() {
                None => return self.err("unterminated octet string"),
                Some(b'\'') => {
                    self.pos += 1;
                    break;
                }
                Some(c) if c.is_ascii_hexdigit() => {
                    digits.push(c as char);
                    self.pos += 1;
                }
                Some(c) if c.is_ascii_whitespace() || c == b':' => self.pos += 1,
                Some(_) => return self.err("bad hex digit"),
            }
        }
        if self.peek() != Some(b'H') {
            return self.err("expected 'H' after octet string");
        }
        self.pos += 1;
        if digits.len() % 2 != 0 {
            digits.push('0');
        }
        match hex::decode(&digits) {
            Ok(bytes) => Ok(AsnValue::OctetString(bytes)),
            Err(_) => self.err("bad hex digit"),
        }
    }
}

impl fmt::Display for AsnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsnValue::Bool(true) => f.write_str("TRUE"),
            AsnValue::Bool(false) => f.write_str("FALSE"),
            AsnValue::Integer(v) | AsnValue::Enumerated(v) | AsnValue::LongInt(v) => {
                write!(f, "{v}")
            }
            AsnValue::Real(v) => write!(f, "{v}"),
            AsnValue::Oid(arcs) => {
                let parts: Vec<String> = arcs.iter().map(u32::to_string).collect();
                write!(f, "{{ {} }}", parts.join(" "))
            }
            AsnValue::BitString(b) | AsnValue::OctetString(b) => {
                write!(f, "'{}'H", hex::encode_upper(b))
            }
            AsnValue::CharString(s) => {
                f.write_str("\"")?;
                for c in s.chars() {
                    if c == '"' || c == '\\' {
                        f.write_str("\\")?;
                    }
                    write!(f, "{c}")?;
                }
                f.write_str("\"")
            }
            AsnValue::Choice(label, v) => write!(f, "{label}:{v}"),
            AsnValue::Sequence(fields) if fields.is_empty() => f.write_str("{}"),
            AsnValue::SequenceOf(items) if items.is_empty() => f.write_str("{}"),
            AsnValue::Sequence(fields) => {
                f.write_str("{ ")?;
                for (i, (label, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{label} {v}")?;
                }
                f.write_str(" }")
            }
            AsnValue::SequenceOf(items) => {
                f.write_str("{ ")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str(" }")
            }
        }
    }
}
