//! Backend-specific quoting and escaping rules.
use crate::error::SanitizeError;

/// PostgreSQL lexical rules that affect rendering.
///
/// `standard_conforming_strings` decides whether a backslash inside
/// `'...'` is an ordinary character (the server default since 9.1) or an
/// escape that has to be doubled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    pub standard_conforming_strings: bool,
}

impl Default for Dialect {
    fn default() -> Self {
        Self::postgres()
    }
}

impl Dialect {
    pub const fn postgres() -> Self {
        Self {
            standard_conforming_strings: true,
        }
    }

    /// Rules for a server that reports `standard_conforming_strings = off`.
    pub const fn legacy_escapes() -> Self {
        Self {
            standard_conforming_strings: false,
        }
    }

    /// Interpret the value of the `standard_conforming_strings` setting.
    pub fn from_setting(value: &str) -> Self {
        Self {
            standard_conforming_strings: !value.trim().eq_ignore_ascii_case("off"),
        }
    }

    /// `"name"` with embedded quotes doubled.
    pub fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Escape `input` for use between single quotes. Quotes are doubled, and
    /// so are backslashes unless the server uses standard strings.
    pub fn escape_string(&self, input: &str) -> Result<String, SanitizeError> {
        if let Some(offset) = input.find('\0') {
            return Err(SanitizeError::InteriorNul(offset));
        }
        let mut escaped = String::with_capacity(input.len() + 2);
        for ch in input.chars() {
            match ch {
                '\'' => escaped.push_str("''"),
                '\\' if !self.standard_conforming_strings => escaped.push_str("\\\\"),
                _ => escaped.push(ch),
            }
        }
        Ok(escaped)
    }

    /// A complete string literal: `'...'`.
    pub fn string_literal(&self, input: &str) -> Result<String, SanitizeError> {
        Ok(format!("'{}'", self.escape_string(input)?))
    }
}
