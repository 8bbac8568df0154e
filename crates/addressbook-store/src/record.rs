//! Contact records and their single-line text encoding
//!
//! `id,NAME=value,NAME=value`. Values escape `\`, `,`, CR and LF so a
//! record always fits on one line of the collection file.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const FIELD_SEPARATOR: char = ',';
const VALUE_SEPARATOR: char = '=';
const ESCAPE: char = '\\';

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("invalid record ID {0:?}")]
    InvalidId(String),

    #[error("invalid field name {0:?}")]
    InvalidFieldName(String),

    #[error("field {0:?} has no '=' separator")]
    MissingSeparator(String),

    #[error("line ends inside an escape sequence")]
    DanglingEscape,

    #[error("unknown escape sequence \\{0}")]
    UnknownEscape(char),

    #[error("field {0:?} appears twice")]
    DuplicateField(String),
}

/// A single address book entry, keyed by its record ID
///
/// Built once and never changed; edits produce a new record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactRecord {
    id: String,
    fields: BTreeMap<String, String>,
}

/// Record and user IDs share one charset
pub(crate) fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '@' | '(' | ')' | '_' | '-'))
}

fn is_valid_field_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl ContactRecord {
    pub fn new(id: &str) -> Result<Self, RecordError> {
        if !is_valid_id(id) {
            return Err(RecordError::InvalidId(id.to_string()));
        }
        Ok(Self {
            id: id.to_string(),
            fields: BTreeMap::new(),
        })
    }

    /// Add or overwrite a field
    pub fn with_field(mut self, name: &str, value: &str) -> Result<Self, RecordError> {
        if !is_valid_field_name(name) {
            return Err(RecordError::InvalidFieldName(name.to_string()));
        }
        self.fields.insert(name.to_string(), value.to_string());
        Ok(self)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// A copy of this record with `changes` applied. An empty value drops the field.
    pub fn edited<'a, I>(&self, changes: I) -> Result<Self, RecordError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut next = self.clone();
        for (name, value) in changes {
            if !is_valid_field_name(name) {
                return Err(RecordError::InvalidFieldName(name.to_string()));
            }
            if value.is_empty() {
                next.fields.remove(name);
            } else {
                next.fields.insert(name.to_string(), value.to_string());
            }
        }
        Ok(next)
    }

    /// Single-line text form
    pub fn encode(&self) -> String {
        let mut line = self.id.clone();
        for (name, value) in &self.fields {
            line.push(FIELD_SEPARATOR);
            line.push_str(name);
            line.push(VALUE_SEPARATOR);
            escape_into(value, &mut line);
        }
        line
    }

    pub fn decode(line: &str) -> Result<Self, RecordError> {
        let mut parts = split_unescaped(line)?.into_iter();

        // split_unescaped always yields at least one part
        let id = parts.next().unwrap_or_default();
        let mut record = Self::new(&id)?;

        for part in parts {
            let (name, raw) = part
                .split_once(VALUE_SEPARATOR)
                .ok_or_else(|| RecordError::MissingSeparator(part.clone()))?;
            if !is_valid_field_name(name) {
                return Err(RecordError::InvalidFieldName(name.to_string()));
            }
            if record.fields.contains_key(name) {
                return Err(RecordError::DuplicateField(name.to_string()));
            }
            record.fields.insert(name.to_string(), unescape(raw)?);
        }

        Ok(record)
    }
}

impl fmt::Display for ContactRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for ContactRecord {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

fn escape_into(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            ESCAPE => out.push_str("\\\\"),
            FIELD_SEPARATOR => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
}

/// Split on separators that are not escaped. Escapes are kept verbatim.
fn split_unescaped(line: &str) -> Result<Vec<String>, RecordError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            ESCAPE => {
                let next = chars.next().ok_or(RecordError::DanglingEscape)?;
                current.push(ESCAPE);
                current.push(next);
            }
            FIELD_SEPARATOR => parts.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    parts.push(current);
    Ok(parts)
}

fn unescape(raw: &str) -> Result<String, RecordError> {
    let mut value = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != ESCAPE {
            value.push(c);
            continue;
        }
        match chars.next() {
            Some(ESCAPE) => value.push(ESCAPE),
            Some(FIELD_SEPARATOR) => value.push(FIELD_SEPARATOR),
            Some('n') => value.push('\n'),
            Some('r') => value.push('\r'),
            Some(other) => return Err(RecordError::UnknownEscape(other)),
            None => return Err(RecordError::DanglingEscape),
        }
    }
    Ok(value)
}
