use std::collections::HashMap;
use crate::core::error::{Error, ErrorKind, Result};

/// Per-keyword normalisation rule, registered once with a schema.
#[derive(Debug, Clone)]
pub enum KeywordType {
    /// Canonical decimal integer, leading zeros stripped.
    Integer,
    /// `yyyyMMdd`, validated but left as-is.
    Date,
    /// `HHMM`, short forms like `"12"` are right-padded with zeros.
    Time,
    /// Closed set of admissible values.
    Enum(Vec<String>),
    /// No normalisation; value is used verbatim.
    Opaque,
}

/// Maps keyword names to their normalisation type. Built once from a
/// schema and shared by every `Key` constructed against that schema.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<String, KeywordType>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry { types: HashMap::new() }
    }

    pub fn register(&mut self, keyword: impl Into<String>, kind: KeywordType) {
        self.types.insert(keyword.into(), kind);
    }

    pub fn declared(&self) -> impl Iterator<Item = (&String, &KeywordType)> {
        self.types.iter()
    }

    pub fn normalize(&self, keyword: &str, value: &str) -> Result<String> {
        match self.types.get(keyword) {
            None | Some(KeywordType::Opaque) => Ok(value.to_string()),
            Some(KeywordType::Integer) => {
                let n: i64 = value.parse().map_err(|_| {
                    Error::new(ErrorKind::InvalidArgument, format!("'{keyword}={value}' is not an integer"))
                })?;
                Ok(n.to_string())
            }
            Some(KeywordType::Date) => {
                if value.len() != 8 || !value.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(Error::new(ErrorKind::InvalidArgument, format!("'{keyword}={value}' is not yyyyMMdd")));
                }
                Ok(value.to_string())
            }
            Some(KeywordType::Time) => {
                if value.is_empty() || value.len() > 4 || !value.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(Error::new(ErrorKind::InvalidArgument, format!("'{keyword}={value}' is not HHMM")));
                }
                let mut padded = value.to_string();
                while padded.len() < 4 {
                    padded.push('0');
                }
                Ok(padded)
            }
            Some(KeywordType::Enum(allowed)) => {
                allowed
                    .iter()
                    .find(|a| a.eq_ignore_ascii_case(value))
                    .cloned()
                    .ok_or_else(|| Error::new(ErrorKind::InvalidArgument, format!("'{keyword}={value}' not in {allowed:?}")))
            }
        }
    }
}

/// Ordered keyword→value mapping. Insertion order is preserved for
/// iteration but `fingerprint` uses the caller-supplied schema order,
/// and equality is order-insensitive.
#[derive(Debug, Clone, Default)]
pub struct Key {
    entries: Vec<(String, String)>,
}

impl Key {
    pub fn new() -> Self {
        Key { entries: Vec::new() }
    }

    pub fn set(&mut self, registry: &TypeRegistry, keyword: &str, value: &str) -> Result<()> {
        let normalized = registry.normalize(keyword, value)?;
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| k == keyword) {
            entry.1 = normalized;
        } else {
            self.entries.push((keyword.to_string(), normalized));
        }
        Ok(())
    }

    /// Set without normalisation, for values already known canonical
    /// (hidden/optional defaults supplied by the schema).
    pub fn set_raw(&mut self, keyword: impl Into<String>, value: impl Into<String>) {
        let keyword = keyword.into();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == keyword) {
            entry.1 = value;
        } else {
            self.entries.push((keyword, value));
        }
    }

    pub fn get(&self, keyword: &str) -> Option<&str> {
        self.entries.iter().find(|(k, _)| k == keyword).map(|(_, v)| v.as_str())
    }

    pub fn has(&self, keyword: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == keyword)
    }

    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Schema-ordered concatenation used as the B-tree key fingerprint.
    /// Missing keywords serialise as an empty segment; callers pre-fill
    /// hidden/optional defaults before calling this so the result is
    /// total over `order`.
    pub fn fingerprint(&self, order: &[String]) -> String {
        let mut out = String::new();
        for kw in order {
            out.push_str(self.get(kw).unwrap_or(""));
            out.push(':');
        }
        out
    }

    /// Subset of `self` restricted to `keywords`, preserving `order`.
    pub fn project(&self, keywords: &[String]) -> Key {
        let mut out = Key::new();
        for kw in keywords {
            if let Some(v) = self.get(kw) {
                out.set_raw(kw.clone(), v.to_string());
            }
        }
        out
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        if self.entries.len() != other.entries.len() {
            return false;
        }
        self.entries.iter().all(|(k, v)| other.get(k) == Some(v.as_str()))
    }
}

impl Eq for Key {}
