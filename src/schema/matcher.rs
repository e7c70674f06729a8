use std::collections::HashSet;

/// A single keyword-level matcher within a `Rule`'s predicate list.
/// See spec.md §4.2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    /// Accepts any value; records whatever the key carries.
    Any,
    /// Accepts only the given value.
    Value(String),
    /// Always matches; supplies the default when the key lacks the
    /// keyword. Never appears in the visible (decomposed) key.
    Hidden(String),
    /// Matches if present, else injects the default into the
    /// decomposed key.
    Optional(String),
}

impl Matcher {
    pub fn is_hidden(&self) -> bool {
        matches!(self, Matcher::Hidden(_))
    }

    pub fn matches(&self, value: Option<&str>) -> bool {
        match self {
            Matcher::Any => value.is_some(),
            Matcher::Value(v) => value == Some(v.as_str()),
            Matcher::Hidden(_) | Matcher::Optional(_) => true,
        }
    }

    pub fn default_value(&self) -> Option<&str> {
        match self {
            Matcher::Hidden(d) | Matcher::Optional(d) => Some(d.as_str()),
            _ => None,
        }
    }

    /// Values admissible for this predicate given the request's
    /// explicit value list for this keyword (`None` = unconstrained)
    /// and an optional axis filter (the values actually observed by
    /// the index being considered).
    pub fn admissible(&self, requested: Option<&[String]>, axis: Option<&HashSet<String>>) -> Vec<String> {
        let passes_axis = |v: &str| axis.map_or(true, |a| a.contains(v));
        match self {
            Matcher::Value(v) => {
                if let Some(r) = requested {
                    if !r.iter().any(|x| x == v) {
                        return Vec::new();
                    }
                }
                if passes_axis(v) { vec![v.clone()] } else { Vec::new() }
            }
            Matcher::Hidden(d) => vec![d.clone()],
            Matcher::Optional(d) => match requested {
                Some(r) if !r.is_empty() => r.iter().filter(|v| passes_axis(v)).cloned().collect(),
                _ => vec![d.clone()],
            },
            Matcher::Any => match requested {
                Some(r) => r.iter().filter(|v| passes_axis(v)).cloned().collect(),
                None => axis.map(|a| a.iter().cloned().collect()).unwrap_or_default(),
            },
        }
    }
}
