use std::collections::HashSet;
use crate::core::key::Key;
use crate::schema::matcher::Matcher;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub keyword: String,
    pub matcher: Matcher,
}

impl Predicate {
    pub fn new(keyword: impl Into<String>, matcher: Matcher) -> Self {
        Predicate { keyword: keyword.into(), matcher }
    }

    pub fn matches_key(&self, key: &Key) -> bool {
        self.matcher.matches(key.get(&self.keyword))
    }

    pub fn is_visible(&self) -> bool {
        !self.matcher.is_hidden()
    }

    /// Whether this predicate could still be satisfied by `request`,
    /// without yet knowing an index axis (used to prune whole rules
    /// before any directory/index I/O happens).
    pub fn compatible_with_request(&self, requested: Option<&[String]>) -> bool {
        match &self.matcher {
            Matcher::Value(v) => requested.map_or(true, |r| r.is_empty() || r.iter().any(|x| x == v)),
            Matcher::Hidden(_) | Matcher::Optional(_) => true,
            Matcher::Any => true,
        }
    }

    pub fn admissible(&self, requested: Option<&[String]>, axis: Option<&HashSet<String>>) -> Vec<String> {
        self.matcher.admissible(requested, axis)
    }
}
