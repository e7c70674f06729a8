use crate::core::key::Key;
use crate::schema::predicate::Predicate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Database,
    Index,
    Datum,
}

impl Level {
    pub fn child(self) -> Level {
        match self {
            Level::Database => Level::Index,
            Level::Index => Level::Datum,
            Level::Datum => Level::Datum,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub level: Level,
    pub predicates: Vec<Predicate>,
    pub children: Vec<Rule>,
}

impl Rule {
    pub fn new(level: Level, predicates: Vec<Predicate>, children: Vec<Rule>) -> Self {
        Rule { level, predicates, children }
    }

    pub fn matches(&self, key: &Key) -> bool {
        self.predicates.iter().all(|p| p.matches_key(key))
    }

    /// Schema-declared keyword order for fingerprinting a key decomposed
    /// at this level (spec.md §4.1): every predicate, visible or hidden.
    pub fn order(&self) -> Vec<String> {
        self.predicates.iter().map(|p| p.keyword.clone()).collect()
    }

    pub fn visible_order(&self) -> Vec<String> {
        self.predicates.iter().filter(|p| p.is_visible()).map(|p| p.keyword.clone()).collect()
    }

    /// Build the sub-key this rule decomposes `key` into: for each
    /// predicate, the key's own value if present, else the matcher's
    /// default (hidden/optional).
    pub fn build_subkey(&self, key: &Key) -> Key {
        let mut out = Key::new();
        for p in &self.predicates {
            if let Some(v) = key.get(&p.keyword) {
                out.set_raw(p.keyword.clone(), v.to_string());
            } else if let Some(d) = p.matcher.default_value() {
                out.set_raw(p.keyword.clone(), d.to_string());
            }
        }
        out
    }

    pub fn compatible_with_request(&self, get: impl Fn(&str) -> Option<Vec<String>>) -> bool {
        self.predicates.iter().all(|p| p.compatible_with_request(get(&p.keyword).as_deref()))
    }
}
