use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, alphanumeric1, char, multispace0},
    combinator::{map, opt, recognize},
    multi::{many0, many1, separated_list1},
    sequence::{delimited, pair, preceded},
    IResult,
};

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::key::{Key, KeywordType, TypeRegistry};
use crate::core::types::Request;
use crate::schema::matcher::Matcher;
use crate::schema::predicate::Predicate;
use crate::schema::rule::{Level, Rule};

/// A full key decomposed and re-grouped into index-level candidates
/// ready for per-database, per-axis pruning (spec.md §4.2 request
/// expansion; §4.7 retrieval step 1).
#[derive(Debug, Clone)]
pub struct ExpandedIndex {
    pub db_key: Key,
    pub idx_rule: Rule,
}

#[derive(Debug, Clone)]
pub struct Schema {
    pub rules: Vec<Rule>,
    pub registry: TypeRegistry,
}

impl Schema {
    pub fn new(rules: Vec<Rule>, registry: TypeRegistry) -> Self {
        Schema { rules, registry }
    }

    /// Decompose `key` into `(database-key, index-key, datum-key)`,
    /// spec.md §4.2.
    pub fn decompose(&self, key: &Key) -> Result<(Key, Key, Key)> {
        let db_rule = self
            .rules
            .iter()
            .find(|r| r.matches(key))
            .ok_or_else(|| Error::new(ErrorKind::SchemaIncompatible, "no database-level rule matches key"))?;
        let idx_rule = db_rule
            .children
            .iter()
            .find(|r| r.matches(key))
            .ok_or_else(|| Error::new(ErrorKind::SchemaIncompatible, "no index-level rule matches key"))?;
        let datum_rule = idx_rule
            .children
            .iter()
            .find(|r| r.matches(key))
            .ok_or_else(|| Error::new(ErrorKind::SchemaIncompatible, "no datum-level rule matches key"))?;

        let mut consumed: HashSet<&str> = HashSet::new();
        for r in [db_rule, idx_rule, datum_rule] {
            for p in &r.predicates {
                consumed.insert(p.keyword.as_str());
            }
        }
        for kw in key.keywords() {
            if !consumed.contains(kw) {
                return Err(Error::new(ErrorKind::SchemaOverspecified, format!("keyword '{kw}' not consumed by any schema level")));
            }
        }

        Ok((db_rule.build_subkey(key), idx_rule.build_subkey(key), datum_rule.build_subkey(key)))
    }

    /// Order in which a database-level rule's keywords must be
    /// concatenated to fingerprint a database key.
    pub fn db_order(&self, db_key: &Key) -> Result<Vec<String>> {
        let rule = self
            .rules
            .iter()
            .find(|r| r.matches(db_key))
            .ok_or_else(|| Error::new(ErrorKind::SchemaIncompatible, "database key matches no rule"))?;
        Ok(rule.order())
    }

    /// Expand `request` into `(database-key, index-rule)` candidates.
    /// Database-level keywords must be concretely resolvable from the
    /// request (an `Any` predicate with no requested values cannot
    /// enumerate databases without a directory listing, which the
    /// core engine deliberately does not perform — see DESIGN.md).
    pub fn expand(&self, request: &Request) -> Result<Vec<ExpandedIndex>> {
        let mut out = Vec::new();
        for db_rule in &self.rules {
            if !db_rule.compatible_with_request(|kw| request.get(kw).map(|v| v.to_vec())) {
                continue;
            }
            let db_keys = Self::cartesian(db_rule, request, None);
            if db_keys.is_empty() {
                continue;
            }
            for idx_rule in &db_rule.children {
                if !idx_rule.compatible_with_request(|kw| request.get(kw).map(|v| v.to_vec())) {
                    continue;
                }
                for db_key in &db_keys {
                    out.push(ExpandedIndex { db_key: db_key.clone(), idx_rule: idx_rule.clone() });
                }
            }
        }
        if out.is_empty() {
            return Err(Error::new(ErrorKind::SchemaIncompatible, "request matches no schema rule"));
        }
        Ok(out)
    }

    /// Cartesian product of a rule's predicates' admissible values,
    /// optionally pruned by a per-keyword axis (index-axis based
    /// pruning, spec.md §4.2/§4.7).
    pub fn cartesian(rule: &Rule, request: &Request, axis: Option<&HashMap<String, HashSet<String>>>) -> Vec<Key> {
        let mut keys = vec![Key::new()];
        for p in &rule.predicates {
            let axis_set = axis.and_then(|a| a.get(&p.keyword));
            let values = p.admissible(request.get(&p.keyword), axis_set);
            if values.is_empty() {
                return Vec::new();
            }
            let mut next = Vec::with_capacity(keys.len() * values.len());
            for k in &keys {
                for v in &values {
                    let mut nk = k.clone();
                    nk.set_raw(p.keyword.clone(), v.clone());
                    next.push(nk);
                }
            }
            keys = next;
        }
        keys
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (kw, kind) in self.registry.declared() {
            let _ = writeln!(out, "{kw}:{};", type_name(kind));
        }
        let rendered: Vec<String> = self.rules.iter().map(render_rule).collect();
        out.push_str(&rendered.join(";\n"));
        out.push('\n');
        out
    }

    pub fn parse(text: &str) -> Result<Schema> {
        parse_schema(text)
    }
}

fn type_name(kind: &KeywordType) -> String {
    match kind {
        KeywordType::Integer => "Integer".to_string(),
        KeywordType::Date => "Date".to_string(),
        KeywordType::Time => "Time".to_string(),
        KeywordType::Opaque => "Opaque".to_string(),
        KeywordType::Enum(values) => format!("Enum({})", values.join(",")),
    }
}

fn render_rule(rule: &Rule) -> String {
    let preds: Vec<String> = rule
        .predicates
        .iter()
        .map(|p| match &p.matcher {
            Matcher::Any => p.keyword.clone(),
            Matcher::Value(v) => format!("{}={}", p.keyword, v),
            Matcher::Hidden(v) => format!("{}={}(hidden)", p.keyword, v),
            Matcher::Optional(v) => format!("{}?{}", p.keyword, v),
        })
        .collect();
    let mut out = preds.join(",");
    if !rule.children.is_empty() {
        let children: Vec<String> = rule.children.iter().map(render_rule).collect();
        out.push('[');
        out.push_str(&children.join(";"));
        out.push(']');
    }
    out
}

// --- nom grammar -----------------------------------------------------
//
// schema    := typedecl* rule (';' rule)*
// typedecl  := ident ':' typename ';'
// typename  := "Integer" | "Date" | "Time" | "Enum(" ident (',' ident)* ')'
// rule      := predlist ('[' rule (';' rule)* ']')?
// predlist  := predicate (',' predicate)*
// predicate := ident ('=' value ('(hidden)')? | '?' value)?

fn ident(input: &str) -> IResult<&str, &str> {
    recognize(pair(alt((alpha1, tag("_"))), many0(alt((alphanumeric1, tag("_"))))))(input)
}

fn value(input: &str) -> IResult<&str, &str> {
    recognize(many1(alt((alphanumeric1, tag("_"), tag("-"), tag(".")))))(input)
}

fn typename(input: &str) -> IResult<&str, KeywordType> {
    alt((
        map(tag("Integer"), |_| KeywordType::Integer),
        map(tag("Date"), |_| KeywordType::Date),
        map(tag("Time"), |_| KeywordType::Time),
        map(
            delimited(tag("Enum("), separated_list1(char(','), value), char(')')),
            |vs: Vec<&str>| KeywordType::Enum(vs.into_iter().map(String::from).collect()),
        ),
        map(tag("Opaque"), |_| KeywordType::Opaque),
    ))(input)
}

fn typedecl(input: &str) -> IResult<&str, (String, KeywordType)> {
    let (input, kw) = ident(input)?;
    let (input, _) = char(':')(input)?;
    let (input, kind) = typename(input)?;
    let (input, _) = char(';')(input)?;
    let (input, _) = multispace0(input)?;
    Ok((input, (kw.to_string(), kind)))
}

fn predicate(input: &str) -> IResult<&str, Predicate> {
    let (input, kw) = ident(input)?;
    let (input, matcher) = opt(alt((
        map(preceded(char('='), pair(value, opt(tag("(hidden)")))), |(v, hidden)| {
            if hidden.is_some() { Matcher::Hidden(v.to_string()) } else { Matcher::Value(v.to_string()) }
        }),
        map(preceded(char('?'), value), |v| Matcher::Optional(v.to_string())),
    )))(input)?;
    Ok((input, Predicate::new(kw, matcher.unwrap_or(Matcher::Any))))
}

fn predicate_list(input: &str) -> IResult<&str, Vec<Predicate>> {
    separated_list1(preceded(multispace0, char(',')), preceded(multispace0, predicate))(input)
}

fn rule(level: Level) -> impl Fn(&str) -> IResult<&str, Rule> {
    move |input: &str| {
        let (input, _) = multispace0(input)?;
        let (input, predicates) = predicate_list(input)?;
        let (input, _) = multispace0(input)?;
        let (input, children) = opt(delimited(
            char('['),
            separated_list1(preceded(multispace0, char(';')), preceded(multispace0, rule(level.child()))),
            preceded(multispace0, char(']')),
        ))(input)?;
        let (input, _) = multispace0(input)?;
        Ok((input, Rule::new(level, predicates, children.unwrap_or_default())))
    }
}

fn schema_body(input: &str) -> IResult<&str, Vec<Rule>> {
    separated_list1(preceded(multispace0, char(';')), preceded(multispace0, rule(Level::Database)))(input)
}

fn parse_schema(text: &str) -> Result<Schema> {
    let mut registry = TypeRegistry::new();
    let mut rest = text;
    loop {
        let (next, _) = multispace0::<_, nom::error::Error<&str>>(rest).map_err(|e| nom_err("schema", e))?;
        rest = next;
        match typedecl(rest) {
            Ok((next, (kw, kind))) => {
                registry.register(kw, kind);
                rest = next;
            }
            Err(_) => break,
        }
    }
    let (rest, rules) = schema_body(rest).map_err(|e| nom_err("schema", e))?;
    let (rest, _) = multispace0::<_, nom::error::Error<&str>>(rest).map_err(|e| nom_err("schema", e))?;
    if !rest.trim().is_empty() {
        return Err(Error::new(ErrorKind::Parse, format!("trailing input in schema: {rest:?}")));
    }
    Ok(Schema::new(rules, registry))
}

fn nom_err(what: &str, e: nom::Err<nom::error::Error<&str>>) -> Error {
    Error::new(ErrorKind::Parse, format!("failed to parse {what}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_schema() -> Schema {
        let text = "\
date:Date;
time:Time;
class,stream,expver=0001[date,time[param]]";
        Schema::parse(text).unwrap()
    }

    #[test]
    fn decompose_splits_levels() {
        let schema = test_schema();
        let mut key = Key::new();
        key.set(&schema.registry, "class", "od").unwrap();
        key.set(&schema.registry, "stream", "oper").unwrap();
        key.set(&schema.registry, "expver", "0001").unwrap();
        key.set(&schema.registry, "date", "20240101").unwrap();
        key.set(&schema.registry, "time", "00").unwrap();
        key.set(&schema.registry, "param", "129").unwrap();

        let (db, idx, datum) = schema.decompose(&key).unwrap();
        assert_eq!(db.get("class"), Some("od"));
        assert_eq!(idx.get("date"), Some("20240101"));
        assert_eq!(idx.get("time"), Some("0000"));
        assert_eq!(datum.get("param"), Some("129"));
    }

    #[test]
    fn overspecified_key_rejected() {
        let schema = test_schema();
        let mut key = Key::new();
        key.set(&schema.registry, "class", "od").unwrap();
        key.set(&schema.registry, "stream", "oper").unwrap();
        key.set(&schema.registry, "expver", "0001").unwrap();
        key.set(&schema.registry, "date", "20240101").unwrap();
        key.set(&schema.registry, "time", "00").unwrap();
        key.set(&schema.registry, "param", "129").unwrap();
        key.set_raw("bogus", "x");

        let err = schema.decompose(&key).unwrap_err();
        assert_eq!(err.kind, ErrorKind::SchemaOverspecified);
    }

    #[test]
    fn incompatible_key_rejected() {
        let schema = test_schema();
        let mut key = Key::new();
        key.set(&schema.registry, "stream", "oper").unwrap();
        let err = schema.decompose(&key).unwrap_err();
        assert_eq!(err.kind, ErrorKind::SchemaIncompatible);
    }

    #[test]
    fn round_trips_through_text() {
        let schema = test_schema();
        let text = schema.to_text();
        let reparsed = Schema::parse(&text).unwrap();
        assert_eq!(reparsed.rules.len(), schema.rules.len());
    }
}
