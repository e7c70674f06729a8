pub mod matcher;
pub mod predicate;
pub mod rule;
pub mod schema;
