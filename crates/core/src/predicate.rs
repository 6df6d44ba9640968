//! Row predicates
//!
//! A [`Predicate`] selects rows of a log by key and value. Every predicate has
//! two renderings:
//!
//! - `test`: evaluated in-process, used by the in-memory backend
//! - `sql`: a parametrized `WHERE` fragment for a relational backend
//!
//! Both renderings must select the same rows. Predicates compose with
//! [`And`] and [`Or`]; [`MatchAll`] and [`MatchNone`] are the identities.

use std::fmt;
use uuid::Uuid;

/// Parameter bound to a `?` placeholder of a [`SqlFilter`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    /// UUID column value
    Uuid(Uuid),
    /// Text column value
    Text(String),
    /// Integer column value
    Int(i64),
}

/// Parametrized SQL filter: a `WHERE` template with `?` placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlFilter {
    template: String,
    params: Vec<SqlParam>,
}

impl SqlFilter {
    /// Create a filter
    pub fn new(template: impl Into<String>, params: Vec<SqlParam>) -> Self {
        Self {
            template: template.into(),
            params,
        }
    }

    /// Filter accepting every row
    pub fn always() -> Self {
        Self::new("1 = 1", Vec::new())
    }

    /// Filter rejecting every row
    pub fn never() -> Self {
        Self::new("1 = 0", Vec::new())
    }

    /// `WHERE` template
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Bound parameters, in placeholder order
    pub fn params(&self) -> &[SqlParam] {
        &self.params
    }

    fn join(filters: Vec<SqlFilter>, operator: &str) -> Self {
        let mut templates = Vec::with_capacity(filters.len());
        let mut params = Vec::new();
        for filter in filters {
            templates.push(filter.template);
            params.extend(filter.params);
        }
        Self::new(format!("({})", templates.join(operator)), params)
    }
}

impl fmt::Display for SqlFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

/// Boolean predicate over log rows
pub trait Predicate<K, V>: Send + Sync + fmt::Debug {
    /// Evaluate against one row
    fn test(&self, key: &K, value: &V) -> bool;

    /// Render as a parametrized SQL filter
    fn sql(&self) -> SqlFilter;
}

/// Boxed predicate, the form composed by [`And`] and [`Or`]
pub type BoxedPredicate<K, V> = Box<dyn Predicate<K, V>>;

/// Conjunction; empty conjunction matches everything
pub struct And<K, V> {
    parts: Vec<BoxedPredicate<K, V>>,
}

impl<K, V> And<K, V> {
    /// Create a conjunction
    pub fn new(parts: Vec<BoxedPredicate<K, V>>) -> Self {
        Self { parts }
    }

    /// Add another conjunct
    pub fn and(mut self, part: impl Predicate<K, V> + 'static) -> Self {
        self.parts.push(Box::new(part));
        self
    }
}

impl<K, V> fmt::Debug for And<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("And").field(&self.parts).finish()
    }
}

impl<K, V> Predicate<K, V> for And<K, V> {
    fn test(&self, key: &K, value: &V) -> bool {
        self.parts.iter().all(|p| p.test(key, value))
    }

    fn sql(&self) -> SqlFilter {
        if self.parts.is_empty() {
            return SqlFilter::always();
        }
        SqlFilter::join(self.parts.iter().map(|p| p.sql()).collect(), " AND ")
    }
}

/// Disjunction; empty disjunction matches nothing
pub struct Or<K, V> {
    parts: Vec<BoxedPredicate<K, V>>,
}

impl<K, V> Or<K, V> {
    /// Create a disjunction
    pub fn new(parts: Vec<BoxedPredicate<K, V>>) -> Self {
        Self { parts }
    }

    /// Add another disjunct
    pub fn or(mut self, part: impl Predicate<K, V> + 'static) -> Self {
        self.parts.push(Box::new(part));
        self
    }
}

impl<K, V> fmt::Debug for Or<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Or").field(&self.parts).finish()
    }
}

impl<K, V> Predicate<K, V> for Or<K, V> {
    fn test(&self, key: &K, value: &V) -> bool {
        self.parts.iter().any(|p| p.test(key, value))
    }

    fn sql(&self) -> SqlFilter {
        if self.parts.is_empty() {
            return SqlFilter::never();
        }
        SqlFilter::join(self.parts.iter().map(|p| p.sql()).collect(), " OR ")
    }
}

/// Matches every row
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchAll;

impl<K, V> Predicate<K, V> for MatchAll {
    fn test(&self, _key: &K, _value: &V) -> bool {
        true
    }

    fn sql(&self) -> SqlFilter {
        SqlFilter::always()
    }
}

/// Matches no row
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchNone;

impl<K, V> Predicate<K, V> for MatchNone {
    fn test(&self, _key: &K, _value: &V) -> bool {
        false
    }

    fn sql(&self) -> SqlFilter {
        SqlFilter::never()
    }
}
