//! Operation selector matching.
//!
//! # Responsibilities
//! - Parse selector patterns (`/*`, `/prefix/*`, exact operation)
//! - Store items registered under each selector
//! - Resolve every item whose selector matches an operation
//!
//! # Design Decisions
//! - Generic over the stored item: no knowledge of HTTP
//! - Registration accumulates; nothing is replaced or dropped
//! - Output order is general to specific: global, prefixes by increasing
//!   length, then the exact rule
//! - Prefix matching is case-sensitive, no regex

use std::collections::HashMap;

/// A parsed selector pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// `/*`: every operation.
    Global,
    /// `/service/*`: operations starting with the stored prefix (trailing `/` kept).
    Prefix(String),
    /// Anything else: only the identical operation.
    Exact(String),
}

impl Selector {
    /// Parse a selector string.
    pub fn parse(selector: &str) -> Self {
        if selector == "/*" || selector == "*" {
            Selector::Global
        } else if let Some(prefix) = selector.strip_suffix('*') {
            Selector::Prefix(prefix.to_string())
        } else {
            Selector::Exact(selector.to_string())
        }
    }

    /// Returns true if `operation` is selected by this pattern.
    pub fn matches(&self, operation: &str) -> bool {
        match self {
            Selector::Global => true,
            Selector::Prefix(prefix) => operation.starts_with(prefix.as_str()),
            Selector::Exact(exact) => operation == exact,
        }
    }
}

/// Maps operations to the ordered items registered for matching selectors.
#[derive(Debug, Clone)]
pub struct Matcher<T> {
    global: Vec<T>,
    /// Sorted longest prefix first.
    prefixes: Vec<(String, Vec<T>)>,
    exact: HashMap<String, Vec<T>>,
}

impl<T> Default for Matcher<T> {
    fn default() -> Self {
        Self {
            global: Vec::new(),
            prefixes: Vec::new(),
            exact: HashMap::new(),
        }
    }
}

impl<T: Clone> Matcher<T> {
    /// Create an empty matcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `items` under `selector`. Repeated calls append.
    pub fn add(&mut self, selector: &str, items: impl IntoIterator<Item = T>) {
        match Selector::parse(selector) {
            Selector::Global => self.global.extend(items),
            Selector::Exact(op) => self.exact.entry(op).or_default().extend(items),
            Selector::Prefix(prefix) => {
                match self.prefixes.iter_mut().find(|(p, _)| *p == prefix) {
                    Some((_, existing)) => existing.extend(items),
                    None => {
                        self.prefixes.push((prefix, items.into_iter().collect()));
                        // Stable sort keeps equal-length prefixes in registration order.
                        self.prefixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
                    }
                }
            }
        }
    }

    /// Every item whose selector matches `operation`, general to specific.
    pub fn matches(&self, operation: &str) -> Vec<T> {
        let mut out = self.global.clone();

        let mut matched: Vec<&Vec<T>> = self
            .prefixes
            .iter()
            .filter(|(prefix, _)| operation.starts_with(prefix.as_str()))
            .map(|(_, items)| items)
            .collect();
        matched.reverse();
        for items in matched {
            out.extend(items.iter().cloned());
        }

        if let Some(items) = self.exact.get(operation) {
            out.extend(items.iter().cloned());
        }
        out
    }

    /// Returns true if nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.prefixes.is_empty() && self.exact.is_empty()
    }
}
