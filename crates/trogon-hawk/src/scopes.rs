//! Scope sets and Taskcluster-style scope satisfaction.
//!
//! A held scope ending in `*` satisfies every required scope that starts with
//! the part before the `*`; otherwise scopes must match exactly.

use std::fmt;
use std::sync::Arc;

/// An ordered, immutable list of scopes.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct ScopeSet(Arc<[String]>);

impl ScopeSet {
    pub fn new<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(scopes.into_iter().map(Into::into).collect())
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether any held scope grants `required`.
    pub fn satisfies(&self, required: &str) -> bool {
        self.iter().any(|held| scope_grants(held, required))
    }

    /// Whether every scope in `other` is granted by this set.
    pub fn covers(&self, other: &ScopeSet) -> bool {
        other.iter().all(|s| self.satisfies(s))
    }

    /// Scopes of `other` this set does not grant, in `other`'s order.
    pub fn uncovered(&self, other: &ScopeSet) -> Vec<String> {
        other
            .iter()
            .filter(|s| !self.satisfies(s))
            .map(str::to_owned)
            .collect()
    }

    /// Order-preserving merge without duplicates.
    pub fn union(&self, other: &ScopeSet) -> ScopeSet {
        let mut merged: Vec<String> = Vec::with_capacity(self.len() + other.len());
        for scope in self.iter().chain(other.iter()) {
            if !merged.iter().any(|s| s == scope) {
                merged.push(scope.to_owned());
            }
        }
        ScopeSet::new(merged)
    }
}

fn scope_grants(held: &str, required: &str) -> bool {
    match held.strip_suffix('*') {
        Some(prefix) => required.starts_with(prefix),
        None => held == required,
    }
}

impl fmt::Debug for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<S: Into<String>> FromIterator<S> for ScopeSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self::new(iter)
    }
}

impl serde::Serialize for ScopeSet {
    fn serialize<Ser: serde::Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        serializer.collect_seq(self.iter())
    }
}
