use std::fmt;

/// One component of a [`QueryKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPart {
    Str(String),
    Int(i64),
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Str(s) => f.write_str(s),
            KeyPart::Int(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for KeyPart {
    fn from(s: &str) -> Self {
        KeyPart::Str(s.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(s: String) -> Self {
        KeyPart::Str(s)
    }
}

impl From<i64> for KeyPart {
    fn from(n: i64) -> Self {
        KeyPart::Int(n)
    }
}

/// Ordered tuple identifying a cached query, e.g. `[foos]` or `[foos, 3]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(Vec<KeyPart>);

impl QueryKey {
    pub fn new(first: impl Into<KeyPart>) -> Self {
        QueryKey(vec![first.into()])
    }

    pub fn with(mut self, part: impl Into<KeyPart>) -> Self {
        self.0.push(part.into());
        self
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", part)?;
        }
        f.write_str("]")
    }
}

/// Selects cache entries for invalidation or removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFilter {
    pub key: QueryKey,
    /// Match only `key` itself rather than every key it prefixes.
    pub exact: bool,
}

impl QueryFilter {
    pub fn exact(key: QueryKey) -> Self {
        Self { key, exact: true }
    }

    pub fn prefix(key: QueryKey) -> Self {
        Self { key, exact: false }
    }

    pub fn matches(&self, key: &QueryKey) -> bool {
        if self.exact {
            *key == self.key
        } else {
            key.starts_with(&self.key)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_lists_parts_in_order() {
        assert_eq!(QueryKey::new("foos").with(3_i64).to_string(), "[foos, 3]");
    }

    #[test]
    fn exact_filter_skips_item_keys() {
        let filter = QueryFilter::exact(QueryKey::new("foos"));
        assert!(filter.matches(&QueryKey::new("foos")));
        assert!(!filter.matches(&QueryKey::new("foos").with(1_i64)));
    }

    #[test]
    fn prefix_filter_covers_item_keys_only_of_same_resource() {
        let filter = QueryFilter::prefix(QueryKey::new("foos"));
        assert!(filter.matches(&QueryKey::new("foos").with(1_i64)));
        assert!(!filter.matches(&QueryKey::new("bars").with(1_i64)));
        assert!(!filter.matches(&QueryKey::new("foosball")));
    }
}
