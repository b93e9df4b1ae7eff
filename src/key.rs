//! Cache keys: a closed set of namespaces, paired with an arbitrary id.

use std::fmt;

/// The fixed set of cache namespaces the catalog service uses.
///
/// Each namespace has its own L2 TTL and, where applicable, L1 TTL policy
/// (see `service::NamespacePolicy`). The set is closed deliberately: the
/// catalog service is the only writer of cache keys, and a closed enum
/// keeps `invalidate_namespace` exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    ProductById,
    Products,
    Categories,
    SearchResults,
    PriceRange,
}

impl Namespace {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProductById => "productById",
            Self::Products => "products",
            Self::Categories => "categories",
            Self::SearchResults => "searchResults",
            Self::PriceRange => "priceRange",
        }
    }

    pub const ALL: [Namespace; 5] = [
        Self::ProductById,
        Self::Products,
        Self::Categories,
        Self::SearchResults,
        Self::PriceRange,
    ];
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `(namespace, id)` pair. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    namespace: Namespace,
    id: String,
}

impl CacheKey {
    pub fn new(namespace: Namespace, id: impl Into<String>) -> Self {
        Self {
            namespace,
            id: id.into(),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The wire form used by the L2 backend: `namespace::id`.
    #[must_use]
    pub fn wire(&self) -> String {
        format!("{}::{}", self.namespace.as_str(), self.id)
    }

    /// The `namespace::` prefix used for bulk namespace scans/deletes.
    #[must_use]
    pub fn namespace_prefix(namespace: Namespace) -> String {
        format!("{}::", namespace.as_str())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wire())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_form_is_namespace_double_colon_id() {
        let key = CacheKey::new(Namespace::ProductById, "42");
        assert_eq!(key.wire(), "productById::42");
    }

    #[test]
    fn namespace_prefix_matches_wire_prefix() {
        let key = CacheKey::new(Namespace::Products, "category:shoes");
        let prefix = CacheKey::namespace_prefix(Namespace::Products);
        assert!(key.wire().starts_with(&prefix));
    }
}
