//! Query keys addressing cached product lists.
//!
//! A [`QueryKey`] is the canonical form of the dashboard filters. Each
//! distinct key owns an independent cache entry; entries are never merged.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::product::ProductRecord;

/// Selector value meaning "no filter" for status and warehouse.
pub const ALL_SENTINEL: &str = "all";

/// Canonical (search, status, warehouse) tuple.
///
/// `None` is the wildcard form for status and warehouse. Search text is
/// kept verbatim; an empty search matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryKey {
    search: String,
    status: Option<String>,
    warehouse: Option<String>,
}

impl QueryKey {
    /// Map raw filter inputs to a key.
    ///
    /// Empty or `"all"` (any case) selectors normalize to the wildcard.
    pub fn derive(search: &str, status: &str, warehouse: &str) -> Self {
        Self {
            search: search.to_string(),
            status: normalize_selector(status),
            warehouse: normalize_selector(warehouse),
        }
    }

    /// The unfiltered key.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn warehouse(&self) -> Option<&str> {
        self.warehouse.as_deref()
    }

    /// Whether a record belongs in the list this key addresses.
    ///
    /// Search is a case-insensitive substring match on name, sku or id.
    pub fn matches(&self, record: &ProductRecord) -> bool {
        if let Some(status) = &self.status {
            if !record.status.as_str().eq_ignore_ascii_case(status) {
                return false;
            }
        }
        if let Some(warehouse) = &self.warehouse {
            if record.warehouse != *warehouse {
                return false;
            }
        }
        if self.search.is_empty() {
            return true;
        }
        let needle = self.search.to_lowercase();
        record.name.to_lowercase().contains(&needle)
            || record.sku.to_lowercase().contains(&needle)
            || record.id.as_str().to_lowercase().contains(&needle)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "products[search={:?}, status={}, warehouse={}]",
            self.search,
            self.status.as_deref().unwrap_or("*"),
            self.warehouse.as_deref().unwrap_or("*"),
        )
    }
}

fn normalize_selector(value: &str) -> Option<String> {
    if value.is_empty() || value.eq_ignore_ascii_case(ALL_SENTINEL) {
        None
    } else {
        Some(value.to_string())
    }
}

/// Raw filter state as held by the view layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductFilters {
    pub search: String,
    pub status: String,
    pub warehouse: String,
}

impl ProductFilters {
    /// The state produced by "clear filters".
    pub fn cleared() -> Self {
        Self {
            search: String::new(),
            status: ALL_SENTINEL.to_string(),
            warehouse: String::new(),
        }
    }

    pub fn query_key(&self) -> QueryKey {
        QueryKey::derive(&self.search, &self.status, &self.warehouse)
    }
}

impl Default for ProductFilters {
    fn default() -> Self {
        Self::cleared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sentinels_normalize_to_wildcard() {
        assert_eq!(QueryKey::derive("", "all", ""), QueryKey::all());
        assert_eq!(QueryKey::derive("", "ALL", "All"), QueryKey::all());
        assert_eq!(ProductFilters::cleared().query_key(), QueryKey::all());
    }

    #[test]
    fn test_search_is_verbatim() {
        let key = QueryKey::derive("  bolt ", "", "");
        assert_eq!(key.search(), "  bolt ");
        assert_ne!(key, QueryKey::derive("bolt", "", ""));
    }

    #[test]
    fn test_concrete_selectors_are_kept() {
        let key = QueryKey::derive("", "Critical", "WH2");
        assert_eq!(key.status(), Some("Critical"));
        assert_eq!(key.warehouse(), Some("WH2"));
    }

    #[test]
    fn test_matches() {
        let record = ProductRecord::new("p1", "Hex Bolt", "HEX-8", "WH1", 3, 10);
        assert!(QueryKey::all().matches(&record));
        assert!(QueryKey::derive("bolt", "", "").matches(&record));
        assert!(QueryKey::derive("hex-8", "critical", "WH1").matches(&record));
        assert!(!QueryKey::derive("", "Healthy", "").matches(&record));
        assert!(!QueryKey::derive("", "", "WH2").matches(&record));
        assert!(!QueryKey::derive("washer", "", "").matches(&record));
    }

    proptest! {
        #[test]
        fn derivation_is_deterministic(
            search in ".{0,12}",
            status in "[a-zA-Z]{0,8}",
            warehouse in "(WH[0-9]{1,2})?",
        ) {
            let a = QueryKey::derive(&search, &status, &warehouse);
            let b = QueryKey::derive(&search, &status, &warehouse);
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(a.search(), search.as_str());
            prop_assert_eq!(a.warehouse().is_none(), warehouse.is_empty());
        }
    }
}
