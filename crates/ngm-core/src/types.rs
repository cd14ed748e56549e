//! Domain types shared across ngm crates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a profiling target.
///
/// Names a scrape endpoint independently of its URL parameters: the same
/// `(kind, component, address)` triple always refers to the same series of
/// stored profiles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProfileTarget {
    /// Profile kind, e.g. `profile`, `heap`, `goroutine`, `mutex`.
    pub kind: String,
    /// Component type, e.g. `tidb`, `pd`.
    pub component: String,
    /// Logical address of the component instance.
    pub address: String,
}

impl ProfileTarget {
    pub fn new(
        kind: impl Into<String>,
        component: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            component: component.into(),
            address: address.into(),
        }
    }
}

impl fmt::Display for ProfileTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.component, self.address, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn display_orders_component_address_kind() {
        let t = ProfileTarget::new("heap", "tidb", "10.0.1.8:10080");
        assert_eq!(t.to_string(), "tidb/10.0.1.8:10080/heap");
    }

    #[test]
    fn identity_is_the_whole_triple() {
        let mut set = HashSet::new();
        set.insert(ProfileTarget::new("heap", "tidb", "a:1"));
        set.insert(ProfileTarget::new("heap", "tidb", "a:1"));
        set.insert(ProfileTarget::new("profile", "tidb", "a:1"));
        set.insert(ProfileTarget::new("heap", "pd", "a:1"));
        assert_eq!(set.len(), 3);
    }
}
