//! Attribute propagation policy
//!
//! Attributes without the internal marker always travel. Marker-prefixed
//! attributes travel according to the whitelist or blacklist, and a
//! protect-list keeps target-local values of matching attributes alive
//! across re-broadcasts. Every list matches by unanchored substring.

use crate::models::AttributeMap;
use std::collections::BTreeSet;

/// Prefix of attributes considered internal
pub const INTERNAL_MARKER: char = '_';

/// Attribute naming the record's cover asset
pub const THUMBNAIL_ATTRIBUTE: &str = "_thumbnail_id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributePolicy {
    /// Internal attributes travel unless blacklisted
    pub broadcast_internal: bool,
    pub whitelist: Vec<String>,
    pub blacklist: Vec<String>,
    pub protectlist: Vec<String>,
}

impl Default for AttributePolicy {
    fn default() -> Self {
        Self {
            broadcast_internal: true,
            whitelist: ["_wp_page_template", "_wplp_", "_aioseop_"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            blacklist: Vec::new(),
            protectlist: Vec::new(),
        }
    }
}

fn matches_any(name: &str, tokens: &[String]) -> bool {
    tokens.iter().any(|token| !token.is_empty() && name.contains(token.as_str()))
}

impl AttributePolicy {
    /// Whether a source attribute may be written to a copy
    pub fn allows(&self, name: &str) -> bool {
        if !name.starts_with(INTERNAL_MARKER) {
            return true;
        }
        if self.broadcast_internal {
            !matches_any(name, &self.blacklist)
        } else {
            matches_any(name, &self.whitelist)
        }
    }

    pub fn protects(&self, name: &str) -> bool {
        matches_any(name, &self.protectlist)
    }
}

/// What to do with a copy's attributes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributePlan {
    /// Existing target attributes to remove before writing
    pub to_delete: Vec<String>,
    /// Source attributes to add, every value in order
    pub to_write: AttributeMap,
    /// Target attributes left untouched
    pub to_protect: Vec<String>,
}

/// Decide how a copy's attributes change
pub fn filter(existing: &AttributeMap, source: &AttributeMap, policy: &AttributePolicy) -> AttributePlan {
    let allowed: AttributeMap = source
        .iter()
        .filter(|(name, _)| policy.allows(name))
        .map(|(name, values)| (name.clone(), values.clone()))
        .collect();

    // A protected attribute must exist on the target and still have a
    // counterpart in the source.
    let protected: BTreeSet<&String> = existing
        .keys()
        .filter(|name| policy.protects(name) && allowed.contains_key(*name))
        .collect();

    AttributePlan {
        to_delete: existing
            .keys()
            .filter(|name| !protected.contains(name))
            .cloned()
            .collect(),
        to_write: allowed
            .iter()
            .filter(|(name, _)| !protected.contains(name))
            .map(|(name, values)| (name.clone(), values.clone()))
            .collect(),
        to_protect: protected.into_iter().cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn attrs(pairs: &[(&str, &str)]) -> AttributeMap {
        let mut map = AttributeMap::new();
        for (name, value) in pairs {
            map.entry(name.to_string())
                .or_insert_with(Vec::new)
                .push(value.to_string());
        }
        map
    }

    fn whitelist_only(tokens: &[&str]) -> AttributePolicy {
        AttributePolicy {
            broadcast_internal: false,
            whitelist: tokens.iter().map(|s| s.to_string()).collect(),
            blacklist: Vec::new(),
            protectlist: Vec::new(),
        }
    }

    #[test]
    fn test_whitelist_substring_match() {
        let policy = whitelist_only(&["_cfg_"]);
        let source = attrs(&[
            ("_cfg_theme", "dark"),
            ("_cfg_hidden_secret", "x"),
            ("_other_internal", "y"),
            ("color", "blue"),
        ]);

        let plan = filter(&AttributeMap::new(), &source, &policy);
        let written: Vec<&str> = plan.to_write.keys().map(String::as_str).collect();
        assert_eq!(written, vec!["_cfg_hidden_secret", "_cfg_theme", "color"]);
    }

    #[test]
    fn test_blacklist_when_internal_allowed() {
        let policy = AttributePolicy {
            broadcast_internal: true,
            whitelist: Vec::new(),
            blacklist: vec!["_edit_".to_string()],
            protectlist: Vec::new(),
        };

        assert!(policy.allows("_wp_page_template"));
        assert!(!policy.allows("_edit_lock"));
        assert!(policy.allows("plain"));
    }

    #[test]
    fn test_empty_tokens_never_match() {
        let policy = whitelist_only(&[""]);
        assert!(!policy.allows("_anything"));
    }

    #[test]
    fn test_protected_requires_both_sides() {
        let policy = AttributePolicy {
            protectlist: vec!["_price".to_string()],
            ..AttributePolicy::default()
        };

        let existing = attrs(&[("_price", "12"), ("_price_old", "9"), ("stale", "1")]);
        let source = attrs(&[("_price", "10"), ("fresh", "2")]);

        let plan = filter(&existing, &source, &policy);
        assert_eq!(plan.to_protect, vec!["_price".to_string()]);
        assert_eq!(plan.to_delete, vec!["_price_old".to_string(), "stale".to_string()]);
        assert_eq!(plan.to_write, attrs(&[("fresh", "2")]));
    }

    #[test]
    fn test_protect_without_target_value_writes_source() {
        let policy = AttributePolicy {
            protectlist: vec!["_price".to_string()],
            ..AttributePolicy::default()
        };

        let plan = filter(&AttributeMap::new(), &attrs(&[("_price", "10")]), &policy);
        assert!(plan.to_protect.is_empty());
        assert_eq!(plan.to_write, attrs(&[("_price", "10")]));
    }
}
