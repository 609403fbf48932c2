//! Connection descriptors and aggregator member resolution.
//!
//! An aggregator is a virtual connection standing for the union of the
//! concrete connections that share its plugin identity. Its child list
//! mixes literal names and glob patterns; resolution is deterministic
//! because candidates are considered in sorted name order.

use std::collections::BTreeMap;

use tracing::trace;
use wildmatch::WildMatch;

/// Connection descriptors keyed by name. A `BTreeMap` so iteration (and
/// therefore wildcard matching) is in sorted name order.
pub type ConnectionMap = BTreeMap<String, Connection>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub name: String,
    /// Plugin identity; an aggregator only ever resolves members with a
    /// matching plugin.
    pub plugin: String,
    pub kind: ConnectionKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionKind {
    Standard,
    Aggregator {
        /// Literal child names and glob patterns, as configured.
        children: Vec<String>,
        /// Resolved member names, populated by
        /// [`populate_aggregator_members`]. Sorted.
        resolved: Vec<String>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionValidation {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl Connection {
    pub fn standard(name: impl Into<String>, plugin: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            plugin: plugin.into(),
            kind: ConnectionKind::Standard,
        }
    }

    pub fn aggregator(
        name: impl Into<String>,
        plugin: impl Into<String>,
        children: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            plugin: plugin.into(),
            kind: ConnectionKind::Aggregator {
                children,
                resolved: Vec::new(),
            },
        }
    }

    pub fn is_aggregator(&self) -> bool {
        matches!(self.kind, ConnectionKind::Aggregator { .. })
    }

    pub fn resolved_member_names(&self) -> &[String] {
        match &self.kind {
            ConnectionKind::Aggregator { resolved, .. } => resolved,
            ConnectionKind::Standard => &[],
        }
    }

    /// Check aggregator consistency against the full map: a childless
    /// aggregator is a warning, a literal child with a mismatched plugin
    /// is an error.
    pub fn validate(&self, map: &ConnectionMap) -> ConnectionValidation {
        let mut validation = ConnectionValidation::default();
        let ConnectionKind::Aggregator { children, resolved } = &self.kind else {
            return validation;
        };

        if resolved.is_empty() {
            validation
                .warnings
                .push(format!("aggregator connection '{}' has no members", self.name));
        }
        for child in children {
            if let Some(connection) = map.get(child)
                && connection.plugin != self.plugin
            {
                validation.errors.push(format!(
                    "aggregator connection '{}' uses plugin {} but child connection '{}' uses plugin '{}'",
                    self.name, self.plugin, child, connection.plugin,
                ));
            }
        }
        validation
    }
}

/// Resolve the member set of every aggregator in `map`.
///
/// Each child entry is matched literally first; entries that name no
/// existing connection are treated as glob patterns matched against all
/// non-aggregator connections sharing the aggregator's plugin, in sorted
/// name order. An aggregator never matches itself or another aggregator.
pub fn populate_aggregator_members(map: &mut ConnectionMap) {
    let aggregator_names: Vec<String> = map
        .values()
        .filter(|connection| connection.is_aggregator())
        .map(|connection| connection.name.clone())
        .collect();

    for name in aggregator_names {
        let Some(connection) = map.get(&name) else {
            continue;
        };
        let plugin = connection.plugin.clone();
        let ConnectionKind::Aggregator { children, .. } = &connection.kind else {
            continue;
        };
        let children = children.clone();

        let mut members: Vec<String> = Vec::new();
        for pattern in &children {
            if let Some(candidate) = map.get(pattern) {
                // a literal name wins outright; aggregators and
                // plugin-mismatched connections are rejected, not globbed
                if !candidate.is_aggregator()
                    && candidate.plugin == plugin
                    && !members.contains(pattern)
                {
                    members.push(pattern.clone());
                }
                continue;
            }

            let matcher = WildMatch::new(pattern);
            for (candidate_name, candidate) in map.iter() {
                if candidate.is_aggregator() || members.contains(candidate_name) {
                    continue;
                }
                if matcher.matches(candidate_name) && candidate.plugin == plugin {
                    trace!("connection '{candidate_name}' matches pattern '{pattern}'");
                    members.push(candidate_name.clone());
                }
            }
        }
        members.sort();

        if let Some(ConnectionKind::Aggregator { resolved, .. }) =
            map.get_mut(&name).map(|connection| &mut connection.kind)
        {
            *resolved = members;
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn map_of(connections: Vec<Connection>) -> ConnectionMap {
        connections
            .into_iter()
            .map(|connection| (connection.name.clone(), connection))
            .collect()
    }

    #[test]
    fn wildcard_and_literal_children_resolve_by_plugin() {
        let mut map = map_of(vec![
            Connection::aggregator("all_p", "P", vec!["b*".to_string(), "c".to_string()]),
            Connection::standard("b1", "P"),
            Connection::standard("b2", "Q"),
            Connection::standard("c", "P"),
        ]);
        populate_aggregator_members(&mut map);
        assert_eq!(map["all_p"].resolved_member_names(), ["b1", "c"]);
    }

    #[test]
    fn aggregators_never_match_themselves_or_each_other() {
        let mut map = map_of(vec![
            Connection::aggregator("agg_a", "P", vec!["agg*".to_string(), "*".to_string()]),
            Connection::aggregator("agg_b", "P", vec!["*".to_string()]),
            Connection::standard("plain", "P"),
        ]);
        populate_aggregator_members(&mut map);
        assert_eq!(map["agg_a"].resolved_member_names(), ["plain"]);
        assert_eq!(map["agg_b"].resolved_member_names(), ["plain"]);
    }

    #[test]
    fn overlapping_patterns_do_not_duplicate_members() {
        let mut map = map_of(vec![
            Connection::aggregator(
                "agg",
                "P",
                vec!["b1".to_string(), "b*".to_string(), "*1".to_string()],
            ),
            Connection::standard("b1", "P"),
            Connection::standard("b2", "P"),
            Connection::standard("c1", "P"),
        ]);
        populate_aggregator_members(&mut map);
        assert_eq!(map["agg"].resolved_member_names(), ["b1", "b2", "c1"]);
    }

    #[test]
    fn literal_child_with_mismatched_plugin_is_a_validation_error() {
        let mut map = map_of(vec![
            Connection::aggregator("agg", "P", vec!["other".to_string()]),
            Connection::standard("other", "Q"),
        ]);
        populate_aggregator_members(&mut map);
        assert!(map["agg"].resolved_member_names().is_empty());

        let validation = map["agg"].validate(&map);
        assert_eq!(validation.errors.len(), 1);
        assert!(validation.errors[0].contains("plugin"));
        // no members resolved at all, so the childless warning fires too
        assert_eq!(validation.warnings.len(), 1);
    }

    #[test]
    fn standard_connections_validate_clean() {
        let map = map_of(vec![Connection::standard("plain", "P")]);
        assert_eq!(map["plain"].validate(&map), ConnectionValidation::default());
    }
}
