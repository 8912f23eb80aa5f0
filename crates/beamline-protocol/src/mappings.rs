//! Per-version protocol mapping tables.
//!
//! Every supported server version names its protocol internals
//! differently: the synced-data field that holds an entity's flags, the
//! numeric type code of a squid, the registry name of an end crystal.
//! These identifiers are opaque to us — we never interpret them, we
//! only stamp them into packets so the client accepts them.
//!
//! The table is plain data, not code. Version-specific exceptions (the
//! 1.16 squid id split, the 1.19 registry-name churn) are explicit
//! per-field overrides applied while the record is built in
//! [`ProtocolMappings::for_version`]. No new versions appear at
//! runtime, so there is nothing to gain from polymorphic dispatch here.
//!
//! Deployments running a server build we've never seen can supply a
//! corrected table as JSON ([`ProtocolMappings::from_json`]) instead of
//! waiting for a code change.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// ServerVersion
// ---------------------------------------------------------------------------

/// A detected server version, `1.major.minor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
}

impl ServerVersion {
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "1.{}.{}", self.major, self.minor)
    }
}

impl FromStr for ServerVersion {
    type Err = String;

    /// Parses `"1.X"`, `"1.X.Y"`, or `"1.X.Y-..."` (suffix ignored).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let base = s.split('-').next().unwrap_or(s);
        let mut parts = base.split('.');
        let one = parts.next().ok_or_else(|| format!("empty version: {s:?}"))?;
        if one != "1" {
            return Err(format!("unsupported version family: {s:?}"));
        }
        let major = parts
            .next()
            .ok_or_else(|| format!("missing major version: {s:?}"))?
            .parse::<u32>()
            .map_err(|e| format!("bad major version in {s:?}: {e}"))?;
        let minor = match parts.next() {
            Some(m) => m
                .parse::<u32>()
                .map_err(|e| format!("bad minor version in {s:?}: {e}"))?,
            None => 0,
        };
        Ok(Self { major, minor })
    }
}

// ---------------------------------------------------------------------------
// ProtocolMappings
// ---------------------------------------------------------------------------

/// The opaque identifiers needed to construct protocol objects for one
/// server version. Immutable once resolved; never consulted again after
/// adapter startup except to stamp packets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolMappings {
    /// The major version this record was built for.
    pub major: u32,

    // Synced-data field identifiers ("watcher" fields).
    /// Entity shared flags (carries the invisibility bit).
    pub watcher_flags: String,
    /// Guardian: spikes retracted/extended.
    pub watcher_spikes: String,
    /// Guardian: attack target entity id.
    pub watcher_target_entity: String,
    /// Crystal: beam target block position.
    pub watcher_target_location: String,
    /// Crystal: show/hide the base plate.
    pub watcher_base_plate: String,

    // Legacy numeric entity type codes (spawn packets before 1.17).
    pub squid_type_id: i32,
    pub guardian_type_id: i32,

    // Modern registry field names (entity construction from 1.17 on).
    pub guardian_type_name: Option<String>,
    pub squid_type_name: Option<String>,
    pub crystal_type_name: String,

    // Team (scoreboard) identifiers, modern family only.
    pub team_collision_rule: Option<String>,
    pub team_member_list: Option<String>,
}

/// Oldest major version with a known mapping.
pub const OLDEST_KNOWN_MAJOR: u32 = 9;
/// Newest major version with a known mapping.
pub const NEWEST_KNOWN_MAJOR: u32 = 20;

impl ProtocolMappings {
    /// Builds the mapping record for `1.major.minor`, or `None` when the
    /// major version has no known table.
    ///
    /// Minor-version exceptions are resolved here, once, so the rest of
    /// the subsystem sees a flat record with no version logic left in it.
    pub fn for_version(major: u32, minor: u32) -> Option<Self> {
        let m = |s: &str| s.to_string();
        let base = |flags: &str,
                    spikes: &str,
                    target: &str,
                    location: &str,
                    plate: &str,
                    squid: i32,
                    guardian: i32| {
            ProtocolMappings {
                major,
                watcher_flags: m(flags),
                watcher_spikes: m(spikes),
                watcher_target_entity: m(target),
                watcher_target_location: m(location),
                watcher_base_plate: m(plate),
                squid_type_id: squid,
                guardian_type_id: guardian,
                guardian_type_name: None,
                squid_type_name: Some(m("SQUID")),
                crystal_type_name: m("END_CRYSTAL"),
                team_collision_rule: None,
                team_member_list: None,
            }
        };

        let mapping = match major {
            // 1.9 through 1.12 share one table.
            9..=12 => base("Z", "bA", "bB", "b", "c", 94, 68),
            13 => base("ac", "bF", "bG", "b", "c", 70, 28),
            14 => base("W", "b", "bD", "c", "d", 73, 30),
            15 => base("T", "b", "bA", "c", "d", 74, 31),
            16 => ProtocolMappings {
                watcher_flags: if minor < 2 { m("T") } else { m("S") },
                squid_type_id: if minor < 2 { 74 } else { 81 },
                ..base("", "b", "d", "c", "d", 0, 31)
            },
            17 => ProtocolMappings {
                guardian_type_name: Some(m("K")),
                squid_type_name: Some(m("aJ")),
                crystal_type_name: m("u"),
                team_collision_rule: Some(m("setCollisionRule")),
                team_member_list: Some(m("getPlayerNameSet")),
                ..base("Z", "b", "e", "c", "d", 86, 35)
            },
            18 => ProtocolMappings {
                watcher_flags: if minor < 2 { m("aa") } else { m("Z") },
                guardian_type_name: Some(m("K")),
                squid_type_name: Some(m("aJ")),
                crystal_type_name: m("u"),
                team_collision_rule: Some(m("a")),
                team_member_list: Some(m("g")),
                ..base("", "b", "e", "c", "d", 86, 35)
            },
            19 => ProtocolMappings {
                watcher_flags: if minor < 4 { m("Z") } else { m("an") },
                guardian_type_id: if minor < 3 { 38 } else { 39 },
                guardian_type_name: Some(match minor {
                    0..=2 => m("N"),
                    3 => m("O"),
                    _ => m("V"),
                }),
                squid_type_name: Some(match minor {
                    0..=2 => m("aM"),
                    3 => m("aN"),
                    _ => m("aT"),
                }),
                crystal_type_name: m("w"),
                team_collision_rule: Some(m("a")),
                team_member_list: Some(m("g")),
                ..base("", "b", "e", "c", "d", 89, 38)
            },
            20 => ProtocolMappings {
                watcher_flags: if minor < 2 { m("an") } else { m("ao") },
                guardian_type_name: Some(if minor < 3 { m("V") } else { m("W") }),
                squid_type_name: Some(if minor < 3 { m("aT") } else { m("aU") }),
                crystal_type_name: m("B"),
                team_collision_rule: Some(m("a")),
                team_member_list: Some(m("g")),
                ..base("", "b", "e", "c", "d", 89, 38)
            },
            _ => return None,
        };
        Some(mapping)
    }

    /// Resolves the mapping for a detected server version.
    ///
    /// Total and deterministic: an exact major match when we have one,
    /// otherwise the closest older known major, otherwise the newest
    /// known table. Inexact resolution logs a degraded-compatibility
    /// warning — beams may still work, but nobody promised it.
    pub fn resolve(version: ServerVersion) -> Resolved {
        if let Some(mappings) = Self::for_version(version.major, version.minor) {
            return Resolved {
                mappings,
                exact: true,
            };
        }

        // Known majors are contiguous, so "closest older match" and
        // "newest known" coincide for future versions; for versions
        // older than anything in the table the newest is the
        // least-wrong guess.
        let fallback_major = NEWEST_KNOWN_MAJOR;
        let mappings = Self::for_version(fallback_major, version.minor)
            .expect("fallback major is always in the known table");
        tracing::warn!(
            %version,
            fallback = fallback_major,
            "no exact protocol mapping for this server version — \
             using closest known table, compatibility is degraded"
        );
        Resolved {
            mappings,
            exact: false,
        }
    }

    /// Parses an externally supplied mapping table (JSON).
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Result of [`ProtocolMappings::resolve`].
#[derive(Debug, Clone)]
pub struct Resolved {
    pub mappings: ProtocolMappings,
    /// `false` when the table is a fallback for an unknown version.
    pub exact: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version_with_and_without_minor() {
        assert_eq!("1.20.4".parse(), Ok(ServerVersion::new(20, 4)));
        assert_eq!("1.17".parse(), Ok(ServerVersion::new(17, 0)));
        assert_eq!("1.19.2-R0.1".parse(), Ok(ServerVersion::new(19, 2)));
        assert!("2.0.0".parse::<ServerVersion>().is_err());
    }

    #[test]
    fn test_shared_table_for_nine_through_twelve() {
        let a = ProtocolMappings::for_version(9, 0).unwrap();
        let b = ProtocolMappings::for_version(12, 2).unwrap();
        assert_eq!(a.watcher_flags, b.watcher_flags);
        assert_eq!(a.squid_type_id, 94);
        assert_eq!(b.guardian_type_id, 68);
    }

    #[test]
    fn test_sixteen_minor_override_splits_squid_id() {
        let early = ProtocolMappings::for_version(16, 1).unwrap();
        let late = ProtocolMappings::for_version(16, 4).unwrap();
        assert_eq!(early.squid_type_id, 74);
        assert_eq!(early.watcher_flags, "T");
        assert_eq!(late.squid_type_id, 81);
        assert_eq!(late.watcher_flags, "S");
    }

    #[test]
    fn test_nineteen_registry_name_churn() {
        let m0 = ProtocolMappings::for_version(19, 0).unwrap();
        let m3 = ProtocolMappings::for_version(19, 3).unwrap();
        let m4 = ProtocolMappings::for_version(19, 4).unwrap();
        assert_eq!(m0.squid_type_name.as_deref(), Some("aM"));
        assert_eq!(m3.squid_type_name.as_deref(), Some("aN"));
        assert_eq!(m4.squid_type_name.as_deref(), Some("aT"));
        assert_eq!(m0.guardian_type_id, 38);
        assert_eq!(m3.guardian_type_id, 39);
    }

    #[test]
    fn test_resolve_exact_match() {
        let r = ProtocolMappings::resolve(ServerVersion::new(17, 1));
        assert!(r.exact);
        assert_eq!(r.mappings.major, 17);
    }

    #[test]
    fn test_resolve_future_version_falls_back_to_newest() {
        let r = ProtocolMappings::resolve(ServerVersion::new(23, 0));
        assert!(!r.exact);
        assert_eq!(r.mappings.major, NEWEST_KNOWN_MAJOR);
    }

    #[test]
    fn test_resolve_prehistoric_version_still_returns_a_table() {
        let r = ProtocolMappings::resolve(ServerVersion::new(8, 8));
        assert!(!r.exact);
    }

    #[test]
    fn test_json_round_trip() {
        let m = ProtocolMappings::for_version(20, 4).unwrap();
        let json = serde_json::to_string(&m).unwrap();
        let back = ProtocolMappings::from_json(&json).unwrap();
        assert_eq!(m, back);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(ProtocolMappings::from_json("{\"major\": true}").is_err());
    }
}
