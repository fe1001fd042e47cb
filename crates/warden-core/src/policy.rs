//! Module inventory policy.
//!
//! Evaluation order is fixed: filter out baseline entries, then check
//! the blacklist, then the optional count ceiling. Blacklist findings
//! always win over the ceiling so the more specific rejection message
//! is shown.

use std::collections::HashSet;

use crate::config::WardenConfig;

/// Immutable policy snapshot. Sessions hold an `Arc` to the snapshot
/// current at their start; reloads swap the engine's copy only.
#[derive(Debug, Clone, Default)]
pub struct VerificationPolicy {
    filter: HashSet<String>,
    blacklist: HashSet<String>,
    max_mod_count: Option<usize>,
}

/// Outcome of evaluating a (version-stripped) module inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Nothing objectionable; `shown` is the post-filter inventory.
    Clean { shown: Vec<String> },
    /// At least one blacklisted module, in inventory order.
    Blacklisted(Vec<String>),
    /// Post-filter count over the ceiling.
    TooMany { count: usize, max: usize },
}

impl VerificationPolicy {
    pub fn new(
        filter: impl IntoIterator<Item = String>,
        blacklist: impl IntoIterator<Item = String>,
        max_mod_count: Option<usize>,
    ) -> Self {
        Self {
            filter: filter.into_iter().map(|m| m.to_lowercase()).collect(),
            blacklist: blacklist.into_iter().map(|m| m.to_lowercase()).collect(),
            max_mod_count,
        }
    }

    /// Policy that accepts any inventory. Used when verification runs
    /// in presence-only mode and by tests.
    pub fn permissive() -> Self {
        Self::default()
    }

    /// Snapshot the configured filter and threshold together with the
    /// current blacklist contents.
    pub fn from_config(
        config: &WardenConfig,
        blacklist: impl IntoIterator<Item = String>,
    ) -> Self {
        Self::new(
            config.modlist_filter.iter().cloned(),
            blacklist,
            config.max_mod_count_opt(),
        )
    }

    pub fn is_blacklisted(&self, id: &str) -> bool {
        self.blacklist.contains(&id.to_lowercase())
    }

    /// Drop baseline entries (loader, runtime) that every client has.
    pub fn filtered(&self, ids: &[String]) -> Vec<String> {
        ids.iter()
            .filter(|id| !self.filter.contains(&id.to_lowercase()))
            .cloned()
            .collect()
    }

    pub fn evaluate(&self, ids: &[String]) -> Verdict {
        let shown = self.filtered(ids);
        let flagged: Vec<String> = shown
            .iter()
            .filter(|id| self.is_blacklisted(id))
            .cloned()
            .collect();
        if !flagged.is_empty() {
            return Verdict::Blacklisted(flagged);
        }
        if let Some(max) = self.max_mod_count {
            if shown.len() > max {
                return Verdict::TooMany {
                    count: shown.len(),
                    max,
                };
            }
        }
        Verdict::Clean { shown }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn baseline_entries_are_filtered() {
        let policy = VerificationPolicy::new(
            ids(&["java", "minecraft", "fabricloader"]),
            [],
            None,
        );
        assert_eq!(
            policy.evaluate(&ids(&["java", "minecraft", "sodium"])),
            Verdict::Clean {
                shown: ids(&["sodium"])
            }
        );
    }

    #[test]
    fn blacklist_matching_is_case_insensitive() {
        let policy = VerificationPolicy::new([], ids(&["EvilMod"]), None);
        assert_eq!(
            policy.evaluate(&ids(&["evilmod", "sodium"])),
            Verdict::Blacklisted(ids(&["evilmod"]))
        );
        assert!(policy.is_blacklisted("EVILMOD"));
    }

    #[test]
    fn blacklist_wins_over_count_ceiling() {
        let policy = VerificationPolicy::new([], ids(&["cheats"]), Some(1));
        assert_eq!(
            policy.evaluate(&ids(&["a", "b", "cheats"])),
            Verdict::Blacklisted(ids(&["cheats"]))
        );
    }

    #[test]
    fn count_ceiling_counts_post_filter_inventory() {
        let policy = VerificationPolicy::new(ids(&["java"]), [], Some(2));
        assert_eq!(
            policy.evaluate(&ids(&["java", "a", "b"])),
            Verdict::Clean {
                shown: ids(&["a", "b"])
            }
        );
        assert_eq!(
            policy.evaluate(&ids(&["java", "a", "b", "c"])),
            Verdict::TooMany { count: 3, max: 2 }
        );
    }

    #[test]
    fn permissive_accepts_anything() {
        let policy = VerificationPolicy::permissive();
        assert!(matches!(
            policy.evaluate(&ids(&["anything", "at", "all"])),
            Verdict::Clean { .. }
        ));
    }
}
