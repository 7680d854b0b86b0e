//! Shared rule set stored in the metrics-adapter ConfigMap
//!
//! The document is cluster-wide and written by every component's
//! reconciliation, so a merge only ever touches the rules sharing the incoming
//! rule's series query. Other rules and any top-level keys this controller does
//! not manage survive a load/store cycle unchanged.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::rule::DiscoveryRule;
use crate::Error;

/// Result of merging one rule into a rule set
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No rule with this series query existed; it was appended
    Appended,
    /// The rule with this series query differed and was replaced in place
    Replaced,
    /// An identical rule was already present
    Unchanged,
}

impl MergeOutcome {
    /// Whether the rule set needs to be written back
    pub fn changed(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Metrics-adapter discovery configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct RuleSet {
    /// Custom metric discovery rules, at most one per series query
    #[serde(default)]
    pub rules: Vec<DiscoveryRule>,
    /// Other top-level sections (resourceRules, externalRules, ...)
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl RuleSet {
    /// Parse the stored document. Blank content is an empty rule set.
    pub fn from_yaml(contents: &str) -> Result<Self, Error> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents).map_err(|e| {
            Error::serialization_for(
                "ConfigMap",
                format!("unable to parse metrics discovery config: {e}"),
            )
        })
    }

    /// Serialize to the stored document form
    pub fn to_yaml(&self) -> Result<String, Error> {
        serde_yaml::to_string(self).map_err(|e| {
            Error::serialization_for(
                "ConfigMap",
                format!("unable to serialize metrics discovery config: {e}"),
            )
        })
    }

    /// Find the rule with the given series query
    pub fn get(&self, series_query: &str) -> Option<&DiscoveryRule> {
        self.rules.iter().find(|r| r.series_query == series_query)
    }

    /// Upsert a rule keyed by its series query.
    ///
    /// Rules with a different series query are never touched. Extra rules
    /// sharing the incoming series query (left by hand edits) are dropped, so
    /// the set holds at most one rule per series query afterwards.
    pub fn merge(&mut self, rule: DiscoveryRule) -> MergeOutcome {
        let matching: Vec<usize> = self
            .rules
            .iter()
            .enumerate()
            .filter(|(_, r)| r.series_query == rule.series_query)
            .map(|(i, _)| i)
            .collect();

        let Some(&first) = matching.first() else {
            self.rules.push(rule);
            return MergeOutcome::Appended;
        };
        if matching.len() == 1 && self.rules[first] == rule {
            return MergeOutcome::Unchanged;
        }

        for &duplicate in matching[1..].iter().rev() {
            self.rules.remove(duplicate);
        }
        self.rules[first] = rule;
        MergeOutcome::Replaced
    }

    /// Functional form of [`RuleSet::merge`]: returns the merged set and
    /// whether it differs from `self`.
    pub fn merged(mut self, rule: DiscoveryRule) -> (Self, bool) {
        let changed = self.merge(rule).changed();
        (self, changed)
    }
}
