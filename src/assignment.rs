use serde::{Deserialize, Serialize};

use crate::rules::CompiledRuleSet;

/// Per-(flag, environment) assignment as held by the authoritative store.
///
/// This is also the shape cached in string-keyed tiers:
/// `{"isEnabled": bool, "percentage": int | null, "rulesJson": string | null}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAssignment {
    pub is_enabled: bool,
    #[serde(default)]
    pub percentage: Option<i64>,
    #[serde(default)]
    pub rules_json: Option<String>,
}

/// Immutable assignment state used to evaluate a flag.
///
/// Snapshots are never updated in place. A fresh fetch replaces a cached snapshot wholesale.
#[derive(Debug, Clone)]
pub struct AssignmentSnapshot {
    is_enabled: bool,
    /// Always within `[0, 100]`.
    percentage: Option<u8>,
    rules_json: Option<String>,
    /// Parsed once from `rules_json`. `None` if absent or malformed.
    rules: Option<CompiledRuleSet>,
}

impl AssignmentSnapshot {
    /// Snapshot used when the store has no (non-archived) assignment for the flag.
    pub fn absent() -> Self {
        AssignmentSnapshot {
            is_enabled: false,
            percentage: None,
            rules_json: None,
            rules: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.is_enabled
    }

    pub fn percentage(&self) -> Option<u8> {
        self.percentage
    }

    pub fn rules_json(&self) -> Option<&str> {
        self.rules_json.as_deref()
    }

    pub(crate) fn rules(&self) -> Option<&CompiledRuleSet> {
        self.rules.as_ref()
    }

    /// Convert back to the stored/cached shape.
    pub fn to_stored(&self) -> StoredAssignment {
        StoredAssignment {
            is_enabled: self.is_enabled,
            percentage: self.percentage.map(i64::from),
            rules_json: self.rules_json.clone(),
        }
    }
}

impl From<StoredAssignment> for AssignmentSnapshot {
    fn from(stored: StoredAssignment) -> Self {
        let percentage = stored.percentage.map(|p| {
            let clamped = p.clamp(0, 100);
            if clamped != p {
                log::warn!(target: "toggled", percentage = p; "percentage out of range, clamping to {clamped}");
            }
            clamped as u8
        });
        let rules = CompiledRuleSet::parse(stored.rules_json.as_deref());

        AssignmentSnapshot {
            is_enabled: stored.is_enabled,
            percentage,
            rules_json: stored.rules_json,
            rules,
        }
    }
}
