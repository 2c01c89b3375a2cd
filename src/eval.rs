use std::fmt;

use serde::{Serialize, Serializer};

use crate::{assignment::AssignmentSnapshot, bucketer::Bucketer, context::EvaluationContext};

/// Outcome of evaluating a flag for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub enabled: bool,
    pub reason: Reason,
    /// Serialized rule (`any` mode) or rule list (`all` mode) that enabled the flag.
    pub matched_rule: Option<String>,
}

/// Why a flag evaluated the way it did.
///
/// Serializes to `"enabled"`, `"disabled"`, `"matched_rule"` or `"percentage_<N>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    Enabled,
    Disabled,
    MatchedRule,
    /// User fell within the rollout percentage `N`.
    Percentage(u8),
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::Enabled => f.write_str("enabled"),
            Reason::Disabled => f.write_str("disabled"),
            Reason::MatchedRule => f.write_str("matched_rule"),
            Reason::Percentage(percentage) => write!(f, "percentage_{percentage}"),
        }
    }
}

impl Serialize for Reason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl EvaluationResult {
    fn disabled() -> Self {
        EvaluationResult {
            enabled: false,
            reason: Reason::Disabled,
            matched_rule: None,
        }
    }
}

impl AssignmentSnapshot {
    /// Decide whether `flag_key` is enabled for the user in `context`.
    ///
    /// Precedence: enabled assignment, then rule match, then percentage rollout.
    pub(crate) fn eval(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
        bucketer: &(impl Bucketer + ?Sized),
    ) -> EvaluationResult {
        if self.is_enabled() {
            return EvaluationResult {
                enabled: true,
                reason: Reason::Enabled,
                matched_rule: None,
            };
        }

        if let Some(matched_rule) = self.rules().and_then(|rules| rules.evaluate(context)) {
            return EvaluationResult {
                enabled: true,
                reason: Reason::MatchedRule,
                matched_rule: Some(matched_rule.to_owned()),
            };
        }

        let Some(percentage) = self.percentage() else {
            return EvaluationResult::disabled();
        };

        if bucketer.bucket(flag_key, context.user_id()) < percentage {
            EvaluationResult {
                enabled: true,
                reason: Reason::Percentage(percentage),
                matched_rule: None,
            }
        } else {
            EvaluationResult::disabled()
        }
    }
}
