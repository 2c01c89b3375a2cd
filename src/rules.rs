use std::collections::HashMap;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Deserializer, Serialize};

use crate::context::EvaluationContext;

/// Rule set as stored alongside an assignment.
///
/// ```json
/// {"match": "any", "rules": [{"attribute": "country", "operator": "eq", "value": "US"}]}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(
        rename = "match",
        alias = "matchMode",
        alias = "Match",
        alias = "MatchMode",
        default
    )]
    pub match_mode: MatchMode,
    #[serde(alias = "Rules", default)]
    pub rules: Vec<Rule>,
}

/// How rule results are combined. Anything other than `any` (ignoring case) reads as `all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MatchMode {
    #[default]
    All,
    Any,
}

impl From<String> for MatchMode {
    fn from(value: String) -> Self {
        if value.eq_ignore_ascii_case("any") {
            MatchMode::Any
        } else {
            MatchMode::All
        }
    }
}

impl From<MatchMode> for String {
    fn from(value: MatchMode) -> Self {
        match value {
            MatchMode::All => "all".to_owned(),
            MatchMode::Any => "any".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(alias = "Attribute", default, deserialize_with = "null_as_empty")]
    pub attribute: String,
    #[serde(alias = "Operator", default)]
    pub operator: Operator,
    #[serde(alias = "Value", default, deserialize_with = "null_as_empty")]
    pub value: String,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Comparison applied between an attribute and a rule value.
///
/// Tokens are matched exactly. An unrecognized token is kept as [`Operator::Unknown`] and never
/// matches.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operator {
    #[default]
    Eq,
    Ne,
    Contains,
    StartsWith,
    EndsWith,
    In,
    Gt,
    Gte,
    Lt,
    Lte,
    Regex,
    Unknown(String),
}

impl Operator {
    pub fn as_str(&self) -> &str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Contains => "contains",
            Operator::StartsWith => "startsWith",
            Operator::EndsWith => "endsWith",
            Operator::In => "in",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Regex => "regex",
            Operator::Unknown(token) => token,
        }
    }

    /// Prepare the operator for repeated evaluation against `value`.
    fn compile(&self, value: &str) -> Predicate {
        let lowered = || value.to_lowercase();
        match self {
            Operator::Eq => Predicate::Equals(lowered()),
            Operator::Ne => Predicate::NotEquals(lowered()),
            Operator::Contains => Predicate::Contains(lowered()),
            Operator::StartsWith => Predicate::StartsWith(lowered()),
            Operator::EndsWith => Predicate::EndsWith(lowered()),
            Operator::In => Predicate::OneOf(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|entry| !entry.is_empty())
                    .map(str::to_lowercase)
                    .collect(),
            ),
            Operator::Gt => Predicate::Compare(Comparison::Gt, parse_number(value)),
            Operator::Gte => Predicate::Compare(Comparison::Gte, parse_number(value)),
            Operator::Lt => Predicate::Compare(Comparison::Lt, parse_number(value)),
            Operator::Lte => Predicate::Compare(Comparison::Lte, parse_number(value)),
            Operator::Regex => Predicate::Matches(
                RegexBuilder::new(value)
                    .case_insensitive(true)
                    .build()
                    .inspect_err(|err| {
                        log::debug!(target: "toggled", pattern = value; "invalid rule regex: {err}");
                    })
                    .ok(),
            ),
            Operator::Unknown(_) => Predicate::Never,
        }
    }
}

impl From<String> for Operator {
    fn from(value: String) -> Self {
        match value.as_str() {
            "eq" => Operator::Eq,
            "ne" => Operator::Ne,
            "contains" => Operator::Contains,
            "startsWith" => Operator::StartsWith,
            "endsWith" => Operator::EndsWith,
            "in" => Operator::In,
            "gt" => Operator::Gt,
            "gte" => Operator::Gte,
            "lt" => Operator::Lt,
            "lte" => Operator::Lte,
            "regex" => Operator::Regex,
            _ => Operator::Unknown(value),
        }
    }
}

impl From<Operator> for String {
    fn from(value: Operator) -> Self {
        match value {
            Operator::Unknown(token) => token,
            known => known.as_str().to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Comparison {
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Operator bound to its (pre-processed) rule value.
///
/// String targets are stored lowercased.
#[derive(Debug, Clone)]
enum Predicate {
    Equals(String),
    NotEquals(String),
    Contains(String),
    StartsWith(String),
    EndsWith(String),
    OneOf(Vec<String>),
    /// `None` when the rule value is not a number.
    Compare(Comparison, Option<f64>),
    /// `None` when the pattern failed to compile.
    Matches(Option<Regex>),
    Never,
}

impl Predicate {
    fn eval(&self, actual: &str) -> bool {
        match self {
            Predicate::Equals(target) => actual.to_lowercase() == *target,
            Predicate::NotEquals(target) => actual.to_lowercase() != *target,
            Predicate::Contains(target) => actual.to_lowercase().contains(target.as_str()),
            Predicate::StartsWith(target) => actual.to_lowercase().starts_with(target.as_str()),
            Predicate::EndsWith(target) => actual.to_lowercase().ends_with(target.as_str()),
            Predicate::OneOf(entries) => {
                let actual = actual.to_lowercase();
                entries.iter().any(|entry| *entry == actual)
            }
            Predicate::Compare(comparison, target) => {
                let (Some(actual), Some(target)) = (parse_number(actual), *target) else {
                    return false;
                };
                match comparison {
                    Comparison::Gt => actual > target,
                    Comparison::Gte => actual >= target,
                    Comparison::Lt => actual < target,
                    Comparison::Lte => actual <= target,
                }
            }
            Predicate::Matches(regex) => regex.as_ref().is_some_and(|regex| regex.is_match(actual)),
            Predicate::Never => false,
        }
    }
}

/// Parse an invariant-format decimal number. Surrounding whitespace is allowed; infinities and NaN
/// are not numbers here.
fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// A rule set prepared for evaluation: operators are resolved, regexes compiled and matched-rule
/// payloads serialized once.
#[derive(Debug, Clone)]
pub(crate) struct CompiledRuleSet {
    match_mode: MatchMode,
    rules: Vec<CompiledRule>,
    /// Payload reported when every rule matches in `all` mode.
    all_serialized: String,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    attribute: String,
    predicate: Predicate,
    /// Payload reported when this rule is the first match in `any` mode.
    serialized: String,
}

impl CompiledRuleSet {
    /// Parse serialized rule set JSON. Blank or malformed input yields `None`, exactly as if no
    /// rule set were present.
    pub(crate) fn parse(rules_json: Option<&str>) -> Option<CompiledRuleSet> {
        let json = rules_json.filter(|json| !json.trim().is_empty())?;

        let rule_set: RuleSet = serde_json::from_str(json)
            .inspect_err(|err| {
                log::warn!(target: "toggled", rules_json = json; "ignoring malformed rule set: {err}");
            })
            .ok()?;

        CompiledRuleSet::compile(&rule_set)
    }

    pub(crate) fn compile(rule_set: &RuleSet) -> Option<CompiledRuleSet> {
        let rules = rule_set
            .rules
            .iter()
            .map(|rule| {
                Some(CompiledRule {
                    attribute: rule.attribute.clone(),
                    predicate: rule.operator.compile(&rule.value),
                    serialized: serde_json::to_string(rule).ok()?,
                })
            })
            .collect::<Option<Vec<_>>>()?;

        Some(CompiledRuleSet {
            match_mode: rule_set.match_mode,
            rules,
            all_serialized: serde_json::to_string(&rule_set.rules).ok()?,
        })
    }

    /// Evaluate against `context`, returning the serialized matched rule(s) on a match.
    ///
    /// An empty rule list never matches.
    pub(crate) fn evaluate(&self, context: &EvaluationContext) -> Option<&str> {
        if self.rules.is_empty() {
            return None;
        }

        let eval = |rule: &CompiledRule| rule.predicate.eval(context.get(&rule.attribute));

        match self.match_mode {
            MatchMode::All => self
                .rules
                .iter()
                .all(eval)
                .then_some(self.all_serialized.as_str()),
            MatchMode::Any => self
                .rules
                .iter()
                .find(|rule| eval(*rule))
                .map(|rule| rule.serialized.as_str()),
        }
    }
}

/// Match serialized rule set JSON against a user's attributes.
///
/// Returns the serialized matched payload when the rule set matches: the single matching rule in
/// `any` mode, or the full rule list in `all` mode. Missing or malformed rule sets never match.
pub fn match_rules(
    rules_json: Option<&str>,
    user_id: &str,
    attributes: &HashMap<String, String>,
) -> Option<String> {
    let rule_set = CompiledRuleSet::parse(rules_json)?;
    let context = EvaluationContext::new(user_id, attributes);
    rule_set.evaluate(&context).map(str::to_owned)
}
