use std::collections::HashMap;

use crate::{Evaluator, Result};

/// Guards an operation behind a single flag.
///
/// Callers that don't know the environment or the user fall back to [`FeatureGate::DEFAULT_ENV`]
/// and [`FeatureGate::ANONYMOUS_USER`].
///
/// # Examples
/// ```
/// # use toggled::{Evaluator, FeatureGate};
/// # fn handle(evaluator: &Evaluator, env: Option<&str>, user: Option<&str>) -> toggled::Result<()> {
/// let gate = FeatureGate::new("checkout-v2");
/// if !gate.check(evaluator, env, user)? {
///     return Ok(());
/// }
/// // new checkout
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FeatureGate {
    flag_key: String,
    default_env: String,
    anonymous_user: String,
}

impl FeatureGate {
    /// Environment used when the caller doesn't provide one.
    pub const DEFAULT_ENV: &'static str = "prod";

    /// User id used when the caller doesn't provide one.
    pub const ANONYMOUS_USER: &'static str = "anonymous";

    pub fn new(flag_key: impl Into<String>) -> Self {
        FeatureGate {
            flag_key: flag_key.into(),
            default_env: Self::DEFAULT_ENV.to_owned(),
            anonymous_user: Self::ANONYMOUS_USER.to_owned(),
        }
    }

    pub fn default_env(mut self, env_key: impl Into<String>) -> Self {
        self.default_env = env_key.into();
        self
    }

    pub fn anonymous_user(mut self, user_id: impl Into<String>) -> Self {
        self.anonymous_user = user_id.into();
        self
    }

    pub fn flag_key(&self) -> &str {
        &self.flag_key
    }

    /// Returns whether the guarded operation may proceed.
    ///
    /// Blank `env` or `user` are replaced by the defaults. Errors from the evaluator are returned
    /// as is so that the caller decides between failing open and failing closed.
    pub fn check(
        &self,
        evaluator: &Evaluator,
        env: Option<&str>,
        user: Option<&str>,
    ) -> Result<bool> {
        let env = non_blank(env).unwrap_or(self.default_env.as_str());
        let user = non_blank(user).unwrap_or(self.anonymous_user.as_str());

        let result = evaluator.evaluate(&self.flag_key, env, user, &HashMap::new())?;
        if !result.enabled {
            log::debug!(target: "toggled",
                        flag_key:display = self.flag_key,
                        env_key = env,
                        user_id = user;
                        "feature gate closed");
        }
        Ok(result.enabled)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use crate::{error::StoreError, Error, EvaluatorConfig, StoredAssignment};

    use super::FeatureGate;

    fn enabled_for(
        env_key: &'static str,
        user_id: &'static str,
    ) -> impl Fn(&str, &str) -> Result<Option<StoredAssignment>, StoreError> {
        move |_flag_key: &str, env: &str| -> Result<Option<StoredAssignment>, StoreError> {
            Ok((env == env_key).then(|| StoredAssignment {
                is_enabled: false,
                percentage: None,
                rules_json: Some(format!(
                    r#"{{"match":"all","rules":[{{"attribute":"userId","operator":"eq","value":"{user_id}"}}]}}"#
                )),
            }))
        }
    }

    #[test]
    fn defaults_to_prod_and_anonymous() {
        let evaluator = EvaluatorConfig::from_store(enabled_for("prod", "anonymous")).to_evaluator();
        let gate = FeatureGate::new("checkout-v2");

        assert!(gate.check(&evaluator, None, None).unwrap());
        assert!(gate.check(&evaluator, Some(" "), Some("")).unwrap());
        assert!(!gate.check(&evaluator, Some("dev"), None).unwrap());
        assert!(!gate.check(&evaluator, None, Some("alice")).unwrap());
    }

    #[test]
    fn custom_defaults() {
        let evaluator = EvaluatorConfig::from_store(enabled_for("staging", "guest")).to_evaluator();
        let gate = FeatureGate::new("checkout-v2")
            .default_env("staging")
            .anonymous_user("guest");

        assert_eq!(gate.flag_key(), "checkout-v2");
        assert!(gate.check(&evaluator, None, None).unwrap());
        assert!(gate.check(&evaluator, Some("staging"), Some("guest")).unwrap());
    }

    #[test]
    fn propagates_store_failure() {
        let requested = Arc::new(Mutex::new(Vec::new()));
        let seen = requested.clone();
        let store = move |flag_key: &str,
                          env_key: &str|
              -> Result<Option<StoredAssignment>, StoreError> {
            seen.lock().unwrap().push(format!("{flag_key}/{env_key}"));
            Err(StoreError::Unavailable("connection refused".to_owned()))
        };
        let evaluator = EvaluatorConfig::from_store(store).to_evaluator();

        assert!(matches!(
            FeatureGate::new("checkout-v2").check(&evaluator, None, Some("alice")),
            Err(Error::StoreUnavailable(_))
        ));
        assert_eq!(*requested.lock().unwrap(), vec!["checkout-v2/prod"]);
    }
}
