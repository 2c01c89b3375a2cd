use std::collections::HashMap;

/// Name of the implicit attribute carrying the user id.
pub const USER_ID_ATTRIBUTE: &str = "userId";

/// Attributes of the user a flag is evaluated for.
///
/// Attribute names are case-insensitive. `userId` is always available as an attribute unless the
/// caller supplies an attribute of that name, in which case the caller's value wins.
///
/// When several supplied names differ only in case, a lookup using one of them exactly gets that
/// attribute. Any other spelling resolves to the greatest of the names in byte order, so the same
/// input always evaluates the same way.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationContext {
    user_id: String,
    // Caller's attributes under their original names.
    exact: HashMap<String, String>,
    // Keyed by lowercased attribute name.
    folded: HashMap<String, String>,
}

impl EvaluationContext {
    pub fn new(user_id: impl Into<String>, attributes: &HashMap<String, String>) -> Self {
        let user_id = user_id.into();

        let mut names: Vec<_> = attributes.iter().collect();
        names.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));

        let mut folded = HashMap::with_capacity(attributes.len() + 1);
        folded.insert(USER_ID_ATTRIBUTE.to_lowercase(), user_id.clone());
        for (name, value) in names {
            folded.insert(name.to_lowercase(), value.clone());
        }

        EvaluationContext {
            user_id,
            exact: attributes.clone(),
            folded,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Look up an attribute by name, ignoring case. Missing attributes read as an empty string.
    pub fn get(&self, attribute: &str) -> &str {
        self.exact
            .get(attribute)
            .or_else(|| self.folded.get(&attribute.to_lowercase()))
            .map(String::as_str)
            .unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::EvaluationContext;

    #[test]
    fn injects_user_id() {
        let context = EvaluationContext::new("alice", &HashMap::new());
        assert_eq!(context.get("userId"), "alice");
        assert_eq!(context.get("USERID"), "alice");
        assert_eq!(context.user_id(), "alice");
    }

    #[test]
    fn caller_supplied_user_id_wins() {
        let context = EvaluationContext::new(
            "alice",
            &HashMap::from([("UserId".to_owned(), "impersonated".to_owned())]),
        );
        assert_eq!(context.get("userId"), "impersonated");
        assert_eq!(context.user_id(), "alice");
    }

    #[test]
    fn attribute_names_ignore_case() {
        let context = EvaluationContext::new(
            "alice",
            &HashMap::from([("Country".to_owned(), "US".to_owned())]),
        );
        assert_eq!(context.get("country"), "US");
        assert_eq!(context.get("COUNTRY"), "US");
    }

    #[test]
    fn missing_attribute_is_empty() {
        let context = EvaluationContext::new("alice", &HashMap::new());
        assert_eq!(context.get("plan"), "");
    }

    #[test]
    fn case_variants_resolve_the_same_way_every_time() {
        for _ in 0..200 {
            let attributes = HashMap::from([
                ("Country".to_owned(), "US".to_owned()),
                ("country".to_owned(), "CA".to_owned()),
            ]);
            let context = EvaluationContext::new("alice", &attributes);

            assert_eq!(context.get("Country"), "US");
            assert_eq!(context.get("country"), "CA");
            // "country" > "Country" in byte order.
            assert_eq!(context.get("COUNTRY"), "CA");
        }
    }
}
