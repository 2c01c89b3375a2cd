use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, RwLock,
    },
    time::Duration,
};

use toggled::{
    bucket, AssignmentStore, CacheError, Counters, Error, Evaluator, EvaluatorConfig, Reason,
    SharedStore, SharedTier, StoreError, StoredAssignment,
};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Authoritative store shared with the test, so that assignments can be written after the
/// evaluator is built.
#[derive(Clone, Default)]
struct Assignments {
    entries: Arc<RwLock<HashMap<(String, String), StoredAssignment>>>,
    fetches: Arc<AtomicUsize>,
}

impl Assignments {
    fn write(&self, flag_key: &str, env_key: &str, assignment: StoredAssignment) {
        self.entries
            .write()
            .unwrap()
            .insert((flag_key.to_owned(), env_key.to_owned()), assignment);
    }
}

impl AssignmentStore for Assignments {
    fn fetch_assignment(
        &self,
        flag_key: &str,
        env_key: &str,
    ) -> Result<Option<StoredAssignment>, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .entries
            .read()
            .unwrap()
            .get(&(flag_key.to_owned(), env_key.to_owned()))
            .cloned())
    }
}

/// Shared store that ignores expiration and can be switched into returning garbage.
#[derive(Clone, Default)]
struct Garbled {
    data: Arc<Mutex<HashMap<String, String>>>,
    garbage: Arc<AtomicBool>,
}

impl SharedStore for Garbled {
    fn get(&self, key: &str, _timeout: Duration) -> Result<Option<String>, CacheError> {
        if self.garbage.load(Ordering::SeqCst) {
            return Ok(Some("{not json".to_owned()));
        }
        Ok(self.data.lock().unwrap().get(key).cloned())
    }

    fn set(
        &self,
        key: &str,
        value: &str,
        _ttl: Duration,
        _timeout: Duration,
    ) -> Result<(), CacheError> {
        self.data
            .lock()
            .unwrap()
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str, _timeout: Duration) -> Result<(), CacheError> {
        self.data.lock().unwrap().remove(key);
        Ok(())
    }
}

fn new_ui() -> StoredAssignment {
    StoredAssignment {
        is_enabled: false,
        percentage: Some(50),
        rules_json: Some(
            r#"{"match":"all","rules":[{"attribute":"country","operator":"eq","value":"US"}]}"#
                .to_owned(),
        ),
    }
}

fn country(value: &str) -> HashMap<String, String> {
    HashMap::from([("country".to_owned(), value.to_owned())])
}

fn evaluator(assignments: &Assignments) -> Evaluator {
    EvaluatorConfig::from_store(assignments.clone()).to_evaluator()
}

#[test]
fn rules_then_percentage_then_disabled() {
    init();
    let assignments = Assignments::default();
    assignments.write("new-ui", "prod", new_ui());
    let evaluator = evaluator(&assignments);

    let alice = evaluator
        .evaluate("new-ui", "prod", "alice", &country("us"))
        .unwrap();
    assert!(alice.enabled);
    assert_eq!(alice.reason, Reason::MatchedRule);
    assert_eq!(
        alice.matched_rule.as_deref(),
        Some(r#"[{"attribute":"country","operator":"eq","value":"US"}]"#)
    );

    // bucket("new-ui", "dave") == 30
    assert_eq!(bucket("new-ui", "dave"), 30);
    let dave = evaluator
        .evaluate("new-ui", "prod", "dave", &country("CA"))
        .unwrap();
    assert!(dave.enabled);
    assert_eq!(dave.reason, Reason::Percentage(50));
    assert_eq!(dave.matched_rule, None);

    // bucket("new-ui", "carol") == 59
    assert_eq!(bucket("new-ui", "carol"), 59);
    let carol = evaluator
        .evaluate("new-ui", "prod", "carol", &country("CA"))
        .unwrap();
    assert!(!carol.enabled);
    assert_eq!(carol.reason, Reason::Disabled);

    assert_eq!(
        serde_json::to_value(&dave).unwrap(),
        serde_json::json!({"enabled": true, "reason": "percentage_50", "matchedRule": null})
    );
}

#[test]
fn enabled_assignment_ignores_rules_and_percentage() {
    init();
    let assignments = Assignments::default();
    assignments.write(
        "new-ui",
        "prod",
        StoredAssignment {
            is_enabled: true,
            ..new_ui()
        },
    );
    let evaluator = evaluator(&assignments);

    for user in ["alice", "bob", "carol", "dave"] {
        let result = evaluator
            .evaluate("new-ui", "prod", user, &country("CA"))
            .unwrap();
        assert!(result.enabled);
        assert_eq!(result.reason, Reason::Enabled);
    }
}

#[test]
fn any_mode_reports_first_matching_rule() {
    init();
    let assignments = Assignments::default();
    assignments.write(
        "checkout",
        "prod",
        StoredAssignment {
            is_enabled: false,
            percentage: None,
            rules_json: Some(
                r#"{"match":"ANY","rules":[
                    {"attribute":"plan","operator":"in","value":"pro, enterprise"},
                    {"attribute":"email","operator":"endsWith","value":"@example.com"},
                    {"attribute":"age","operator":"gte","value":"18"}
                ]}"#
                .to_owned(),
            ),
        },
    );
    let evaluator = evaluator(&assignments);

    let attributes = HashMap::from([
        ("Email".to_owned(), "Bob@Example.com".to_owned()),
        ("age".to_owned(), "42".to_owned()),
    ]);
    let result = evaluator
        .evaluate("checkout", "prod", "user-1", &attributes)
        .unwrap();
    assert_eq!(result.reason, Reason::MatchedRule);
    assert_eq!(
        result.matched_rule.as_deref(),
        Some(r#"{"attribute":"email","operator":"endsWith","value":"@example.com"}"#)
    );

    let attributes = HashMap::from([("age".to_owned(), "seventeen".to_owned())]);
    let result = evaluator
        .evaluate("checkout", "prod", "user-1", &attributes)
        .unwrap();
    assert_eq!(result.reason, Reason::Disabled);
}

#[test]
fn malformed_rules_behave_like_no_rules() {
    init();
    let assignments = Assignments::default();
    assignments.write(
        "new-ui",
        "prod",
        StoredAssignment {
            is_enabled: false,
            percentage: None,
            rules_json: Some("{\"match\": \"all\", \"rules\": [".to_owned()),
        },
    );
    let evaluator = evaluator(&assignments);

    let result = evaluator
        .evaluate("new-ui", "prod", "alice", &country("US"))
        .unwrap();
    assert!(!result.enabled);
    assert_eq!(result.reason, Reason::Disabled);
}

#[test]
fn write_then_invalidate_is_observed() {
    init();
    let assignments = Assignments::default();
    assignments.write("new-ui", "prod", new_ui());
    let evaluator = evaluator(&assignments);

    assert!(
        !evaluator
            .evaluate("new-ui", "prod", "carol", &country("CA"))
            .unwrap()
            .enabled
    );

    assignments.write(
        "new-ui",
        "prod",
        StoredAssignment {
            percentage: Some(100),
            ..new_ui()
        },
    );
    evaluator.invalidate_cache("new-ui", "prod").unwrap();

    let carol = evaluator
        .evaluate("new-ui", "prod", "carol", &country("CA"))
        .unwrap();
    assert_eq!(carol.reason, Reason::Percentage(100));
}

#[test]
fn garbage_in_shared_tier_falls_through() {
    init();
    let assignments = Assignments::default();
    assignments.write("new-ui", "prod", new_ui());
    let shared = Garbled::default();
    shared.garbage.store(true, Ordering::SeqCst);

    let counters = Counters::new();
    let evaluator = EvaluatorConfig::from_store(assignments.clone())
        .shared_tier(SharedTier::new(shared.clone()).prefix("test:"))
        .metrics(counters.clone())
        .to_evaluator();

    let alice = evaluator
        .evaluate("new-ui", "prod", "alice", &country("US"))
        .unwrap();
    assert_eq!(alice.reason, Reason::MatchedRule);
    assert_eq!(assignments.fetches.load(Ordering::SeqCst), 1);

    // The fetched snapshot was written through to the shared tier.
    let data = shared.data.lock().unwrap();
    assert_eq!(data.len(), 1);
    let (key, blob) = data.iter().next().unwrap();
    assert!(key.starts_with("test:"));
    let stored: StoredAssignment = serde_json::from_str(blob).unwrap();
    assert_eq!(stored, new_ui());

    let metrics = counters.snapshot();
    assert_eq!(metrics.evaluations, 1);
    assert_eq!(metrics.store_fetches, 1);
    assert_eq!(metrics.tiers["shared"], (0, 1));
}

#[test]
fn store_outage_is_an_error() {
    init();
    let store = |_flag_key: &str, _env_key: &str| -> Result<Option<StoredAssignment>, StoreError> {
        Err(StoreError::UnexpectedStatus(503))
    };
    let evaluator = EvaluatorConfig::from_store(store).to_evaluator();

    let err = evaluator
        .evaluate("new-ui", "prod", "alice", &HashMap::new())
        .unwrap_err();
    assert!(matches!(
        err,
        Error::StoreUnavailable(StoreError::UnexpectedStatus(503))
    ));
}

#[test]
fn rollout_converges_to_percentage() {
    init();
    let assignments = Assignments::default();
    assignments.write(
        "rollout-flag",
        "prod",
        StoredAssignment {
            is_enabled: false,
            percentage: Some(25),
            rules_json: None,
        },
    );
    let evaluator = evaluator(&assignments);

    let enabled = (0..10_000)
        .filter(|i| {
            evaluator
                .evaluate("rollout-flag", "prod", &format!("user-{i}"), &HashMap::new())
                .unwrap()
                .enabled
        })
        .count();
    assert_eq!(enabled, 2445);
    assert_eq!(assignments.fetches.load(Ordering::SeqCst), 1);
}

#[test]
fn concurrent_evaluation_and_invalidation() {
    init();
    let assignments = Assignments::default();
    assignments.write("new-ui", "prod", new_ui());
    let evaluator = Arc::new(evaluator(&assignments));

    let readers: Vec<_> = (0..8)
        .map(|thread| {
            let evaluator = evaluator.clone();
            std::thread::spawn(move || {
                for i in 0..500 {
                    let user = format!("user-{thread}-{i}");
                    let result = evaluator
                        .evaluate("new-ui", "prod", &user, &country("CA"))
                        .unwrap();
                    match result.reason {
                        Reason::Percentage(50) | Reason::Percentage(100) => assert!(result.enabled),
                        Reason::Disabled => assert!(!result.enabled),
                        reason => panic!("unexpected reason {reason}"),
                    }
                }
            })
        })
        .collect();

    let writer = {
        let evaluator = evaluator.clone();
        let assignments = assignments.clone();
        std::thread::spawn(move || {
            for i in 0..100 {
                let percentage = if i % 2 == 0 { 100 } else { 50 };
                assignments.write(
                    "new-ui",
                    "prod",
                    StoredAssignment {
                        percentage: Some(percentage),
                        ..new_ui()
                    },
                );
                evaluator.invalidate_cache("new-ui", "prod").unwrap();
            }
        })
    };

    for reader in readers {
        reader.join().unwrap();
    }
    writer.join().unwrap();

    // A reader may have repopulated the cache with a snapshot fetched before the last write.
    evaluator.invalidate_cache("new-ui", "prod").unwrap();
    let result = evaluator
        .evaluate("new-ui", "prod", "dave", &country("CA"))
        .unwrap();
    assert_eq!(result.reason, Reason::Percentage(50));
}
