use std::collections::HashMap;

use toggled::{EvaluatorConfig, FeatureGate, HttpAssignmentStore};

pub fn main() {
    let base_url = std::env::var("FLAGS_BASE_URL").unwrap();
    let api_key = std::env::var("FLAGS_API_KEY").unwrap();

    let store = HttpAssignmentStore::new(&base_url, api_key).unwrap();
    let evaluator = EvaluatorConfig::from_store(store).to_evaluator();

    // Evaluate a flag for a user with attributes.
    let attributes = HashMap::from([("country".to_owned(), "US".to_owned())]);
    match evaluator.evaluate("new-ui", "prod", "alice", &attributes) {
        Ok(result) => println!("new-ui: {} ({})", result.enabled, result.reason),
        // Store unreachable and nothing cached: fail closed.
        Err(err) => println!("new-ui: false ({err})"),
    }

    // Guard an operation behind a flag, for an anonymous user in the default environment.
    let gate = FeatureGate::new("checkout-v2");
    let open = gate.check(&evaluator, None, None).unwrap_or(false);
    println!("checkout-v2 gate open: {open}");
}
