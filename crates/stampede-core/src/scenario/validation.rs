use crate::error::StampedeError;
use crate::scenario::model::Scenario;
use crate::thresholds;

/// Validate a [`Scenario`] and return a list of validation errors.
///
/// An empty `Vec` means the scenario is valid. Validation runs before any
/// traffic is generated; a scenario with errors must never reach the engine.
pub fn validate_scenario(scenario: &Scenario) -> Vec<StampedeError> {
    let mut errors = Vec::new();

    if scenario.name.trim().is_empty() {
        errors.push(StampedeError::Config(
            "Scenario name must not be empty".to_string(),
        ));
    }

    let url = scenario.target_url.trim();
    if url.is_empty() {
        errors.push(StampedeError::Config(
            "Target URL must not be empty".to_string(),
        ));
    } else if !url.starts_with("http://") && !url.starts_with("https://") {
        errors.push(StampedeError::Config(format!(
            "Target URL must start with http:// or https:// (got: {url})"
        )));
    }

    if scenario.stages.is_empty() {
        errors.push(StampedeError::Config(
            "Scenario must define at least one stage".to_string(),
        ));
    }
    if scenario.total_duration_secs() == 0 && !scenario.stages.is_empty() {
        errors.push(StampedeError::Config(
            "Stage durations sum to zero; the test would end immediately".to_string(),
        ));
    }

    if scenario.request_timeout_ms == 0 {
        errors.push(StampedeError::Config(
            "Request timeout must be greater than zero".to_string(),
        ));
    }

    for (metric, expressions) in &scenario.thresholds {
        for expr in expressions {
            if let Err(e) = thresholds::parse_threshold(metric, expr) {
                errors.push(e);
            }
        }
    }

    errors
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::model::Stage;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn make_valid_scenario() -> Scenario {
        let mut thresholds = BTreeMap::new();
        thresholds.insert(
            "http_req_duration".to_string(),
            vec!["p(95)<500".to_string()],
        );
        Scenario {
            id: Uuid::new_v4(),
            name: "valid".to_string(),
            target_url: "https://example.com/api".to_string(),
            stages: vec![Stage { duration_secs: 5, target: 10 }],
            thresholds,
            request_timeout_ms: 30_000,
            think_time_ms: 1_000,
            format_version: 1,
        }
    }

    #[test]
    fn valid_scenario_produces_no_errors() {
        let errors = validate_scenario(&make_valid_scenario());
        assert!(errors.is_empty(), "Expected no errors, got: {:?}", errors);
    }

    #[test]
    fn empty_name_produces_error() {
        let mut scenario = make_valid_scenario();
        scenario.name = "  ".to_string();
        let errors = validate_scenario(&scenario);
        assert!(errors
            .iter()
            .any(|e| e.to_string().contains("name must not be empty")));
    }

    #[test]
    fn empty_url_produces_error() {
        let mut scenario = make_valid_scenario();
        scenario.target_url = String::new();
        let errors = validate_scenario(&scenario);
        assert!(errors
            .iter()
            .any(|e| e.to_string().contains("URL must not be empty")));
    }

    #[test]
    fn non_http_url_produces_error() {
        let mut scenario = make_valid_scenario();
        scenario.target_url = "ftp://example.com".to_string();
        let errors = validate_scenario(&scenario);
        assert!(errors
            .iter()
            .any(|e| e.to_string().contains("http:// or https://")));
    }

    #[test]
    fn empty_stages_produces_error() {
        let mut scenario = make_valid_scenario();
        scenario.stages.clear();
        let errors = validate_scenario(&scenario);
        assert!(errors
            .iter()
            .any(|e| e.to_string().contains("at least one stage")));
    }

    #[test]
    fn all_zero_duration_stages_produce_error() {
        let mut scenario = make_valid_scenario();
        scenario.stages = vec![Stage { duration_secs: 0, target: 10 }];
        let errors = validate_scenario(&scenario);
        assert!(errors.iter().any(|e| e.to_string().contains("sum to zero")));
    }

    #[test]
    fn zero_timeout_produces_error() {
        let mut scenario = make_valid_scenario();
        scenario.request_timeout_ms = 0;
        let errors = validate_scenario(&scenario);
        assert!(errors
            .iter()
            .any(|e| e.to_string().contains("timeout must be greater than zero")));
    }

    #[test]
    fn invalid_threshold_expression_produces_error() {
        let mut scenario = make_valid_scenario();
        scenario
            .thresholds
            .insert("http_req_failed".to_string(), vec!["rate!0.01".to_string()]);
        let errors = validate_scenario(&scenario);
        assert!(errors.iter().any(|e| e.to_string().contains("comparator")));
    }

    #[test]
    fn multiple_problems_are_all_reported() {
        let mut scenario = make_valid_scenario();
        scenario.name = String::new();
        scenario.target_url = "nonsense".to_string();
        scenario.stages.clear();
        let errors = validate_scenario(&scenario);
        assert!(errors.len() >= 3);
    }
}
