use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// One anchor of the load profile: ramp to `target` virtual users over
/// `duration_secs` seconds, starting from the previous stage's target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Stage {
    pub duration_secs: u64,
    pub target: u32,
}

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

/// A complete load-test scenario.
///
/// Constructed once at startup (from a JSON file plus explicit overrides)
/// and treated as immutable for the rest of the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Scenario {
    pub id: Uuid,
    pub name: String,
    /// Target URL for the GET probe issued by every virtual user.
    pub target_url: String,
    /// Ordered ramp anchors; the profile starts at 0 virtual users.
    pub stages: Vec<Stage>,
    /// Metric name → threshold expressions, e.g.
    /// `"http_req_duration": ["p(95)<500"]`, `"http_req_failed": ["rate<0.01"]`.
    #[serde(default)]
    pub thresholds: BTreeMap<String, Vec<String>>,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Pause between consecutive requests of one virtual user, in milliseconds.
    #[serde(default = "default_think_time_ms")]
    pub think_time_ms: u64,
    #[serde(default = "default_format_version")]
    pub format_version: u32,
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_think_time_ms() -> u64 {
    1_000
}

fn default_format_version() -> u32 {
    1
}

impl Scenario {
    /// Total configured duration of the ramp profile in seconds.
    pub fn total_duration_secs(&self) -> u64 {
        self.stages.iter().map(|s| s.duration_secs).sum()
    }

    /// Apply explicit overrides for the target URL and test name.
    ///
    /// Callers resolve environment variables (`TARGET_URL`, `TEST_NAME`)
    /// themselves and pass the values in; the scenario never reads ambient
    /// process state on its own.
    pub fn apply_overrides(&mut self, target_url: Option<&str>, name: Option<&str>) {
        if let Some(url) = target_url {
            self.target_url = url.to_string();
        }
        if let Some(name) = name {
            self.name = name.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_scenario() -> Scenario {
        Scenario {
            id: Uuid::new_v4(),
            name: "default".to_string(),
            target_url: "http://localhost:8080/api/hello".to_string(),
            stages: vec![
                Stage { duration_secs: 5, target: 10 },
                Stage { duration_secs: 10, target: 10 },
                Stage { duration_secs: 1, target: 0 },
            ],
            thresholds: BTreeMap::new(),
            request_timeout_ms: 30_000,
            think_time_ms: 1_000,
            format_version: 1,
        }
    }

    #[test]
    fn total_duration_sums_all_stages() {
        let scenario = make_scenario();
        assert_eq!(scenario.total_duration_secs(), 16);
    }

    #[test]
    fn total_duration_empty_stages_is_zero() {
        let mut scenario = make_scenario();
        scenario.stages.clear();
        assert_eq!(scenario.total_duration_secs(), 0);
    }

    #[test]
    fn apply_overrides_replaces_url_and_name() {
        let mut scenario = make_scenario();
        scenario.apply_overrides(Some("http://api.example.com/hello"), Some("go-api"));
        assert_eq!(scenario.target_url, "http://api.example.com/hello");
        assert_eq!(scenario.name, "go-api");
    }

    #[test]
    fn apply_overrides_none_keeps_defaults() {
        let mut scenario = make_scenario();
        scenario.apply_overrides(None, None);
        assert_eq!(scenario.target_url, "http://localhost:8080/api/hello");
        assert_eq!(scenario.name, "default");
    }

    #[test]
    fn deserialize_fills_defaults() {
        let json = r#"{
            "id": "7f3c9d52-0000-4000-8000-000000000000",
            "name": "minimal",
            "target_url": "http://localhost:8080/",
            "stages": [{"duration_secs": 5, "target": 100}]
        }"#;
        let scenario: Scenario = serde_json::from_str(json).expect("should parse");
        assert_eq!(scenario.request_timeout_ms, 30_000);
        assert_eq!(scenario.think_time_ms, 1_000);
        assert_eq!(scenario.format_version, 1);
        assert!(scenario.thresholds.is_empty());
    }

    #[test]
    fn serialize_deserialize_roundtrip() {
        let mut scenario = make_scenario();
        scenario
            .thresholds
            .insert("http_req_duration".to_string(), vec!["p(95)<500".to_string()]);
        let json = serde_json::to_string(&scenario).expect("serialize should succeed");
        let parsed: Scenario = serde_json::from_str(&json).expect("deserialize should succeed");
        assert_eq!(parsed.id, scenario.id);
        assert_eq!(parsed.stages, scenario.stages);
        assert_eq!(parsed.thresholds, scenario.thresholds);
    }
}
