use std::path::Path;

use crate::error::StampedeError;
use crate::scenario::model::Scenario;

/// Read a scenario file from disk.
///
/// The file format is JSON serialized [`Scenario`].
pub async fn read_scenario(path: impl AsRef<Path>) -> Result<Scenario, StampedeError> {
    let content = tokio::fs::read_to_string(path.as_ref()).await?;
    let scenario: Scenario = serde_json::from_str(&content)?;
    Ok(scenario)
}

/// Write a [`Scenario`] to a JSON file on disk.
///
/// The scenario is serialized as pretty-printed JSON for human readability.
pub async fn write_scenario(
    scenario: &Scenario,
    path: impl AsRef<Path>,
) -> Result<(), StampedeError> {
    let content = serde_json::to_string_pretty(scenario)?;
    tokio::fs::write(path.as_ref(), content).await?;
    Ok(())
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

    fn make_scenario() -> Scenario {
        let mut thresholds = BTreeMap::new();
        thresholds.insert(
            "http_req_duration".to_string(),
            vec!["p(95)<500".to_string()],
        );
        thresholds.insert("http_req_failed".to_string(), vec!["rate<0.01".to_string()]);

        Scenario {
            id: Uuid::new_v4(),
            name: "round-trip".to_string(),
            target_url: "https://example.com/api/hello".to_string(),
            stages: vec![
                Stage { duration_secs: 5, target: 5000 },
                Stage { duration_secs: 10, target: 5000 },
                Stage { duration_secs: 10, target: 9000 },
                Stage { duration_secs: 1, target: 0 },
            ],
            thresholds,
            request_timeout_ms: 30_000,
            think_time_ms: 1_000,
            format_version: 1,
        }
    }

    #[tokio::test]
    async fn round_trip_write_then_read_preserves_scenario() {
        let scenario = make_scenario();
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("scenario.json");

        write_scenario(&scenario, &path)
            .await
            .expect("write_scenario should succeed");
        let loaded = read_scenario(&path).await.expect("read_scenario should succeed");

        assert_eq!(loaded.id, scenario.id);
        assert_eq!(loaded.name, scenario.name);
        assert_eq!(loaded.target_url, scenario.target_url);
        assert_eq!(loaded.stages, scenario.stages);
        assert_eq!(loaded.thresholds, scenario.thresholds);
        assert_eq!(loaded.format_version, scenario.format_version);
    }

    #[tokio::test]
    async fn read_scenario_error_for_nonexistent_file() {
        let result = read_scenario("/nonexistent/path/scenario.json").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn read_scenario_error_for_invalid_json() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("bad.json");
        tokio::fs::write(&path, b"not valid json at all")
            .await
            .expect("writing bad file should succeed");
        let result = read_scenario(&path).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn write_scenario_produces_pretty_json() {
        let scenario = make_scenario();
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("pretty.json");
        write_scenario(&scenario, &path)
            .await
            .expect("write should succeed");
        let content = tokio::fs::read_to_string(&path)
            .await
            .expect("file should be readable");
        assert!(content.contains('\n'));
        assert!(content.contains("stages"));
        assert!(content.contains(&scenario.name));
    }
}
