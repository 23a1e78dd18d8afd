use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StampedeError;

// ---------------------------------------------------------------------------
// Sample
// ---------------------------------------------------------------------------

/// The recorded outcome of a single HTTP probe.
///
/// Immutable once produced. Transport-level failures (connect error, DNS
/// failure, timeout) are carried in `error` with `status` 0 — a failed
/// request is data, never a control-flow error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    /// HTTP status code; 0 when the request never produced a response.
    pub status: u16,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Sample {
    /// A request counts as failed when it errored at the transport level or
    /// returned a non-2xx status.
    pub fn is_failure(&self) -> bool {
        self.error.is_some() || !(200..300).contains(&self.status)
    }
}

// ---------------------------------------------------------------------------
// Client construction
// ---------------------------------------------------------------------------

/// Build the shared `reqwest::Client` used by every virtual user.
///
/// The per-request timeout is baked into the client so no probe can hang
/// indefinitely; connections are pooled across virtual users.
pub fn build_client(request_timeout: Duration) -> Result<reqwest::Client, StampedeError> {
    let client = reqwest::Client::builder()
        .timeout(request_timeout)
        .pool_max_idle_per_host(100)
        .pool_idle_timeout(Duration::from_secs(90))
        .user_agent(format!("stampede/{}", env!("CARGO_PKG_VERSION")))
        .gzip(true)
        .build()?;
    Ok(client)
}

// ---------------------------------------------------------------------------
// Probe
// ---------------------------------------------------------------------------

/// Issue a single GET probe against `url` and record the outcome.
///
/// The duration covers the full exchange including reading the response body.
pub async fn probe(client: &reqwest::Client, url: &str) -> Sample {
    let timestamp = Utc::now();
    let start = Instant::now();

    match send(client, url).await {
        Ok(status) => Sample {
            timestamp,
            status,
            elapsed_ms: start.elapsed().as_millis() as u64,
            error: None,
        },
        Err(message) => Sample {
            timestamp,
            status: 0,
            elapsed_ms: start.elapsed().as_millis() as u64,
            error: Some(message),
        },
    }
}

async fn send(client: &reqwest::Client, url: &str) -> Result<u16, String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| format!("Network error: {e}"))?;

    let status = response.status().as_u16();

    // Drain the body so elapsed time reflects the complete response.
    response
        .bytes()
        .await
        .map_err(|e| format!("Error reading response body: {e}"))?;

    Ok(status)
}
