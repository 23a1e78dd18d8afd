use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StampedeError;
use crate::metrics::{MetricsSnapshot, TimeBucketEntry};
use crate::scenario::model::Stage;
use crate::thresholds::ThresholdReport;

// ---------------------------------------------------------------------------
// TestRun — complete data for a finished run
// ---------------------------------------------------------------------------

/// Complete results of a finished test run, suitable for export.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TestRun {
    pub run_id: Uuid,
    pub scenario_name: String,
    pub target_url: String,
    pub stages: Vec<Stage>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub metrics: MetricsSnapshot,
    /// Per-second time-series data.
    pub time_series: Vec<TimeBucketEntry>,
    pub thresholds: ThresholdReport,
    /// Overall verdict; mirrors `thresholds.passed` for quick access.
    pub passed: bool,
}

// ---------------------------------------------------------------------------
// ReportFormat
// ---------------------------------------------------------------------------

/// Output target for [`render`]. Selected by explicit configuration,
/// never guessed from context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    Json,
    Html,
    Text,
}

impl ReportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ReportFormat::Json => "json",
            ReportFormat::Html => "html",
            ReportFormat::Text => "txt",
        }
    }
}

impl std::str::FromStr for ReportFormat {
    type Err = StampedeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(ReportFormat::Json),
            "html" => Ok(ReportFormat::Html),
            "text" => Ok(ReportFormat::Text),
            other => Err(StampedeError::Config(format!(
                "Unknown report format '{other}' (expected json, html, or text)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// File naming
// ---------------------------------------------------------------------------

/// File name for a summary artifact: `summary-{name}.{ext}`.
///
/// The test name is embedded so artifacts from different runs do not
/// collide; characters unsafe in file names are replaced with `-`.
pub fn summary_file_name(test_name: &str, format: ReportFormat) -> String {
    let safe: String = test_name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect();
    format!("summary-{}.{}", safe, format.extension())
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Render a finished run in the requested format.
///
/// Pure function of its input — no IO, no scheduling side effects.
pub fn render(run: &TestRun, format: ReportFormat) -> Result<String, StampedeError> {
    match format {
        ReportFormat::Json => Ok(render_json(run)?),
        ReportFormat::Html => Ok(render_html(run)),
        ReportFormat::Text => Ok(render_text(run)),
    }
}

/// Render a run as pretty-printed JSON.
pub fn render_json(run: &TestRun) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(run)
}

/// Render a human-readable console summary.
pub fn render_text(run: &TestRun) -> String {
    let m = &run.metrics;
    let duration_secs = (run.finished_at - run.started_at).num_milliseconds().max(0) as f64 / 1000.0;
    let failure_pct = m.failure_rate * 100.0;

    let mut out = String::new();
    out.push_str(&format!("stampede test run — {}\n", run.scenario_name));
    out.push_str(&format!("Run ID: {}\n", run.run_id.hyphenated()));
    out.push_str(&format!("URL: {}\n", run.target_url));
    out.push_str(&format!(
        "Started:  {}\n",
        run.started_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    ));
    out.push_str(&format!(
        "Finished: {}\n",
        run.finished_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    ));
    out.push_str(&format!("Duration: {duration_secs:.3}s\n"));
    out.push('\n');
    out.push_str(&format!("Total requests: {}\n", m.total_requests));
    out.push_str(&format!(
        "Failed: {} ({:.2}%)\n",
        m.total_failures, failure_pct
    ));
    out.push_str(&format!("Throughput: {:.2} req/s\n", m.requests_per_second));
    out.push_str(&format!("Mean response: {:.2}ms\n", m.mean_ms));
    out.push_str(&format!(
        "P50: {}ms  P95: {}ms  P99: {}ms\n",
        m.p50_ms, m.p95_ms, m.p99_ms
    ));
    out.push_str(&format!("Min: {}ms  Max: {}ms\n", m.min_ms, m.max_ms));
    out.push('\n');

    out.push_str("Thresholds:\n");
    if run.thresholds.outcomes.is_empty() {
        out.push_str("  (none configured)\n");
    }
    for outcome in &run.thresholds.outcomes {
        let mark = if outcome.passed { "PASS" } else { "FAIL" };
        out.push_str(&format!("  [{mark}] {}\n", outcome.message));
    }
    out.push('\n');
    out.push_str(&format!(
        "Verdict: {}\n",
        if run.passed { "PASS" } else { "FAIL" }
    ));
    out
}

/// Render a run as a standalone HTML report with inline CSS.
///
/// No external assets — the returned string can be saved as a `.html` file
/// and opened directly in a browser.
pub fn render_html(run: &TestRun) -> String {
    let m = &run.metrics;
    let failure_pct = m.failure_rate * 100.0;
    let duration_secs = (run.finished_at - run.started_at).num_milliseconds().max(0) as f64 / 1000.0;
    let started = run.started_at.to_rfc3339_opts(SecondsFormat::Millis, true);
    let finished = run.finished_at.to_rfc3339_opts(SecondsFormat::Millis, true);

    let verdict_class = if run.passed { "good" } else { "bad" };
    let verdict_text = if run.passed { "PASS" } else { "FAIL" };

    let threshold_rows: String = run
        .thresholds
        .outcomes
        .iter()
        .map(|o| {
            let row_class = if o.passed { "ok" } else { "err" };
            let mark = if o.passed { "pass" } else { "fail" };
            format!(
                "<tr class=\"{}\"><td>{}</td><td>{}</td><td>{:.4}</td><td>{}</td></tr>",
                row_class,
                html_escape(&o.metric),
                html_escape(&o.expression),
                o.observed,
                mark,
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let ts_rows: String = run
        .time_series
        .iter()
        .map(|entry| {
            let err_rate = if entry.requests > 0 {
                entry.failures as f64 / entry.requests as f64 * 100.0
            } else {
                0.0
            };
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{:.2}%</td>\
                 <td>{:.2}</td><td>{}</td><td>{}</td></tr>",
                entry.second,
                entry.requests,
                entry.failures,
                err_rate,
                entry.avg_ms,
                entry.min_ms,
                entry.max_ms,
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>stampede Report — {name}</title>
<style>
  *, *::before, *::after {{ box-sizing: border-box; }}
  body {{
    font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
    margin: 0; padding: 2rem;
    background: #0f172a; color: #e2e8f0;
    line-height: 1.5;
  }}
  h1 {{ font-size: 1.75rem; font-weight: 700; color: #f1f5f9; margin: 0 0 0.25rem; }}
  h2 {{ font-size: 1.125rem; font-weight: 600; color: #94a3b8;
        text-transform: uppercase; letter-spacing: 0.05em;
        margin: 2rem 0 0.75rem; border-bottom: 1px solid #1e293b; padding-bottom: 0.5rem; }}
  .meta {{ color: #64748b; font-size: 0.875rem; margin-bottom: 2rem; }}
  .meta span {{ margin-right: 1.5rem; }}
  .stats-grid {{
    display: grid;
    grid-template-columns: repeat(auto-fill, minmax(180px, 1fr));
    gap: 1rem; margin-bottom: 2rem;
  }}
  .stat-card {{
    background: #1e293b; border: 1px solid #334155;
    border-radius: 0.5rem; padding: 1rem 1.25rem;
  }}
  .stat-card .label {{
    font-size: 0.75rem; text-transform: uppercase; letter-spacing: 0.05em;
    color: #64748b; margin-bottom: 0.25rem;
  }}
  .stat-card .value {{
    font-size: 1.5rem; font-weight: 700; color: #f1f5f9;
  }}
  .stat-card .unit {{ font-size: 0.875rem; color: #94a3b8; margin-left: 0.2rem; }}
  .stat-card.good .value {{ color: #34d399; }}
  .stat-card.bad  .value {{ color: #f87171; }}
  table {{
    width: 100%; border-collapse: collapse; font-size: 0.8125rem;
    background: #1e293b; border-radius: 0.5rem; overflow: hidden;
    margin-bottom: 2rem;
  }}
  thead {{ background: #0f172a; }}
  th {{
    padding: 0.625rem 0.875rem; text-align: left;
    font-weight: 600; color: #94a3b8;
    text-transform: uppercase; letter-spacing: 0.04em;
    font-size: 0.75rem;
  }}
  td {{ padding: 0.5rem 0.875rem; border-top: 1px solid #334155; color: #cbd5e1; }}
  tr.ok td {{ border-left: 3px solid #34d399; }}
  tr.err td {{ border-left: 3px solid #f87171; color: #fca5a5; }}
  .run-id {{ font-family: monospace; font-size: 0.8rem; color: #475569; }}
</style>
</head>
<body>
<h1>{name}</h1>
<div class="meta">
  <span>URL: {url}</span>
  <span>Started: {started}</span>
  <span>Finished: {finished}</span>
  <span>Duration: {duration:.3}s</span>
  <span class="run-id">Run ID: {run_id}</span>
</div>

<div class="stats-grid">
  <div class="stat-card {verdict_class}"><div class="label">Verdict</div>
    <div class="value">{verdict}</div></div>
  <div class="stat-card"><div class="label">Total Requests</div>
    <div class="value">{total}</div></div>
  <div class="stat-card"><div class="label">Failed</div>
    <div class="value">{failed}<span class="unit">({failure_pct:.2}%)</span></div></div>
  <div class="stat-card"><div class="label">Throughput</div>
    <div class="value">{rps:.1}<span class="unit">req/s</span></div></div>
  <div class="stat-card"><div class="label">Mean</div>
    <div class="value">{mean:.1}<span class="unit">ms</span></div></div>
  <div class="stat-card"><div class="label">P95</div>
    <div class="value">{p95}<span class="unit">ms</span></div></div>
  <div class="stat-card"><div class="label">P99</div>
    <div class="value">{p99}<span class="unit">ms</span></div></div>
</div>

<h2>Thresholds</h2>
<table>
  <thead><tr><th>Metric</th><th>Expression</th><th>Observed</th><th>Result</th></tr></thead>
  <tbody>
{threshold_rows}
  </tbody>
</table>

<h2>Per-second breakdown</h2>
<table>
  <thead><tr><th>Second</th><th>Requests</th><th>Failures</th><th>Error %</th>
    <th>Avg ms</th><th>Min ms</th><th>Max ms</th></tr></thead>
  <tbody>
{ts_rows}
  </tbody>
</table>
</body>
</html>
"#,
        name = html_escape(&run.scenario_name),
        url = html_escape(&run.target_url),
        started = started,
        finished = finished,
        duration = duration_secs,
        run_id = run.run_id.hyphenated(),
        verdict_class = verdict_class,
        verdict = verdict_text,
        total = m.total_requests,
        failed = m.total_failures,
        failure_pct = failure_pct,
        rps = m.requests_per_second,
        mean = m.mean_ms,
        p95 = m.p95_ms,
        p99 = m.p99_ms,
        threshold_rows = threshold_rows,
        ts_rows = ts_rows,
    )
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thresholds::ThresholdOutcome;

    fn make_run(passed: bool) -> TestRun {
        let now = Utc::now();
        TestRun {
            run_id: Uuid::new_v4(),
            scenario_name: "go-api".to_string(),
            target_url: "http://localhost:8080/api/hello".to_string(),
            stages: vec![Stage { duration_secs: 5, target: 10 }],
            started_at: now,
            finished_at: now,
            metrics: MetricsSnapshot {
                total_requests: 1000,
                total_failures: 20,
                failure_rate: 0.02,
                min_ms: 10,
                max_ms: 900,
                mean_ms: 120.5,
                p50_ms: 100,
                p95_ms: 450,
                p99_ms: 800,
                requests_per_second: 62.5,
                elapsed_ms: 16_000,
            },
            time_series: vec![TimeBucketEntry {
                second: 0,
                requests: 50,
                failures: 1,
                avg_ms: 110.0,
                min_ms: 15,
                max_ms: 300,
            }],
            thresholds: ThresholdReport {
                passed,
                outcomes: vec![ThresholdOutcome {
                    metric: "http_req_duration".to_string(),
                    expression: "p(95)<500".to_string(),
                    observed: 450.0,
                    passed,
                    message: "http_req_duration: 'p(95)<500' passed (observed 450.00ms)"
                        .to_string(),
                }],
            },
            passed,
        }
    }

    // -----------------------------------------------------------------------
    // summary_file_name
    // -----------------------------------------------------------------------

    #[test]
    fn file_name_embeds_test_name() {
        assert_eq!(
            summary_file_name("go-api", ReportFormat::Json),
            "summary-go-api.json"
        );
        assert_eq!(
            summary_file_name("go-api", ReportFormat::Html),
            "summary-go-api.html"
        );
    }

    #[test]
    fn file_name_replaces_unsafe_characters() {
        assert_eq!(
            summary_file_name("my test/run", ReportFormat::Json),
            "summary-my-test-run.json"
        );
    }

    // -----------------------------------------------------------------------
    // render_json
    // -----------------------------------------------------------------------

    #[test]
    fn json_contains_metrics_and_verdict() {
        let run = make_run(true);
        let json = render_json(&run).expect("serialize should succeed");
        assert!(json.contains("\"total_requests\": 1000"));
        assert!(json.contains("\"passed\": true"));
        assert!(json.contains("\"p95_ms\": 450"));
        // Must parse back as valid JSON.
        let value: serde_json::Value = serde_json::from_str(&json).expect("should reparse");
        assert_eq!(value["scenario_name"], "go-api");
    }

    #[test]
    fn json_roundtrips_through_test_run() {
        let run = make_run(false);
        let json = render_json(&run).expect("serialize should succeed");
        let parsed: TestRun = serde_json::from_str(&json).expect("deserialize should succeed");
        assert_eq!(parsed.run_id, run.run_id);
        assert!(!parsed.passed);
    }

    // -----------------------------------------------------------------------
    // render_text
    // -----------------------------------------------------------------------

    #[test]
    fn text_report_shows_pass_verdict() {
        let run = make_run(true);
        let text = render_text(&run);
        assert!(text.contains("go-api"));
        assert!(text.contains("Total requests: 1000"));
        assert!(text.contains("P95: 450ms"));
        assert!(text.contains("Verdict: PASS"));
    }

    #[test]
    fn text_report_shows_fail_verdict_and_failed_threshold() {
        let mut run = make_run(false);
        run.thresholds.outcomes[0].message =
            "http_req_duration: 'p(95)<500' failed (observed 650.00ms, bound < 500ms)".to_string();
        let text = render_text(&run);
        assert!(text.contains("Verdict: FAIL"));
        assert!(text.contains("[FAIL]"));
        assert!(text.contains("p(95)<500"));
    }

    #[test]
    fn text_report_without_thresholds_notes_none_configured() {
        let mut run = make_run(true);
        run.thresholds.outcomes.clear();
        let text = render_text(&run);
        assert!(text.contains("(none configured)"));
    }

    // -----------------------------------------------------------------------
    // render_html
    // -----------------------------------------------------------------------

    #[test]
    fn html_report_is_standalone_document() {
        let run = make_run(true);
        let html = render_html(&run);
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("go-api"));
        assert!(html.contains("PASS"));
        assert!(html.contains("p(95)&lt;500"));
    }

    #[test]
    fn html_report_escapes_markup_in_names() {
        let mut run = make_run(true);
        run.scenario_name = "<script>alert(1)</script>".to_string();
        let html = render_html(&run);
        assert!(!html.contains("<script>alert"));
        assert!(html.contains("&lt;script&gt;"));
    }

    // -----------------------------------------------------------------------
    // render dispatch
    // -----------------------------------------------------------------------

    #[test]
    fn render_dispatches_on_explicit_format() {
        let run = make_run(true);
        let json = render(&run, ReportFormat::Json).expect("json should render");
        let html = render(&run, ReportFormat::Html).expect("html should render");
        let text = render(&run, ReportFormat::Text).expect("text should render");
        assert!(json.trim_start().starts_with('{'));
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(text.starts_with("stampede test run"));
    }

    #[test]
    fn format_parses_from_str() {
        assert_eq!("json".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
        assert_eq!("html".parse::<ReportFormat>().unwrap(), ReportFormat::Html);
        assert_eq!("text".parse::<ReportFormat>().unwrap(), ReportFormat::Text);
        assert!("yaml".parse::<ReportFormat>().is_err());
    }
}
