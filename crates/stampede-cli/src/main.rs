use std::path::{Path, PathBuf};

use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stampede_core::engine::{run_test, EngineConfig, EngineEvent};
use stampede_core::report::{self, ReportFormat, TestRun};
use stampede_core::scenario::{read_scenario, validate_scenario, Scenario};

/// Exit codes: 0 = all thresholds passed, 1 = at least one threshold
/// failed, 2 = configuration error. CI pipelines key off these.
const EXIT_PASS: i32 = 0;
const EXIT_THRESHOLD_FAILED: i32 = 1;
const EXIT_CONFIG_ERROR: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "stampede", about = "Staged virtual-user HTTP load generation")]
struct Cli {
    /// Path to the scenario JSON file.
    scenario: PathBuf,

    /// Directory for summary artifacts.
    #[arg(long, default_value = "results")]
    out: PathBuf,

    /// Report formats to write, comma separated (json, html, text).
    #[arg(long, value_delimiter = ',', default_value = "json")]
    format: Vec<ReportFormat>,

    /// Override the scenario's target URL (TARGET_URL or API_URL env vars
    /// also work).
    #[arg(long)]
    url: Option<String>,

    /// Override the scenario's test name (TEST_NAME or API_NAME env vars
    /// also work).
    #[arg(long)]
    name: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stampede=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let code = run(Cli::parse()).await;
    std::process::exit(code);
}

async fn run(cli: Cli) -> i32 {
    let mut scenario = match read_scenario(&cli.scenario).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Cannot load scenario {}: {e}", cli.scenario.display());
            return EXIT_CONFIG_ERROR;
        }
    };

    apply_overrides(
        &mut scenario,
        cli.url.or_else(|| env_override(&["TARGET_URL", "API_URL"])),
        cli.name.or_else(|| env_override(&["TEST_NAME", "API_NAME"])),
    );

    let errors = validate_scenario(&scenario);
    if !errors.is_empty() {
        for e in &errors {
            tracing::error!("{e}");
        }
        return EXIT_CONFIG_ERROR;
    }

    tracing::info!(
        name = %scenario.name,
        url = %scenario.target_url,
        stages = scenario.stages.len(),
        duration_secs = scenario.total_duration_secs(),
        "starting test"
    );

    let (event_tx, mut event_rx) = mpsc::channel(1024);
    let handle = match run_test(EngineConfig {
        scenario: scenario.clone(),
        event_tx,
    })
    .await
    {
        Ok(h) => h,
        Err(e) => {
            tracing::error!("{e}");
            return EXIT_CONFIG_ERROR;
        }
    };

    // Ctrl-C triggers a graceful stop; the engine still emits a summary for
    // whatever traffic ran.
    let cancel = handle.cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping test");
            cancel.cancel();
        }
    });

    let mut final_run: Option<Box<TestRun>> = None;
    while let Some(event) = event_rx.recv().await {
        match event {
            EngineEvent::Progress {
                completed_requests,
                total_failures,
                active_vus,
                p95_ms,
                current_rps,
                ..
            } => {
                tracing::info!(
                    vus = active_vus,
                    requests = completed_requests,
                    failures = total_failures,
                    p95_ms,
                    rps = %format_args!("{current_rps:.1}"),
                    "progress"
                );
            }
            EngineEvent::StatusChange { status } => {
                tracing::debug!(%status, "engine status");
            }
            EngineEvent::Complete { run } => {
                final_run = Some(run);
                break;
            }
        }
    }

    let Some(run) = final_run else {
        tracing::error!("engine ended without producing a summary");
        return EXIT_CONFIG_ERROR;
    };

    write_artifacts(&run, &cli.out, &cli.format).await;

    // The console summary always reaches stdout, so the verdict survives
    // any artifact IO failure.
    println!("{}", report::render_text(&run));

    if run.passed {
        EXIT_PASS
    } else {
        EXIT_THRESHOLD_FAILED
    }
}

fn apply_overrides(scenario: &mut Scenario, url: Option<String>, name: Option<String>) {
    scenario.apply_overrides(url.as_deref(), name.as_deref());
}

/// First non-empty value among the given environment variables.
fn env_override(keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()))
}

/// Write each requested artifact. IO failures are reported but never change
/// the verdict; on a failed JSON write the document falls back to stdout.
async fn write_artifacts(run: &TestRun, out_dir: &Path, formats: &[ReportFormat]) {
    if let Err(e) = tokio::fs::create_dir_all(out_dir).await {
        tracing::error!("Cannot create output directory {}: {e}", out_dir.display());
    }

    let mut seen: Vec<ReportFormat> = Vec::new();
    for &format in formats {
        if seen.contains(&format) {
            continue;
        }
        seen.push(format);

        let document = match report::render(run, format) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::error!("Failed to render {format:?} report: {e}");
                continue;
            }
        };

        let path = out_dir.join(report::summary_file_name(&run.scenario_name, format));
        match tokio::fs::write(&path, &document).await {
            Ok(()) => tracing::info!("wrote {}", path.display()),
            Err(e) => {
                tracing::error!("Cannot write {}: {e}", path.display());
                if format == ReportFormat::Json {
                    // Fallback so machine consumers still get the summary.
                    println!("{document}");
                }
            }
        }
    }
}
