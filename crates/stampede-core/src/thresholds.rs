//! Threshold engine — parses pass/fail expressions and evaluates them
//! against a metrics snapshot to decide the test verdict.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::StampedeError;
use crate::metrics::MetricsSnapshot;

// ---------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------

/// The aggregate a threshold expression selects from the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    P50,
    P95,
    P99,
    Mean,
    Min,
    Max,
    /// Failure rate as a fraction in [0, 1].
    Rate,
}

impl Aggregate {
    /// Whether this aggregate is computed from response durations (as
    /// opposed to request counts).
    fn is_duration(self) -> bool {
        !matches!(self, Aggregate::Rate)
    }
}

// ---------------------------------------------------------------------------
// Comparator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparator {
    fn compare(self, observed: f64, bound: f64) -> bool {
        match self {
            Comparator::Lt => observed < bound,
            Comparator::Le => observed <= bound,
            Comparator::Gt => observed > bound,
            Comparator::Ge => observed >= bound,
        }
    }
}

impl std::fmt::Display for Comparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// ThresholdSpec
// ---------------------------------------------------------------------------

/// A single parsed threshold: `metric` is the configured metric name, and
/// `expression` the original text for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ThresholdSpec {
    pub metric: String,
    pub expression: String,
    pub aggregate: Aggregate,
    pub comparator: Comparator,
    pub bound: f64,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse one threshold expression such as `p(95)<500`, `rate<0.01`, or
/// `avg<=200`.
///
/// Malformed expressions are configuration errors and fatal at startup,
/// before any traffic is generated.
pub fn parse_threshold(metric: &str, expression: &str) -> Result<ThresholdSpec, StampedeError> {
    let expr = expression.trim();

    let (op_pos, op_len, comparator) = find_comparator(expr).ok_or_else(|| {
        StampedeError::Config(format!(
            "Threshold '{metric}': expression '{expr}' has no comparator (<, <=, >, >=)"
        ))
    })?;

    let left = expr[..op_pos].trim();
    let right = expr[op_pos + op_len..].trim();

    let aggregate = parse_aggregate(left).ok_or_else(|| {
        StampedeError::Config(format!(
            "Threshold '{metric}': unknown aggregate '{left}' \
             (expected p(50), p(95), p(99), avg, min, max, or rate)"
        ))
    })?;

    let bound: f64 = right.parse().map_err(|_| {
        StampedeError::Config(format!(
            "Threshold '{metric}': bound '{right}' is not a number"
        ))
    })?;
    if !bound.is_finite() || bound < 0.0 {
        return Err(StampedeError::Config(format!(
            "Threshold '{metric}': bound must be a non-negative finite number (got {right})"
        )));
    }

    Ok(ThresholdSpec {
        metric: metric.to_string(),
        expression: expr.to_string(),
        aggregate,
        comparator,
        bound,
    })
}

/// Parse every expression in a `metric name → expressions` map, in metric
/// name order.
pub fn parse_all(
    thresholds: &BTreeMap<String, Vec<String>>,
) -> Result<Vec<ThresholdSpec>, StampedeError> {
    let mut specs = Vec::new();
    for (metric, expressions) in thresholds {
        for expr in expressions {
            specs.push(parse_threshold(metric, expr)?);
        }
    }
    Ok(specs)
}

fn find_comparator(expr: &str) -> Option<(usize, usize, Comparator)> {
    let pos = expr.find(['<', '>'])?;
    let strict = !expr[pos + 1..].starts_with('=');
    let comparator = match (expr.as_bytes()[pos], strict) {
        (b'<', true) => Comparator::Lt,
        (b'<', false) => Comparator::Le,
        (b'>', true) => Comparator::Gt,
        (b'>', false) => Comparator::Ge,
        _ => return None,
    };
    Some((pos, if strict { 1 } else { 2 }, comparator))
}

fn parse_aggregate(text: &str) -> Option<Aggregate> {
    match text {
        "p(50)" | "med" => Some(Aggregate::P50),
        "p(95)" => Some(Aggregate::P95),
        "p(99)" => Some(Aggregate::P99),
        "avg" => Some(Aggregate::Mean),
        "min" => Some(Aggregate::Min),
        "max" => Some(Aggregate::Max),
        "rate" => Some(Aggregate::Rate),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Result of evaluating a single threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ThresholdOutcome {
    pub metric: String,
    pub expression: String,
    pub observed: f64,
    pub passed: bool,
    pub message: String,
}

/// Overall verdict: the conjunction of every individual threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ThresholdReport {
    pub passed: bool,
    pub outcomes: Vec<ThresholdOutcome>,
}

impl ThresholdReport {
    /// The specs that failed, for callers that need to name them.
    pub fn failures(&self) -> Vec<&ThresholdOutcome> {
        self.outcomes.iter().filter(|o| !o.passed).collect()
    }
}

/// Evaluate every spec against the snapshot. Deterministic: the same
/// snapshot and specs always produce the same report.
///
/// Zero-sample policy: every threshold evaluated when no requests were
/// recorded passes vacuously, and its message says so. With no samples
/// there is no duration to compare and the failure rate is undefined, so
/// the evaluator never compares against the bound at all.
pub fn evaluate(snapshot: &MetricsSnapshot, specs: &[ThresholdSpec]) -> ThresholdReport {
    let outcomes: Vec<ThresholdOutcome> = specs
        .iter()
        .map(|spec| evaluate_spec(snapshot, spec))
        .collect();
    let passed = outcomes.iter().all(|o| o.passed);
    ThresholdReport { passed, outcomes }
}

fn evaluate_spec(snapshot: &MetricsSnapshot, spec: &ThresholdSpec) -> ThresholdOutcome {
    if snapshot.total_requests == 0 {
        return ThresholdOutcome {
            metric: spec.metric.clone(),
            expression: spec.expression.clone(),
            observed: 0.0,
            passed: true,
            message: format!(
                "{}: no samples recorded, '{}' passes vacuously",
                spec.metric, spec.expression
            ),
        };
    }

    let observed = match spec.aggregate {
        Aggregate::P50 => snapshot.p50_ms as f64,
        Aggregate::P95 => snapshot.p95_ms as f64,
        Aggregate::P99 => snapshot.p99_ms as f64,
        Aggregate::Mean => snapshot.mean_ms,
        Aggregate::Min => snapshot.min_ms as f64,
        Aggregate::Max => snapshot.max_ms as f64,
        Aggregate::Rate => snapshot.failure_rate,
    };

    let passed = spec.comparator.compare(observed, spec.bound);
    let unit = if spec.aggregate.is_duration() { "ms" } else { "" };
    let message = if passed {
        format!(
            "{}: '{}' passed (observed {observed:.2}{unit})",
            spec.metric, spec.expression
        )
    } else {
        format!(
            "{}: '{}' failed (observed {observed:.2}{unit}, bound {} {}{unit})",
            spec.metric, spec.expression, spec.comparator, spec.bound
        )
    };

    ThresholdOutcome {
        metric: spec.metric.clone(),
        expression: spec.expression.clone(),
        observed,
        passed,
        message,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
