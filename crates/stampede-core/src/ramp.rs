use std::time::Duration;

use crate::scenario::model::Stage;

// ---------------------------------------------------------------------------
// RampTarget
// ---------------------------------------------------------------------------

/// The scheduler's answer for "how many virtual users should run right now".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampTarget {
    pub vus: u32,
    /// True once elapsed time has passed the end of the last stage.
    pub complete: bool,
}

// ---------------------------------------------------------------------------
// RampSchedule
// ---------------------------------------------------------------------------

/// Piecewise-linear virtual-user ramp over an ordered stage sequence.
///
/// Each stage ramps linearly from the previous stage's target (0 before the
/// first stage) to its own target over its duration. A zero-duration stage
/// is an instantaneous jump.
#[derive(Debug, Clone)]
pub struct RampSchedule {
    stages: Vec<Stage>,
}

impl RampSchedule {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    /// Total configured duration of the profile.
    pub fn total_duration(&self) -> Duration {
        Duration::from_secs(self.stages.iter().map(|s| s.duration_secs).sum())
    }

    /// Compute the target virtual-user count at `elapsed` time since start.
    ///
    /// Past the end of the last stage the final stage's target is returned
    /// with `complete` set; at the exact boundary between two stages the
    /// target equals the earlier stage's configured target, which is also
    /// the later stage's starting anchor.
    pub fn target_at(&self, elapsed: Duration) -> RampTarget {
        let elapsed_secs = elapsed.as_secs_f64();
        let mut stage_start = 0.0_f64;
        let mut previous_target = 0u32;

        for stage in &self.stages {
            let duration = stage.duration_secs as f64;
            let stage_end = stage_start + duration;

            if elapsed_secs < stage_end {
                let fraction = (elapsed_secs - stage_start) / duration;
                let from = previous_target as f64;
                let to = stage.target as f64;
                let vus = (from + fraction * (to - from)).round() as u32;
                return RampTarget { vus, complete: false };
            }

            stage_start = stage_end;
            previous_target = stage.target;
        }

        // Elapsed time exceeds the configured profile (or there are no
        // stages): hold the final target and signal completion.
        RampTarget {
            vus: previous_target,
            complete: true,
        }
    }
}
