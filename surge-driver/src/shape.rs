use std::time::Duration;
use surge_common::{PlanError, StageSpec};

/// One stage of a load shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stage {
    /// Cumulative elapsed run time at which this stage ends.
    pub end_offset: Duration,
    /// Number of virtual users the worker pool should converge to.
    pub users: u32,
    /// Maximum worker-count change per second while converging.
    pub spawn_rate: f64,
}

/// Target state the controller hands the worker pool for the current tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageTarget {
    pub users: u32,
    pub spawn_rate: f64,
}

/// A time-varying concurrency plan: an ordered stage sequence with strictly
/// increasing end offsets.
///
/// Immutable once constructed, and [`tick`](Self::tick) is a pure function
/// of elapsed time, so one shape can be shared freely across tasks without
/// locking.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadShape {
    stages: Vec<Stage>,
}

impl LoadShape {
    /// Validate and build a shape.
    ///
    /// Returns [`PlanError::NonIncreasingOffset`] if any stage does not end
    /// strictly after the one before it, and [`PlanError::InvalidSpawnRate`]
    /// for a spawn rate that is not a positive finite number. An empty stage
    /// list is valid: the resulting shape reports completion immediately.
    pub fn new(stages: Vec<Stage>) -> Result<Self, PlanError> {
        let mut prev: Option<Duration> = None;
        for (index, stage) in stages.iter().enumerate() {
            if !stage.spawn_rate.is_finite() || stage.spawn_rate <= 0.0 {
                return Err(PlanError::InvalidSpawnRate(index, stage.spawn_rate));
            }
            if let Some(prev_offset) = prev {
                if stage.end_offset <= prev_offset {
                    return Err(PlanError::NonIncreasingOffset(index));
                }
            }
            prev = Some(stage.end_offset);
        }
        Ok(Self { stages })
    }

    /// Build a shape from plan-file stage specs, rejecting durations that
    /// cannot be represented as elapsed time.
    pub fn from_specs(specs: &[StageSpec]) -> Result<Self, PlanError> {
        let mut stages = Vec::with_capacity(specs.len());
        for (index, spec) in specs.iter().enumerate() {
            let end_offset = Duration::try_from_secs_f64(spec.duration)
                .map_err(|_| PlanError::InvalidDuration(index, spec.duration))?;
            stages.push(Stage { end_offset, users: spec.users, spawn_rate: spec.spawn_rate });
        }
        Self::new(stages)
    }

    /// Load a shape from a JSON plan file: an array of stage specs, e.g.
    /// `[{"duration": 120, "users": 50, "spawn_rate": 2}, ...]`.
    pub fn from_plan_file(path: &std::path::Path) -> Result<Self, PlanError> {
        let text =
            std::fs::read_to_string(path).map_err(|e| PlanError::PlanFile(e.to_string()))?;
        let specs: Vec<StageSpec> =
            serde_json::from_str(&text).map_err(|e| PlanError::PlanFile(e.to_string()))?;
        Self::from_specs(&specs)
    }

    /// Single-stage shape: hold `users` for `duration`.
    pub fn constant(users: u32, spawn_rate: f64, duration: Duration) -> Result<Self, PlanError> {
        Self::new(vec![Stage { end_offset: duration, users, spawn_rate }])
    }

    /// The built-in spike pattern: ramp to 50 users, spike to 200, cool down
    /// to 10, then repeat the cycle once over a 10-minute run.
    pub fn spike() -> Self {
        let stage = |secs: u64, users: u32, spawn_rate: f64| Stage {
            end_offset: Duration::from_secs(secs),
            users,
            spawn_rate,
        };
        // Offsets are strictly increasing by construction.
        Self {
            stages: vec![
                stage(120, 50, 2.0),
                stage(180, 200, 10.0),
                stage(300, 10, 5.0),
                stage(420, 50, 2.0),
                stage(480, 200, 10.0),
                stage(600, 10, 5.0),
            ],
        }
    }

    /// Current target for `elapsed` run time, or `None` once the plan is
    /// exhausted and the run should stop.
    ///
    /// A stage covers `[previous end offset, its own end offset)`: an
    /// `elapsed` exactly on a boundary already belongs to the next stage.
    /// O(stages) scan; stage counts are small enough that a search structure
    /// would not pay for itself.
    pub fn tick(&self, elapsed: Duration) -> Option<StageTarget> {
        self.stages
            .iter()
            .find(|stage| elapsed < stage.end_offset)
            .map(|stage| StageTarget { users: stage.users, spawn_rate: stage.spawn_rate })
    }

    /// Elapsed time at which the plan ends, or `None` for an empty plan.
    pub fn total_duration(&self) -> Option<Duration> {
        self.stages.last().map(|stage| stage.end_offset)
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}
