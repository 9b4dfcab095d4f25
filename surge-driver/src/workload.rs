use rand::Rng;
use std::time::Duration;

/// One synthetic API call a virtual user can issue against the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// GET /, the welcome payload.
    GetRoot,
    /// GET /users, the full listing.
    ListUsers,
    /// GET /users/{id} with an id that exists in the target's seed data.
    GetUser,
    /// GET /users/{id} with an id that cannot exist. A 404 is the expected
    /// response and counts as a success.
    GetMissingUser,
    /// POST /users with a well-formed body.
    CreateUser,
    /// POST /users with the required name field missing. A 400 is the
    /// expected response and counts as a success.
    CreateInvalidUser,
}

/// Workload profiles controlling the mix of tasks virtual users issue and
/// how long they idle between tasks.
///
/// | Profile  | / | list | get | get-404 | create | create-400 | wait    |
/// |----------|---|------|-----|---------|--------|------------|---------|
/// | Baseline | 1 |  3   |  1  |    0    |   1    |     0      | 1–3 s   |
/// | Spike    | 0 |  4   |  2  |    0    |   1    |     0      | 0.5–2 s |
/// | ErrorMix | 1 |  3   |  2  |    1    |   2    |     1      | 1–3 s   |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadProfile {
    Baseline,
    Spike,
    ErrorMix,
}

impl WorkloadProfile {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "baseline" => Some(WorkloadProfile::Baseline),
            "spike" => Some(WorkloadProfile::Spike),
            "error-mix" => Some(WorkloadProfile::ErrorMix),
            _ => None,
        }
    }

    pub fn as_name(&self) -> &'static str {
        match self {
            WorkloadProfile::Baseline => "baseline",
            WorkloadProfile::Spike => "spike",
            WorkloadProfile::ErrorMix => "error-mix",
        }
    }

    /// Total weight of the profile's roll table.
    pub fn weight_total(&self) -> u32 {
        match self {
            WorkloadProfile::Baseline => 6,
            WorkloadProfile::Spike => 7,
            WorkloadProfile::ErrorMix => 10,
        }
    }

    /// Draw a random task using `rng`.
    pub fn sample(&self, rng: &mut impl Rng) -> Task {
        let roll: u32 = rng.gen_range(0..self.weight_total());
        self.task_for_roll(roll)
    }

    /// Map a roll in `0..weight_total()` to a task according to the
    /// profile's weights. Exposed for deterministic testing.
    pub fn task_for_roll(&self, roll: u32) -> Task {
        match self {
            WorkloadProfile::Baseline => {
                // root 1, list 3, get 1, create 1
                if roll < 1 {
                    Task::GetRoot
                } else if roll < 4 {
                    Task::ListUsers
                } else if roll < 5 {
                    Task::GetUser
                } else {
                    Task::CreateUser
                }
            }
            WorkloadProfile::Spike => {
                // list 4, get 2, create 1
                if roll < 4 {
                    Task::ListUsers
                } else if roll < 6 {
                    Task::GetUser
                } else {
                    Task::CreateUser
                }
            }
            WorkloadProfile::ErrorMix => {
                // get 2, get-404 1, create 2, create-400 1, list 3, root 1
                if roll < 2 {
                    Task::GetUser
                } else if roll < 3 {
                    Task::GetMissingUser
                } else if roll < 5 {
                    Task::CreateUser
                } else if roll < 6 {
                    Task::CreateInvalidUser
                } else if roll < 9 {
                    Task::ListUsers
                } else {
                    Task::GetRoot
                }
            }
        }
    }

    /// Draw the idle time a virtual user waits between tasks.
    pub fn wait_time(&self, rng: &mut impl Rng) -> Duration {
        let (low, high) = self.wait_bounds();
        Duration::from_secs_f64(rng.gen_range(low..=high))
    }

    /// Wait-time bounds in seconds. Exposed for deterministic testing.
    pub fn wait_bounds(&self) -> (f64, f64) {
        match self {
            WorkloadProfile::Baseline | WorkloadProfile::ErrorMix => (1.0, 3.0),
            WorkloadProfile::Spike => (0.5, 2.0),
        }
    }
}
