//! Mapping from a [`Profile`] to an injection schedule and SLA thresholds.
use crate::Profile;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// One time-bounded segment of the arrival schedule.
///
/// Arrivals follow an open workload model: new iterations start on schedule
/// whether or not earlier ones have finished.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InjectionPhase {
    /// Start `users` iterations spread evenly over `duration`.
    Ramp { users: u64, duration: Duration },
    /// Start `users_per_sec` iterations every second for `duration`.
    ConstantRate { users_per_sec: f64, duration: Duration },
}

impl InjectionPhase {
    pub fn duration(&self) -> Duration {
        match self {
            InjectionPhase::Ramp { duration, .. } | InjectionPhase::ConstantRate { duration, .. } => {
                *duration
            }
        }
    }

    /// Total number of iterations started by this phase.
    pub fn arrivals(&self) -> u64 {
        match self {
            InjectionPhase::Ramp { users, .. } => *users,
            InjectionPhase::ConstantRate {
                users_per_sec,
                duration,
            } => {
                let arrivals = (users_per_sec * duration.as_secs_f64()).round();
                if arrivals.is_finite() && arrivals > 0. {
                    arrivals as u64
                } else {
                    0
                }
            }
        }
    }

    /// Gap between two consecutive arrivals, or `None` for a phase with no
    /// arrivals.
    pub fn arrival_interval(&self) -> Option<Duration> {
        match self.arrivals() {
            0 => None,
            n => Some(Duration::from_secs_f64(self.duration().as_secs_f64() / n as f64)),
        }
    }
}

impl fmt::Display for InjectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InjectionPhase::Ramp { users, duration } => write!(
                f,
                "ramp {users} users over {}",
                humantime::format_duration(*duration)
            ),
            InjectionPhase::ConstantRate {
                users_per_sec,
                duration,
            } => write!(
                f,
                "constant {users_per_sec:.2} users/s for {}",
                humantime::format_duration(*duration)
            ),
        }
    }
}

/// Maximum acceptable p95 latency and error rate for a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SlaThresholds {
    pub p95_latency_ms: u64,
    pub max_error_rate_percent: f64,
}

impl SlaThresholds {
    pub fn p95_latency(&self) -> Duration {
        Duration::from_millis(self.p95_latency_ms)
    }
}

struct Shape {
    ramp_users: u64,
    ramp_secs: u64,
    users_per_sec: f64,
    constant_secs: u64,
}

const fn shape(profile: Profile) -> Shape {
    match profile {
        Profile::Smoke => Shape {
            ramp_users: 5,
            ramp_secs: 20,
            users_per_sec: 2.0,
            constant_secs: 20,
        },
        Profile::Baseline => Shape {
            ramp_users: 20,
            ramp_secs: 60,
            users_per_sec: 8.0,
            constant_secs: 120,
        },
        Profile::Stress => Shape {
            ramp_users: 60,
            ramp_secs: 120,
            users_per_sec: 20.0,
            constant_secs: 180,
        },
    }
}

/// Build the two-phase schedule for `profile`.
///
/// User counts and rates are multiplied by `scale`, phase durations by
/// `duration_multiplier`. Both multipliers below 1 are treated as 1.
pub fn user_injection(profile: Profile, scale: i64, duration_multiplier: i64) -> Vec<InjectionPhase> {
    let scale = at_least_one(scale);
    let stretch = at_least_one(duration_multiplier);
    let shape = shape(profile);

    vec![
        InjectionPhase::Ramp {
            users: shape.ramp_users.saturating_mul(scale),
            duration: Duration::from_secs(shape.ramp_secs.saturating_mul(stretch)),
        },
        InjectionPhase::ConstantRate {
            users_per_sec: shape.users_per_sec * scale as f64,
            duration: Duration::from_secs(shape.constant_secs.saturating_mul(stretch)),
        },
    ]
}

fn at_least_one(value: i64) -> u64 {
    value.max(1).unsigned_abs()
}

pub fn p95_ms(profile: Profile) -> u64 {
    match profile {
        Profile::Smoke => 150,
        Profile::Baseline => 300,
        Profile::Stress => 600,
    }
}

pub fn max_error_rate_percent(profile: Profile) -> f64 {
    match profile {
        Profile::Smoke => 0.5,
        Profile::Baseline => 1.0,
        Profile::Stress => 2.0,
    }
}

pub fn thresholds(profile: Profile) -> SlaThresholds {
    SlaThresholds {
        p95_latency_ms: p95_ms(profile),
        max_error_rate_percent: max_error_rate_percent(profile),
    }
}

/// Wall-clock length of a schedule.
pub fn total_duration(phases: &[InjectionPhase]) -> Duration {
    phases.iter().map(InjectionPhase::duration).sum()
}
