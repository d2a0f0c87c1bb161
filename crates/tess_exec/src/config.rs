//! Scheduler configuration knobs.

use std::env;
use std::str::FromStr;

/// How the scheduler picks among non-conflicting candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SchedulerPolicy {
    /// Take the first candidate that passes the conflict check.
    #[default]
    First,
    /// Among the first `window_size` passing candidates, take the one with
    /// the smallest remaining-execution-time estimate.
    Shortest,
    /// Same window, largest estimate.
    Longest,
}

impl FromStr for SchedulerPolicy {
    type Err = anyhow::Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_ascii_lowercase().as_str() {
            "first" => Ok(SchedulerPolicy::First),
            "shortest" => Ok(SchedulerPolicy::Shortest),
            "longest" => Ok(SchedulerPolicy::Longest),
            other => anyhow::bail!("unknown scheduler policy `{other}`"),
        }
    }
}

/// Per-partition scheduler settings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub policy: SchedulerPolicy,
    /// Number of passing candidates examined under SHORTEST/LONGEST.
    /// Clamped to at least one.
    pub window_size: usize,
    /// Skip scanning entirely when the stalled transaction is local and
    /// predicted all-local.
    pub ignore_all_local: bool,
    pub profiling: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            policy: SchedulerPolicy::First,
            window_size: 1,
            ignore_all_local: false,
            profiling: false,
        }
    }
}

impl SchedulerConfig {
    /// Read settings from `TESS_SPEC_*` environment variables, falling back
    /// to the defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            policy: env::var("TESS_SPEC_POLICY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.policy),
            window_size: read_env_usize("TESS_SPEC_WINDOW", defaults.window_size).max(1),
            ignore_all_local: read_env_bool(
                "TESS_SPEC_IGNORE_ALL_LOCAL",
                defaults.ignore_all_local,
            ),
            profiling: read_env_bool("TESS_SPEC_PROFILING", defaults.profiling),
        }
    }
}

fn read_env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| usize::from_str(&v).ok())
        .unwrap_or(default)
}

fn read_env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .map(|v| {
            matches!(
                v.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "y" | "on"
            )
        })
        .unwrap_or(default)
}
