//! Defines the configuration structures for interval jobs.
//!
//! Plans are plain `serde` structs so they can be written inline with the
//! builder-style helpers or deserialized from a TOML file via the `config`
//! crate. Durations are carried as whole milliseconds, which keeps the file
//! format trivial.

use std::time::Duration;

use serde::Deserialize;

/// When and how often an interval job ticks.
///
/// A plan with `times: None` runs until cancelled. The tick index starts at
/// `start_index` and increments by one per tick.
#[derive(Debug, Clone, Deserialize)]
pub struct IntervalPlan {
    /// Delay between consecutive ticks, in milliseconds.
    pub period_ms: u64,

    /// Total number of ticks to deliver; `None` means run forever.
    #[serde(default)]
    pub times: Option<u64>,

    /// Delay before the first tick, in milliseconds.
    #[serde(default)]
    pub delay_ms: u64,

    /// Sequence index carried by the first tick.
    #[serde(default)]
    pub start_index: u64,
}

impl IntervalPlan {
    /// A plan that ticks forever at the given period, starting immediately
    /// at index zero.
    pub fn every(period: Duration) -> Self {
        Self {
            period_ms: saturating_millis(period),
            times: None,
            delay_ms: 0,
            start_index: 0,
        }
    }

    /// Bounds the plan to a total tick count.
    pub fn times(mut self, times: u64) -> Self {
        self.times = Some(times);
        self
    }

    /// Delays the first tick.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay_ms = saturating_millis(delay);
        self
    }

    /// Sets the sequence index of the first tick.
    pub fn starting_at(mut self, index: u64) -> Self {
        self.start_index = index;
        self
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Durations beyond ~584 million years of milliseconds clamp to `u64::MAX`.
fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Top-level configuration a binary can load from a file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunnerConfig {
    /// Interval jobs to register at startup.
    #[serde(default)]
    pub intervals: Vec<IntervalPlan>,
}

impl RunnerConfig {
    /// Loads a configuration from a TOML file (extension optional, per the
    /// `config` crate's source resolution).
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;
        Ok(cfg.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_fields_default_from_toml() {
        let cfg = config::Config::builder()
            .add_source(config::File::from_str(
                "[[intervals]]\nperiod_ms = 250\ntimes = 4\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let loaded: RunnerConfig = cfg.try_deserialize().unwrap();
        assert_eq!(loaded.intervals.len(), 1);
        let plan = &loaded.intervals[0];
        assert_eq!(plan.period(), Duration::from_millis(250));
        assert_eq!(plan.times, Some(4));
        assert_eq!(plan.delay_ms, 0);
        assert_eq!(plan.start_index, 0);
    }

    #[test]
    fn oversized_durations_clamp_instead_of_truncating() {
        let plan = IntervalPlan::every(Duration::MAX).delayed(Duration::MAX);
        assert_eq!(plan.period_ms, u64::MAX);
        assert_eq!(plan.delay_ms, u64::MAX);
    }

    #[test]
    fn builder_helpers_compose() {
        let plan = IntervalPlan::every(Duration::from_millis(20))
            .times(3)
            .delayed(Duration::from_millis(5))
            .starting_at(7);
        assert_eq!(plan.period(), Duration::from_millis(20));
        assert_eq!(plan.delay(), Duration::from_millis(5));
        assert_eq!(plan.times, Some(3));
        assert_eq!(plan.start_index, 7);
    }
}
