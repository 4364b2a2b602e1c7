//! Staged polling schedules.
//!
//! A schedule polls densely while a job is young and widens the interval in
//! steps, never shrinking it, until an overall timeout. Image and video jobs
//! use different schedules; the dispatcher code is the same for both.

use std::time::Duration;

use cloner_models::JobKind;

use crate::error::{DispatchError, DispatchResult};

/// Poll every `interval` while elapsed time is below `until`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollStage {
    pub until: Duration,
    pub interval: Duration,
}

impl PollStage {
    pub const fn secs(until: u64, interval: u64) -> Self {
        Self {
            until: Duration::from_secs(until),
            interval: Duration::from_secs(interval),
        }
    }
}

/// Validated, monotonically non-decreasing polling schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule {
    stages: Vec<PollStage>,
    max_interval: Duration,
    timeout: Duration,
}

impl BackoffSchedule {
    /// Build a schedule.
    ///
    /// Stage boundaries must increase, intervals must be non-zero and
    /// non-decreasing, and none may exceed `max_interval`.
    pub fn new(
        stages: Vec<PollStage>,
        max_interval: Duration,
        timeout: Duration,
    ) -> DispatchResult<Self> {
        if max_interval.is_zero() {
            return Err(DispatchError::Config("max poll interval must be positive".into()));
        }
        let first_interval = stages.first().map_or(max_interval, |s| s.interval);
        if timeout < first_interval {
            return Err(DispatchError::Config(
                "poll timeout is shorter than the first interval".into(),
            ));
        }

        let mut previous: Option<PollStage> = None;
        for stage in &stages {
            if stage.interval.is_zero() {
                return Err(DispatchError::Config("poll intervals must be positive".into()));
            }
            if stage.interval > max_interval {
                return Err(DispatchError::Config(format!(
                    "poll interval {:?} exceeds the cap {:?}",
                    stage.interval, max_interval
                )));
            }
            if let Some(prev) = previous {
                if stage.until <= prev.until {
                    return Err(DispatchError::Config(
                        "poll stage boundaries must increase".into(),
                    ));
                }
                if stage.interval < prev.interval {
                    return Err(DispatchError::Config(
                        "poll intervals must not decrease".into(),
                    ));
                }
            }
            previous = Some(*stage);
        }

        Ok(Self {
            stages,
            max_interval,
            timeout,
        })
    }

    /// 3s for the first 30s, 5s until 2 minutes, then 10s; 10 minute timeout.
    pub fn image_default() -> Self {
        Self {
            stages: vec![PollStage::secs(30, 3), PollStage::secs(120, 5)],
            max_interval: Duration::from_secs(10),
            timeout: Duration::from_secs(600),
        }
    }

    /// 10s for the first minute, 15s until 3 minutes, then 30s; 15 minute timeout.
    pub fn video_default() -> Self {
        Self {
            stages: vec![PollStage::secs(60, 10), PollStage::secs(180, 15)],
            max_interval: Duration::from_secs(30),
            timeout: Duration::from_secs(900),
        }
    }

    pub fn for_kind(kind: JobKind) -> Self {
        match kind {
            JobKind::Image => Self::image_default(),
            JobKind::Video => Self::video_default(),
        }
    }

    /// Same stages with a different overall timeout.
    pub fn with_timeout(self, timeout: Duration) -> DispatchResult<Self> {
        Self::new(self.stages, self.max_interval, timeout)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_interval(&self) -> Duration {
        self.max_interval
    }

    /// Smallest wait the schedule ever uses.
    pub fn min_interval(&self) -> Duration {
        self.stages
            .first()
            .map_or(self.max_interval, |s| s.interval)
    }

    /// Wait to use when `elapsed` has passed since polling started.
    pub fn interval_at(&self, elapsed: Duration) -> Duration {
        self.stages
            .iter()
            .find(|s| elapsed < s.until)
            .map_or(self.max_interval, |s| s.interval)
    }

    /// The full sequence of waits, stopping before their sum would exceed
    /// the timeout.
    pub fn intervals(&self) -> Intervals<'_> {
        Intervals {
            schedule: self,
            elapsed: Duration::ZERO,
        }
    }
}

/// Iterator over the waits of a [`BackoffSchedule`].
#[derive(Debug, Clone)]
pub struct Intervals<'a> {
    schedule: &'a BackoffSchedule,
    elapsed: Duration,
}

impl Iterator for Intervals<'_> {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let next = self.schedule.interval_at(self.elapsed);
        if self.elapsed + next > self.schedule.timeout {
            return None;
        }
        self.elapsed += next;
        Some(next)
    }
}

/// One schedule per job kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulePolicy {
    pub image: BackoffSchedule,
    pub video: BackoffSchedule,
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self {
            image: BackoffSchedule::image_default(),
            video: BackoffSchedule::video_default(),
        }
    }
}

impl SchedulePolicy {
    pub fn for_kind(&self, kind: JobKind) -> &BackoffSchedule {
        match kind {
            JobKind::Image => &self.image,
            JobKind::Video => &self.video,
        }
    }

    /// Policy using `schedule` for both kinds.
    pub fn uniform(schedule: BackoffSchedule) -> Self {
        Self {
            image: schedule.clone(),
            video: schedule,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_well_formed(schedule: &BackoffSchedule) {
        let waits: Vec<Duration> = schedule.intervals().collect();
        assert!(!waits.is_empty());
        assert!(waits.windows(2).all(|w| w[0] <= w[1]), "waits must not shrink");
        assert!(waits.iter().all(|w| *w <= schedule.max_interval()));
        let total: Duration = waits.iter().sum();
        assert!(total <= schedule.timeout());
    }

    #[test]
    fn test_defaults_are_monotonic_and_bounded() {
        assert_well_formed(&BackoffSchedule::image_default());
        assert_well_formed(&BackoffSchedule::video_default());
        // Defaults must also pass the constructor's own checks.
        for kind in [JobKind::Image, JobKind::Video] {
            let s = BackoffSchedule::for_kind(kind);
            assert!(BackoffSchedule::new(s.stages.clone(), s.max_interval, s.timeout).is_ok());
        }
    }

    #[test]
    fn test_image_default_stages() {
        let s = BackoffSchedule::image_default();
        assert_eq!(s.interval_at(Duration::ZERO), Duration::from_secs(3));
        assert_eq!(s.interval_at(Duration::from_secs(29)), Duration::from_secs(3));
        assert_eq!(s.interval_at(Duration::from_secs(30)), Duration::from_secs(5));
        assert_eq!(s.interval_at(Duration::from_secs(500)), Duration::from_secs(10));
        assert_eq!(s.min_interval(), Duration::from_secs(3));
    }

    #[test]
    fn test_video_default_stages() {
        let s = BackoffSchedule::video_default();
        assert_eq!(s.interval_at(Duration::from_secs(59)), Duration::from_secs(10));
        assert_eq!(s.interval_at(Duration::from_secs(60)), Duration::from_secs(15));
        assert_eq!(s.interval_at(Duration::from_secs(180)), Duration::from_secs(30));
        assert_eq!(s.timeout(), Duration::from_secs(900));
    }

    #[test]
    fn test_rejects_decreasing_intervals() {
        let result = BackoffSchedule::new(
            vec![PollStage::secs(10, 5), PollStage::secs(20, 2)],
            Duration::from_secs(10),
            Duration::from_secs(60),
        );
        assert!(matches!(result, Err(DispatchError::Config(_))));
    }

    #[test]
    fn test_rejects_interval_above_cap() {
        let result = BackoffSchedule::new(
            vec![PollStage::secs(10, 20)],
            Duration::from_secs(10),
            Duration::from_secs(60),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_zero_interval() {
        let result = BackoffSchedule::new(
            vec![PollStage::secs(10, 0)],
            Duration::from_secs(10),
            Duration::from_secs(60),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_intervals_stop_at_timeout() {
        let s = BackoffSchedule::new(vec![], Duration::from_secs(7), Duration::from_secs(20)).unwrap();
        let waits: Vec<u64> = s.intervals().map(|d| d.as_secs()).collect();
        assert_eq!(waits, vec![7, 7]);
    }

    #[test]
    fn test_custom_timeout_keeps_stages() {
        let s = BackoffSchedule::image_default()
            .with_timeout(Duration::from_secs(60))
            .unwrap();
        assert_well_formed(&s);
        assert_eq!(s.interval_at(Duration::ZERO), Duration::from_secs(3));
    }
}
