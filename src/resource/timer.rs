//! Timer source - periodic ticks pushed into a Source

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace};

use super::TaskResource;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::stream::Source;

/// The marker emitted on every timer period
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tick;

/// How a timer reacts when it falls behind schedule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReschedulePolicy {
    /// Fixed rate: missed ticks fire back-to-back to catch up
    #[default]
    Hard,
    /// Best effort: missed ticks are skipped, the schedule is kept
    Soft,
    /// The next tick is one interval after the late one; drift accumulates
    Drift,
}

impl From<ReschedulePolicy> for MissedTickBehavior {
    fn from(policy: ReschedulePolicy) -> Self {
        match policy {
            ReschedulePolicy::Hard => MissedTickBehavior::Burst,
            ReschedulePolicy::Soft => MissedTickBehavior::Skip,
            ReschedulePolicy::Drift => MissedTickBehavior::Delay,
        }
    }
}

/// Timer settings as they appear in configuration files
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimerConfig {
    /// Period in milliseconds
    pub interval_ms: u64,
    #[serde(default)]
    pub policy: ReschedulePolicy,
}

impl TimerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Context {
    /// A source that receives [`Tick`] every `interval`, first one interval
    /// from now. Finishing (or dropping) the source stops the timer.
    pub fn timer(
        &self,
        label: &str,
        interval: Duration,
        policy: ReschedulePolicy,
    ) -> Result<Source<Tick>> {
        if interval.is_zero() {
            return Err(Error::Config(format!("timer [{}] needs a non-zero interval", label)));
        }

        let source = self.source(label);
        let weak = source.downgrade();
        // Anchor the schedule now, not when the task first runs.
        let start = Instant::now() + interval;
        debug!("[{}] Timer every {:?} ({:?})", source.label(), interval, policy);

        let task = self.spawn(async move {
            let mut ticker = time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(policy.into());
            loop {
                ticker.tick().await;
                let Some(source) = weak.upgrade() else { break };
                trace!("[{}] Tick", source.label());
                if !source.emit(Tick) {
                    break;
                }
            }
        });

        self.bind(
            Arc::new(TaskResource::with_task("timer", task.abort_handle())),
            &source,
        );
        Ok(source)
    }

    /// [`Context::timer`] from configuration
    pub fn timer_from_config(&self, label: &str, config: &TimerConfig) -> Result<Source<Tick>> {
        self.timer(label, config.interval(), config.policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::runtime::Handle;

    #[tokio::test(start_paused = true)]
    async fn test_ticks_at_interval() {
        let ctx = Context::new("ctx").unwrap();
        let start = Instant::now();
        let ticks = ctx
            .timer("tick", Duration::from_millis(100), ReschedulePolicy::Hard)
            .unwrap();
        let mut sub = ticks.subscribe();

        for n in 1..=5u32 {
            assert_eq!(sub.next().await.unwrap().unwrap(), Tick);
            let elapsed = start.elapsed();
            assert!(elapsed >= Duration::from_millis(100) * n);
            assert!(elapsed < Duration::from_millis(100) * n + Duration::from_millis(5));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_is_not_immediate() {
        let ctx = Context::new("ctx").unwrap();
        let ticks = ctx
            .timer("tick", Duration::from_secs(1), ReschedulePolicy::default())
            .unwrap();
        let mut sub = ticks.subscribe();

        let early = time::timeout(Duration::from_millis(900), sub.next()).await;
        assert!(early.is_err());
        assert!(sub.next().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_stops_timer() {
        let ctx = Context::new("ctx").unwrap();
        let ticks = ctx
            .timer("tick", Duration::from_millis(10), ReschedulePolicy::Soft)
            .unwrap();
        assert_eq!(ctx.child_count(), 1);
        let mut sub = ticks.subscribe();
        sub.next().await.unwrap().unwrap();

        ticks.finish();
        assert_eq!(ctx.child_count(), 0);
        assert!(sub.next().await.is_none());

        // The aborted ticking task is gone from the runtime
        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(Handle::current().metrics().num_alive_tasks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_source_stops_timer() {
        let ctx = Context::new("ctx").unwrap();
        let ticks = ctx
            .timer("tick", Duration::from_millis(10), ReschedulePolicy::Hard)
            .unwrap();
        assert_eq!(Handle::current().metrics().num_alive_tasks(), 1);

        drop(ticks);
        assert_eq!(ctx.child_count(), 0);
        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(Handle::current().metrics().num_alive_tasks(), 0);
    }

    #[tokio::test]
    async fn test_zero_interval_is_config_error() {
        let ctx = Context::new("ctx").unwrap();
        let result = ctx.timer("bad", Duration::ZERO, ReschedulePolicy::Drift);
        assert!(matches!(result, Err(Error::Config(_))));
        assert_eq!(ctx.child_count(), 0);
    }

    #[test]
    fn test_config_rejects_unknown_fields() {
        let config: TimerConfig =
            serde_json::from_str(r#"{"interval_ms": 250, "policy": "drift"}"#).unwrap();
        assert_eq!(config.interval(), Duration::from_millis(250));
        assert_eq!(config.policy, ReschedulePolicy::Drift);

        assert!(serde_json::from_str::<TimerConfig>(r#"{"interval_ms": 1, "jitter": 2}"#).is_err());
    }
}
