//! Cron trigger
//!
//! Sleeps until the next fire time of a cron rule, evaluated in a fixed
//! timezone, and hands each fire to a [`ScheduledJob`] on its own task. A
//! tick that fires while the previous one is still running reaches the
//! job's run lock and is dropped there; the trigger itself never queues.
//! Fired tasks belong to the loop, which waits for them before it exits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use super::error::{SchedulerError, SchedulerResult};

// ============================================================================
// Rule parsing
// ============================================================================

/// Accept classic 5-field rules by prepending a zero seconds field
pub fn normalize_cron(expression: &str) -> String {
    let expression = expression.trim();
    if expression.split_whitespace().count() == 5 {
        format!("0 {expression}")
    } else {
        expression.to_string()
    }
}

/// Parse a 5- or 6-field cron rule
pub fn parse_cron(expression: &str) -> SchedulerResult<Schedule> {
    let normalized = normalize_cron(expression);
    Schedule::from_str(&normalized)
        .map_err(|e| SchedulerError::invalid_cron(expression, e.to_string()))
}

/// Parse an IANA timezone name
pub fn parse_timezone(name: &str) -> SchedulerResult<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| SchedulerError::invalid_timezone(name))
}

// ============================================================================
// Trigger Configuration
// ============================================================================

/// Configuration for a cron trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Cron rule (e.g. "0 */2 * * * *" or "50 5,8,11,14,17,20,23 * * *")
    pub cron: String,

    /// Timezone the rule is evaluated in (e.g. "Asia/Seoul")
    pub timezone: String,

    /// Fire once as soon as the trigger starts
    pub run_on_startup: bool,
}

impl TriggerConfig {
    pub fn new(cron: impl Into<String>, timezone: impl Into<String>) -> Self {
        Self {
            cron: cron.into(),
            timezone: timezone.into(),
            run_on_startup: false,
        }
    }

    pub fn with_run_on_startup(mut self, value: bool) -> Self {
        self.run_on_startup = value;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.cron.trim().is_empty() {
            return Err(SchedulerError::trigger_config("cron", "Cron rule cannot be empty"));
        }
        parse_cron(&self.cron)?;
        parse_timezone(&self.timezone)?;
        Ok(())
    }
}

// ============================================================================
// Jobs
// ============================================================================

/// Work driven by a trigger
#[async_trait]
pub trait ScheduledJob: Send + Sync + 'static {
    /// Name used in log lines
    fn name(&self) -> &'static str;

    /// Handle one fire; must not fail
    async fn on_trigger(&self);
}

// ============================================================================
// Cron Trigger
// ============================================================================

pub struct CronTrigger {
    config: TriggerConfig,
    schedule: Schedule,
    tz: Tz,
}

impl CronTrigger {
    /// Create a new trigger
    pub fn new(config: TriggerConfig) -> SchedulerResult<Self> {
        config.validate()?;
        let schedule = parse_cron(&config.cron)?;
        let tz = parse_timezone(&config.timezone)?;

        Ok(Self {
            config,
            schedule,
            tz,
        })
    }

    pub fn config(&self) -> &TriggerConfig {
        &self.config
    }

    /// First fire time strictly after `after`
    pub fn next_fire_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule
            .after(&after.with_timezone(&self.tz))
            .next()
            .map(|t| t.with_timezone(&Utc))
    }

    /// The next `n` fire times in the trigger's timezone
    pub fn upcoming(&self, n: usize) -> Vec<DateTime<Tz>> {
        self.schedule
            .after(&Utc::now().with_timezone(&self.tz))
            .take(n)
            .collect()
    }

    /// Start the trigger loop on a background task
    pub fn spawn(self, job: Arc<dyn ScheduledJob>) -> TriggerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let name = job.name();
        let join = tokio::spawn(async move { self.run(job, stop_rx).await });
        TriggerHandle {
            name,
            stop_tx,
            join,
        }
    }

    /// Run until the stop signal flips to `true`
    pub async fn run(
        self,
        job: Arc<dyn ScheduledJob>,
        mut stop: watch::Receiver<bool>,
    ) -> SchedulerResult<()> {
        info!(
            job = job.name(),
            cron = %self.config.cron,
            timezone = %self.tz,
            "Trigger started"
        );

        let mut in_flight = JoinSet::new();
        if self.config.run_on_startup {
            Self::fire(&job, &mut in_flight);
        }

        let result = self.wait_and_fire(&job, &mut stop, &mut in_flight).await;

        if !in_flight.is_empty() {
            info!(job = job.name(), runs = in_flight.len(), "Waiting for in-flight runs");
        }
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                warn!(job = job.name(), error = %e, "Run task ended abnormally");
            }
        }

        info!(job = job.name(), "Trigger stopped");
        result
    }

    async fn wait_and_fire(
        &self,
        job: &Arc<dyn ScheduledJob>,
        stop: &mut watch::Receiver<bool>,
        in_flight: &mut JoinSet<()>,
    ) -> SchedulerResult<()> {
        let mut last_fire: Option<DateTime<Utc>> = None;
        loop {
            let now = Utc::now();
            let from = last_fire.map_or(now, |last| last.max(now));
            let Some(next) = self.next_fire_after(from) else {
                warn!(job = job.name(), cron = %self.config.cron, "Cron rule has no further fire times");
                return Err(SchedulerError::NoUpcomingFire {
                    expression: self.config.cron.clone(),
                });
            };

            let wait = (next - now).to_std().unwrap_or_default();
            debug!(job = job.name(), next = %next.with_timezone(&self.tz), "Waiting for next fire");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    last_fire = Some(next);
                    Self::fire(job, in_flight);
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        warn!(job = job.name(), error = %e, "Run task ended abnormally");
                    }
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn fire(job: &Arc<dyn ScheduledJob>, in_flight: &mut JoinSet<()>) {
        let job = Arc::clone(job);
        debug!(job = job.name(), "Trigger fired");
        in_flight.spawn(async move { job.on_trigger().await });
    }
}

/// Handle to a spawned trigger loop
pub struct TriggerHandle {
    name: &'static str,
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<SchedulerResult<()>>,
}

impl TriggerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the loop to stop and wait for it and every run it started
    pub async fn stop(self) -> SchedulerResult<()> {
        let _ = self.stop_tx.send(true);
        self.join.await?
    }
}
