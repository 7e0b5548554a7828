use crate::config::Config;
use crate::model::TriggerEvent;
use crate::pipeline;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

pub const SCHEDULER_SOURCE: &str = "scheduler";

/// Outcome of the most recent run
#[derive(Debug, Clone, Serialize)]
pub struct LastRun {
    pub trigger_id: uuid::Uuid,
    pub source: String,
    pub success: bool,
    pub devices: usize,
    pub measurements: usize,
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

/// Shared view of the last run, read by the HTTP status endpoint
#[derive(Debug, Clone, Default)]
pub struct RunStatus {
    last: Arc<RwLock<Option<LastRun>>>,
}

impl RunStatus {
    pub async fn last(&self) -> Option<LastRun> {
        self.last.read().await.clone()
    }

    async fn record(&self, run: LastRun) {
        *self.last.write().await = Some(run);
    }
}

/// Runs the pipeline once per trigger, from the interval ticker or the channel.
///
/// Runs never overlap: each one is awaited before the next trigger is taken.
pub async fn run_scheduler(
    config: Arc<Config>,
    mut rx: mpsc::Receiver<TriggerEvent>,
    status: RunStatus,
    period: Duration,
) {
    info!("Starting scheduler with period={:?}", period);

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let trigger = tokio::select! {
            _ = ticker.tick() => TriggerEvent::new(SCHEDULER_SOURCE),

            trigger = rx.recv() => match trigger {
                Some(t) => t,
                None => {
                    info!("Trigger channel closed");
                    break;
                }
            },
        };

        execute(&config, &trigger, &status).await;
    }

    info!("Scheduler stopped");
}

/// Runs one trigger and records its outcome.
pub async fn execute(config: &Config, trigger: &TriggerEvent, status: &RunStatus) {
    let last = match pipeline::run(config, trigger).await {
        Ok(report) => {
            info!("Run {} acknowledged for source {}", report.run_id, report.source);
            LastRun {
                trigger_id: trigger.id,
                source: report.source,
                success: true,
                devices: report.devices,
                measurements: report.measurements,
                error: None,
                finished_at: report.finished_at,
            }
        }
        Err(e) => {
            error!("Run {} from {} failed: {}", trigger.id, trigger.source, e);
            LastRun {
                trigger_id: trigger.id,
                source: trigger.source.clone(),
                success: false,
                devices: 0,
                measurements: 0,
                error: Some(e.to_string()),
                finished_at: Utc::now(),
            }
        }
    };

    status.record(last).await;
}
