use chrono::Utc;
use cron::Schedule;
use futures_util::future::BoxFuture;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::ConfigError;

/// Callback fired on every tick. Its outcome is the callback's own business.
pub type Task = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Fires a task on a cron schedule (seconds field first, e.g. `0 0 * * * *`).
///
/// Ticks are awaited in sequence, so one scheduler never overlaps itself.
pub struct CronScheduler {
    expression: String,
    schedule: Schedule,
    task: Task,
    active: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl CronScheduler {
    pub fn validate(expression: &str) -> bool {
        Schedule::from_str(expression).is_ok()
    }

    pub fn new(expression: &str, task: Task) -> Result<Self, ConfigError> {
        let schedule = Schedule::from_str(expression).map_err(|e| ConfigError::Invalid {
            key: "SCHEDULES",
            reason: format!("'{}': {}", expression, e),
        })?;
        let (active, _) = watch::channel(false);
        Ok(Self {
            expression: expression.to_string(),
            schedule,
            task,
            active,
            handle: None,
        })
    }

    pub fn is_active(&self) -> bool {
        *self.active.borrow()
    }

    /// Starts (or resumes) firing.
    pub fn start(&mut self) {
        self.active.send_replace(true);
        if self.handle.is_none() {
            let rx = self.active.subscribe();
            let schedule = self.schedule.clone();
            let task = Arc::clone(&self.task);
            self.handle = Some(tokio::spawn(tick_loop(self.expression.clone(), schedule, task, rx)));
        }
        info!("[Scheduler] Started '{}'", self.expression);
    }

    /// Pauses firing. A tick already running finishes.
    pub fn stop(&self) {
        self.active.send_replace(false);
        info!("[Scheduler] Stopped '{}'", self.expression);
    }

    /// Tears down the background task for good.
    pub fn destroy(mut self) {
        self.shutdown();
        info!("[Scheduler] Destroyed '{}'", self.expression);
    }

    fn shutdown(&mut self) {
        self.active.send_replace(false);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for CronScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn tick_loop(expression: String, schedule: Schedule, task: Task, mut active: watch::Receiver<bool>) {
    loop {
        loop {
            let is_active = *active.borrow_and_update();
            if is_active {
                break;
            }
            if active.changed().await.is_err() {
                return;
            }
        }

        let Some(next) = schedule.upcoming(Utc).next() else {
            info!("[Scheduler] '{}' has no upcoming ticks", expression);
            return;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        debug!("[Scheduler] '{}' next tick at {}", expression, next);

        let elapsed = tokio::select! {
            _ = tokio::time::sleep(wait) => true,
            changed = active.changed() => {
                if changed.is_err() {
                    return;
                }
                false
            }
        };

        let is_active = *active.borrow();
        if elapsed && is_active {
            task().await;
        }
    }
}
