//! Recurring Timers
//!
//! A [`Ticker`] owns one tokio task that posts the same event at a fixed
//! period. Dropping or stopping the ticker aborts the task, so no tick can
//! arrive after the owning session ends.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::session::{EventSink, SessionEvent};

pub struct Ticker {
    name: &'static str,
    task: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Start posting `event()` every `period`, first tick one period from now
    pub fn spawn(
        runtime: &Handle,
        name: &'static str,
        period: Duration,
        sink: Arc<dyn EventSink>,
        event: fn() -> SessionEvent,
    ) -> Self {
        let task = runtime.spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            // A late tick pushes the schedule back instead of bursting to catch up
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                log::debug!("{name} tick");
                if !sink.send(event()) {
                    log::info!("{name} timer: event loop gone, stopping");
                    break;
                }
            }
        });
        log::info!("{name} timer started ({period:?})");
        Self { name, task: Some(task) }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            log::info!("{} timer stopped", self.name);
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}
