//! Background monitoring loop.

use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::orchestrator::TaskOrchestrator;

impl TaskOrchestrator {
    /// Spawns the periodic monitor loop.
    ///
    /// Every `monitor_interval_secs` the loop runs one sweep: progress checks
    /// for stalled tasks, blocker backfill for blocked tasks without one, and
    /// a stale-agent purge. The loop never exits on its own; abort the handle
    /// to stop it. Individual sweep problems are logged inside the sweep and
    /// never tear the loop down.
    #[must_use]
    pub fn spawn_monitor(&self) -> JoinHandle<()> {
        let orchestrator = self.clone();
        let interval = Duration::from_secs(orchestrator.config.monitor_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick is immediate; skip it so a freshly started monitor
            // does not sweep before anything has happened.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let report = orchestrator.run_sweep(Utc::now()).await;
                debug!(
                    progress_checks = report.progress_checks.len(),
                    auto_blockers = report.auto_blockers,
                    purged = report.purged_agents.len(),
                    "monitor sweep finished"
                );
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use quorum_agents::InMemoryBus;
    use quorum_core::OrchestratorConfig;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn monitor_ticks_on_schedule() {
        let config = OrchestratorConfig {
            monitor_interval_secs: 1,
            ..OrchestratorConfig::default()
        };
        let orchestrator = TaskOrchestrator::new(Arc::new(InMemoryBus::new()), config);

        let handle = orchestrator.spawn_monitor();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!handle.is_finished());
        handle.abort();
    }
}
