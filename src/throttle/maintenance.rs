//! Background maintenance: the expired-entry sweep and policy reloads.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::limiter::Throttle;
use super::policy::{PolicyRegistry, PolicyTable};

/// Owns the maintenance tasks and stops them on shutdown.
pub struct MaintenanceHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl MaintenanceHandle {
    /// Create a handle with no tasks yet.
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shutdown,
            tasks: Vec::new(),
        }
    }

    /// Start sweeping expired entries from `throttle` every `interval`.
    pub fn spawn_sweeper(&mut self, throttle: Arc<Throttle>, interval: Duration) {
        let mut shutdown = self.shutdown.subscribe();

        info!(interval = ?interval, "Starting throttle sweeper");
        self.tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = throttle.sweep();
                        debug!(removed, remaining = throttle.len(), "Swept expired throttle entries");
                    }
                    _ = shutdown.changed() => break,
                }
            }

            debug!("Throttle sweeper stopped");
        }));
    }

    /// Re-read the policy file every `interval` and swap it into `registry`.
    ///
    /// The reloaded table is layered the same way as at startup: built-in
    /// policies, then the file, then `overrides`.
    pub fn spawn_policy_reloader(
        &mut self,
        registry: Arc<PolicyRegistry>,
        path: PathBuf,
        overrides: PolicyTable,
        interval: Duration,
    ) {
        let mut shutdown = self.shutdown.subscribe();

        info!(path = %path.display(), interval = ?interval, "Starting policy reloader");
        self.tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match PolicyTable::layered(Some(&path), &overrides) {
                            Ok(table) => {
                                if let Err(e) = registry.replace(table) {
                                    warn!(error = %e, "Keeping previous throttle policies");
                                }
                            }
                            Err(e) => warn!(error = %e, "Failed to reload throttle policies"),
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }

            debug!("Policy reloader stopped");
        }));
    }

    /// Number of running tasks.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Signal every task to stop and wait for them.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Maintenance task ended abnormally");
            }
        }
    }
}

impl Default for MaintenanceHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::throttle::{BucketKey, Policy};

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_expired_entries() {
        let throttle = Arc::new(Throttle::new());
        let policy = Policy::from_millis(5, 60_000).unwrap();
        for i in 0..100 {
            throttle.admit(&BucketKey::new("lookup", &format!("client-{}", i)), policy);
        }

        let mut maintenance = MaintenanceHandle::new();
        maintenance.spawn_sweeper(Arc::clone(&throttle), Duration::from_secs(300));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(throttle.len(), 100);

        tokio::time::sleep(Duration::from_secs(301)).await;
        assert!(throttle.is_empty());

        maintenance.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_tasks() {
        let mut maintenance = MaintenanceHandle::new();
        maintenance.spawn_sweeper(Arc::new(Throttle::new()), Duration::from_secs(60));
        assert_eq!(maintenance.task_count(), 1);

        tokio_test::assert_ok!(
            tokio::time::timeout(Duration::from_secs(1), maintenance.shutdown()).await
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reloader_keeps_table_when_file_missing() {
        let registry = Arc::new(PolicyRegistry::new(PolicyTable::builtin()));
        registry.require(crate::throttle::policy::LOOKUP).unwrap();

        let mut maintenance = MaintenanceHandle::new();
        maintenance.spawn_policy_reloader(
            Arc::clone(&registry),
            PathBuf::from("/nonexistent/quillgate-policies.yaml"),
            PolicyTable::new(),
            Duration::from_secs(10),
        );

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(registry.snapshot(), PolicyTable::builtin());

        maintenance.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reloader_picks_up_rewritten_file() {
        let path = std::env::temp_dir().join(format!("quillgate-{}.yaml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "lookup:\n  max_requests: 50\n  window_secs: 60\n").unwrap();

        let registry = Arc::new(PolicyRegistry::new(
            PolicyTable::layered(Some(&path), &PolicyTable::new()).unwrap(),
        ));
        registry.require(crate::throttle::policy::LOOKUP).unwrap();

        let mut maintenance = MaintenanceHandle::new();
        maintenance.spawn_policy_reloader(
            Arc::clone(&registry),
            path.clone(),
            PolicyTable::new(),
            Duration::from_secs(10),
        );

        std::fs::write(&path, "lookup:\n  max_requests: 4\n  window_secs: 30\n").unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(registry.get(crate::throttle::policy::LOOKUP).unwrap().max_requests(), 50);

        tokio::time::sleep(Duration::from_secs(6)).await;
        let lookup = registry.get(crate::throttle::policy::LOOKUP).unwrap();
        assert_eq!(lookup.max_requests(), 4);
        assert_eq!(lookup.window(), Duration::from_secs(30));

        maintenance.shutdown().await;
        std::fs::remove_file(&path).unwrap();
    }
}
