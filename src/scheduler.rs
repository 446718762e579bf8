//! Runs the journal's four periodic background jobs: flushing a dirty log,
//! writing a recovery checkpoint, sweeping retention, and persisting the
//! committed-read-offset sidecar. Each job is an independent
//! `tokio::time::interval` loop; a failure in one is logged and swallowed
//! rather than propagated, so a transient error in retention never stops
//! the flusher (or vice versa).
use crate::clock::Clock;
use crate::config::JournalConfig;
use crate::errors::SchedulerError;
use crate::metrics::JournalMetrics;
use crate::storage::commit_tracker::CommitTracker;
use crate::storage::log::Log;
use crate::storage::retention::RetentionManager;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info};

pub struct Scheduler {
    handles: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl Scheduler {
    /// Spawns the four periodic jobs. `log` and `commit_tracker` are
    /// shared with the journal façade so the background jobs and
    /// foreground reads/writes operate on the same state.
    pub fn start(
        log: Arc<Mutex<Log>>,
        commit_tracker: Arc<CommitTracker>,
        metrics: Arc<JournalMetrics>,
        config: JournalConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));

        let flush_handle = Self::spawn_job(
            "flush",
            config.flush_check_interval,
            shutdown.clone(),
            clock.clone(),
            {
                let log = log.clone();
                let metrics = metrics.clone();
                let clock = clock.clone();
                move || {
                    let log = log.clone();
                    let metrics = metrics.clone();
                    let clock = clock.clone();
                    async move {
                        let mut log = log.lock().map_err(|_| "log mutex poisoned")?;
                        if log.unflushed_messages() > 0 && log.should_force_flush() {
                            log.flush()
                                .map_err(SchedulerError::from)
                                .map_err(|e| e.to_string())?;
                            metrics
                                .recovery_point
                                .store(log.recovery_point() as i64, Ordering::Relaxed);
                            metrics
                                .unflushed_messages
                                .store(log.unflushed_messages(), Ordering::Relaxed);
                            metrics
                                .last_flush_time_millis
                                .store(clock.now_millis(), Ordering::Relaxed);
                        }
                        Ok(())
                    }
                }
            },
        );

        let checkpoint_handle = Self::spawn_job(
            "checkpoint",
            config.flush_checkpoint_interval,
            shutdown.clone(),
            clock.clone(),
            {
                let log = log.clone();
                move || {
                    let log = log.clone();
                    async move {
                        let log = log.lock().map_err(|_| "log mutex poisoned")?;
                        log.write_recovery_checkpoint()
                            .map_err(SchedulerError::from)
                            .map_err(|e| e.to_string())?;
                        Ok(())
                    }
                }
            },
        );

        let retention_handle = Self::spawn_job(
            "retention",
            config.retention_check_interval,
            shutdown.clone(),
            clock.clone(),
            {
                let log = log.clone();
                let commit_tracker = commit_tracker.clone();
                let config = config.clone();
                let clock = clock.clone();
                move || {
                    let log = log.clone();
                    let commit_tracker = commit_tracker.clone();
                    let config = config.clone();
                    let clock = clock.clone();
                    async move {
                        let mut manager = RetentionManager::new(clock);
                        let mut log = log.lock().map_err(|_| "log mutex poisoned")?;
                        manager
                            .sweep(
                                log.segments_mut(),
                                &config,
                                commit_tracker.committed_offset(),
                            )
                            .map_err(SchedulerError::from)
                            .map_err(|e| e.to_string())?;
                        Ok(())
                    }
                }
            },
        );

        let commit_persist_handle = Self::spawn_job(
            "commit-persist",
            config.commit_persist_interval,
            shutdown.clone(),
            clock.clone(),
            {
                let commit_tracker = commit_tracker.clone();
                move || {
                    let commit_tracker = commit_tracker.clone();
                    async move { commit_tracker.persist().map_err(|e| e.to_string()) }
                }
            },
        );

        Scheduler {
            handles: vec![
                flush_handle,
                checkpoint_handle,
                retention_handle,
                commit_persist_handle,
            ],
            shutdown,
        }
    }

    /// Signals every job to stop after its current tick and waits for them
    /// to finish.
    pub async fn shutdown(self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for handle in self.handles {
            let _ = handle.await;
        }
    }

    fn spawn_job<F, Fut>(
        name: &'static str,
        interval: std::time::Duration,
        shutdown: Arc<AtomicBool>,
        _clock: Arc<dyn Clock>,
        mut job: F,
    ) -> JoinHandle<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<(), String>> + Send,
    {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if shutdown.load(Ordering::SeqCst) {
                    info!(job = name, "scheduler job shutting down");
                    break;
                }
                if let Err(err) = job().await {
                    error!(job = name, error = %err, "scheduled job failed, will retry next tick");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn scheduler_starts_and_shuts_down_cleanly() {
        let dir = TempDir::new().unwrap();
        let mut config = JournalConfig::default();
        config.journal_directory = dir.path().to_path_buf();
        config.flush_check_interval = Duration::from_millis(10);
        config.flush_checkpoint_interval = Duration::from_millis(10);
        config.retention_check_interval = Duration::from_millis(10);
        config.commit_persist_interval = Duration::from_millis(10);

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let log = Arc::new(Mutex::new(Log::new(config.clone(), clock.clone()).unwrap()));
        let commit_tracker = Arc::new(
            CommitTracker::new(dir.path().join("commit")).unwrap(),
        );
        let metrics = Arc::new(JournalMetrics::new());

        let scheduler = Scheduler::start(log, commit_tracker, metrics, config, clock);
        tokio::time::sleep(Duration::from_millis(50)).await;
        scheduler.shutdown().await;

        assert!(dir.path().join("recovery-point-offset-checkpoint").exists());
    }
}
