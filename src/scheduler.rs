//! Periodic backup scheduler
//!
//! Runs one worker thread that reloads settings, writes a backup to every
//! destination when one is due and then sleeps on a stop channel. The sleep
//! is capped at a minute so edited settings take effect without a restart,
//! and `stop()` interrupts it immediately.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Local};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use serde::Serialize;

use crate::backup::BackupManager;
use crate::error::{BackupError, BackupResult};
use crate::notify::{Notifier, BACKUP_FAILED_MESSAGE, BACKUP_NOTIFICATION_TITLE};

/// Longest single wait between two settings reloads
const MAX_WAIT: Duration = Duration::from_secs(60);

/// Wait before re-checking while backups are disabled
const DISABLED_RECHECK: Duration = Duration::from_secs(60);

/// How long `stop()` waits for the worker to exit
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Snapshot of the scheduler state
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub enabled: bool,
    pub interval_hours: f64,
    pub next_backup_time: Option<DateTime<Local>>,
}

struct Worker {
    stop_tx: Sender<()>,
    done_rx: Receiver<()>,
    handle: JoinHandle<()>,
}

/// Background backup scheduler
pub struct Scheduler {
    manager: Arc<BackupManager>,
    notifier: Arc<dyn Notifier>,
    next_backup: Arc<Mutex<Option<DateTime<Local>>>>,
    worker: Mutex<Option<Worker>>,
}

impl Scheduler {
    pub fn new(manager: Arc<BackupManager>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            manager,
            notifier,
            next_backup: Arc::new(Mutex::new(None)),
            worker: Mutex::new(None),
        }
    }

    /// Start the worker thread; does nothing if it is already running
    pub fn start(&self) -> BackupResult<()> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            tracing::debug!("scheduler already running");
            return Ok(());
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<()>(1);
        let context = WorkerContext {
            manager: Arc::clone(&self.manager),
            notifier: Arc::clone(&self.notifier),
            next_backup: Arc::clone(&self.next_backup),
        };

        let handle = thread::Builder::new()
            .name("todolite-backup-scheduler".to_owned())
            .spawn(move || {
                context.run(&stop_rx);
                let _ = done_tx.send(());
            })
            .map_err(|e| BackupError::Scheduler(format!("failed to spawn worker: {e}")))?;

        *worker = Some(Worker {
            stop_tx,
            done_rx,
            handle,
        });
        tracing::info!("backup scheduler started");
        Ok(())
    }

    /// Stop the worker thread; does nothing if it is not running
    ///
    /// Waits up to five seconds for the worker to exit. A worker that is still
    /// busy after that is left to finish on its own.
    pub fn stop(&self) {
        let Some(worker) = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return;
        };

        let _ = worker.stop_tx.try_send(());
        match worker.done_rx.recv_timeout(STOP_TIMEOUT) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    tracing::error!("backup scheduler worker panicked");
                }
                tracing::info!("backup scheduler stopped");
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!("backup scheduler did not stop within {:?}", STOP_TIMEOUT);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    pub fn status(&self) -> SchedulerStatus {
        let settings = self.manager.settings();
        SchedulerStatus {
            running: self.is_running(),
            enabled: settings.enabled,
            interval_hours: settings.interval_hours,
            next_backup_time: *self
                .next_backup
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Back up right now and push the next scheduled backup out by one interval
    pub fn force_backup(&self) -> Option<PathBuf> {
        let created = self.manager.create_backup();
        if created.is_some() {
            let next = Local::now() + interval_delta(self.manager.settings().interval());
            *self
                .next_backup
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(next);
        } else {
            tracing::warn!("forced backup did not produce an artifact");
        }
        created
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

struct WorkerContext {
    manager: Arc<BackupManager>,
    notifier: Arc<dyn Notifier>,
    next_backup: Arc<Mutex<Option<DateTime<Local>>>>,
}

impl WorkerContext {
    fn run(&self, stop_rx: &Receiver<()>) {
        loop {
            let wait = self.tick();
            match stop_rx.recv_timeout(wait) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    /// One pass of the loop; returns how long to wait before the next one
    fn tick(&self) -> Duration {
        let settings = self.manager.reload_settings();
        if !settings.enabled {
            return DISABLED_RECHECK;
        }

        let now = Local::now();
        let due = self
            .next_backup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map_or(true, |next| now >= next);

        if due {
            self.run_backup();
            let next = Local::now() + interval_delta(settings.interval());
            *self
                .next_backup
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(next);
            tracing::info!(next = %next.format("%Y-%m-%d %H:%M:%S"), "next backup scheduled");
        }

        let next = *self
            .next_backup
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let remaining = next
            .and_then(|next| (next - Local::now()).to_std().ok())
            .unwrap_or(Duration::ZERO);
        remaining.clamp(Duration::from_millis(10), MAX_WAIT)
    }

    fn run_backup(&self) {
        tracing::info!("running scheduled backup");
        if self.manager.create_backup_all().is_empty() {
            tracing::error!("scheduled backup failed");
            notify_in_background(Arc::clone(&self.notifier));
        }
    }
}

fn notify_in_background(notifier: Arc<dyn Notifier>) {
    let spawned = thread::Builder::new()
        .name("todolite-backup-notify".to_owned())
        .spawn(move || {
            if let Err(e) = notifier.notify(BACKUP_NOTIFICATION_TITLE, BACKUP_FAILED_MESSAGE) {
                tracing::error!(error = %e, "failed to deliver backup notification");
            }
        });

    if let Err(e) = spawned {
        tracing::error!(error = %e, "failed to spawn notification thread");
    }
}

fn interval_delta(interval: Duration) -> chrono::Duration {
    chrono::Duration::from_std(interval).unwrap_or_else(|_| chrono::Duration::hours(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::integrity::tests::create_task_db;
    use crate::config::BackupSettings;
    use crossbeam_channel::unbounded;
    use std::time::Instant;
    use tempfile::TempDir;

    struct RecordingNotifier {
        tx: Sender<(String, String)>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, title: &str, message: &str) -> BackupResult<()> {
            let _ = self.tx.send((title.to_string(), message.to_string()));
            Ok(())
        }
    }

    fn create_test_scheduler(
        settings: BackupSettings,
    ) -> (Scheduler, Receiver<(String, String)>, TempDir) {
        let temp = TempDir::new().unwrap();
        let live = temp.path().join("tasks.db");
        create_task_db(&live, 5);
        let settings = BackupSettings {
            destinations: vec![temp.path().join("backups").display().to_string()],
            ..settings
        };
        let manager = Arc::new(BackupManager::new(live, settings));
        let (tx, rx) = unbounded();
        let scheduler = Scheduler::new(manager, Arc::new(RecordingNotifier { tx }));
        (scheduler, rx, temp)
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[test]
    fn test_first_tick_backs_up_and_stop_is_prompt() {
        let settings = BackupSettings {
            interval_hours: 24.0,
            ..BackupSettings::default()
        };
        let (scheduler, _rx, temp) = create_test_scheduler(settings);

        scheduler.start().unwrap();
        assert!(scheduler.is_running());
        assert!(wait_for(|| scheduler.status().next_backup_time.is_some()));
        assert_eq!(scheduler.manager.list_backups().len(), 1);
        assert!(temp.path().join("backups").is_dir());

        let started = Instant::now();
        scheduler.stop();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!scheduler.is_running());
    }

    #[test]
    fn test_start_and_stop_are_idempotent() {
        let (scheduler, _rx, _temp) = create_test_scheduler(BackupSettings::default());

        scheduler.stop();
        scheduler.start().unwrap();
        scheduler.start().unwrap();
        assert!(wait_for(|| scheduler.status().next_backup_time.is_some()));
        scheduler.stop();
        scheduler.stop();

        assert!(!scheduler.status().running);
        assert_eq!(scheduler.manager.list_backups().len(), 1);
    }

    #[test]
    fn test_disabled_scheduler_does_nothing() {
        let settings = BackupSettings {
            enabled: false,
            ..BackupSettings::default()
        };
        let (scheduler, _rx, temp) = create_test_scheduler(settings);

        scheduler.start().unwrap();
        thread::sleep(Duration::from_millis(200));
        let status = scheduler.status();
        scheduler.stop();

        assert!(!status.enabled);
        assert!(status.next_backup_time.is_none());
        assert!(!temp.path().join("backups").exists());
    }

    #[test]
    fn test_total_failure_notifies() {
        let temp = TempDir::new().unwrap();
        let live = temp.path().join("tasks.db");
        create_task_db(&live, 5);
        let blocked = temp.path().join("not_a_dir");
        std::fs::write(&blocked, b"file").unwrap();
        let settings = BackupSettings {
            destinations: vec![blocked.display().to_string()],
            ..BackupSettings::default()
        };
        let manager = Arc::new(BackupManager::new(live, settings));
        let (tx, rx) = unbounded();
        let scheduler = Scheduler::new(manager, Arc::new(RecordingNotifier { tx }));

        scheduler.start().unwrap();
        let (title, message) = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        scheduler.stop();

        assert_eq!(title, BACKUP_NOTIFICATION_TITLE);
        assert_eq!(message, BACKUP_FAILED_MESSAGE);
    }

    #[test]
    fn test_force_backup_moves_next_time() {
        let settings = BackupSettings {
            interval_hours: 2.0,
            ..BackupSettings::default()
        };
        let (scheduler, _rx, _temp) = create_test_scheduler(settings);
        assert!(scheduler.status().next_backup_time.is_none());

        let before = Local::now();
        let created = scheduler.force_backup().unwrap();

        assert!(created.exists());
        let next = scheduler.status().next_backup_time.unwrap();
        assert!(next >= before + chrono::Duration::minutes(119));
        assert!(!scheduler.is_running());
    }
}
