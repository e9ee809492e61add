//! Notification sinks
//!
//! The scheduler reports a backup cycle that failed everywhere through a
//! [`Notifier`]. Delivery is best-effort: callers log the error and move on.

use std::process::{Command, Stdio};

use crate::error::{BackupError, BackupResult};

/// Title used for backup failure notifications
pub const BACKUP_NOTIFICATION_TITLE: &str = "ToDoLite: Backup";

/// Message used when a scheduled backup could not be written anywhere
pub const BACKUP_FAILED_MESSAGE: &str =
    "Backup failed: no destination could be written. Check the backup settings.";

/// Something that can show a short message to the user
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, message: &str) -> BackupResult<()>;
}

/// Writes notifications to the log only
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, message: &str) -> BackupResult<()> {
        tracing::warn!(title, "{message}");
        Ok(())
    }
}

/// Runs an external program with the title and message as the last two arguments
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    program: String,
    args: Vec<String>,
}

impl CommandNotifier {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `notify-send`, if it is on the PATH
    pub fn desktop() -> Option<Self> {
        let program = which::which("notify-send").ok()?;
        Some(Self::new(
            program.to_string_lossy(),
            vec!["--app-name=ToDoLite".to_string()],
        ))
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Notifier for CommandNotifier {
    fn notify(&self, title: &str, message: &str) -> BackupResult<()> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(title)
            .arg(message)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| {
                BackupError::Notification(format!("failed to run {}: {}", self.program, e))
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(BackupError::Notification(format!(
                "{} exited with {}",
                self.program, status
            )))
        }
    }
}

/// The best notifier available on this machine
pub fn default_notifier() -> Box<dyn Notifier> {
    match CommandNotifier::desktop() {
        Some(desktop) => Box::new(desktop),
        None => Box::new(LogNotifier),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_notifier_never_fails() {
        assert!(LogNotifier.notify(BACKUP_NOTIFICATION_TITLE, BACKUP_FAILED_MESSAGE).is_ok());
    }

    #[test]
    fn test_missing_program_is_notification_error() {
        let notifier = CommandNotifier::new("todolite-no-such-notifier", Vec::new());
        let err = notifier.notify("t", "m").unwrap_err();
        assert!(matches!(err, BackupError::Notification(_)));
    }

    #[test]
    fn test_desktop_notifier_resolves_full_path() {
        if let Some(desktop) = CommandNotifier::desktop() {
            assert!(std::path::Path::new(desktop.program()).is_absolute());
        }
        assert!(which::which("todolite-no-such-notifier").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_exit_status() {
        assert!(CommandNotifier::new("true", Vec::new()).notify("t", "m").is_ok());
        assert!(CommandNotifier::new("false", Vec::new()).notify("t", "m").is_err());
    }
}
