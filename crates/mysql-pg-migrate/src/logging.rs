//! Migration log handle.
//!
//! The handle owns an append-only log file written through a non-blocking
//! worker, plus an optional console layer. It does not install a global
//! subscriber: callers run work under [`LogHandle::dispatch`].
//!
//! Lifecycle: [`LogHandle::open`], then [`LogHandle::dispatch`] for as long
//! as events should be recorded, then [`LogHandle::close`] (or drop) to flush.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::Dispatch;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::error::{MigrateError, Result};

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "migration.log";

/// Console output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleFormat {
    Text,
    Json,
}

impl ConsoleFormat {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(ConsoleFormat::Text),
            "json" => Ok(ConsoleFormat::Json),
            other => Err(MigrateError::Config(format!(
                "unknown log format '{}' (expected text or json)",
                other
            ))),
        }
    }
}

/// Options for [`LogHandle::open`].
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Filter directive, e.g. `info` or `mysql_pg_migrate=debug`.
    pub level: String,
    /// Mirror events to stderr when set.
    pub console: Option<ConsoleFormat>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: Some(ConsoleFormat::Text),
        }
    }
}

/// Owner of the migration log.
pub struct LogHandle {
    dispatch: Dispatch,
    guard: Option<WorkerGuard>,
    path: Option<PathBuf>,
}

impl LogHandle {
    /// Open (or append to) the log file at `path`.
    pub fn open(path: impl AsRef<Path>, options: &LogOptions) -> Result<Self> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| MigrateError::Config(format!("invalid log file path: {}", path.display())))?;
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let filter = EnvFilter::try_new(&options.level)
            .map_err(|e| MigrateError::Config(format!("invalid log level '{}': {}", options.level, e)))?;

        let appender = RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(file_name)
            .build(&dir)
            .map_err(|e| MigrateError::Config(format!("opening log file {}: {}", path.display(), e)))?;
        let (writer, guard) = tracing_appender::non_blocking(appender);

        let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::with_capacity(2);
        layers.push(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false)
                .boxed(),
        );
        match options.console {
            Some(ConsoleFormat::Text) => layers.push(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .boxed(),
            ),
            Some(ConsoleFormat::Json) => layers.push(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .boxed(),
            ),
            None => {}
        }

        let subscriber = Registry::default().with(layers).with(filter);

        Ok(Self {
            dispatch: Dispatch::new(subscriber),
            guard: Some(guard),
            path: Some(path.to_path_buf()),
        })
    }

    /// A handle that discards every event.
    pub fn disabled() -> Self {
        Self {
            dispatch: Dispatch::none(),
            guard: None,
            path: None,
        }
    }

    /// Subscriber to run migration work under.
    pub fn dispatch(&self) -> Dispatch {
        self.dispatch.clone()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Flush buffered lines and stop the writer.
    pub fn close(mut self) {
        self.guard.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_reach_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("migration.log");
        let options = LogOptions {
            level: "info".to_string(),
            console: None,
        };

        let handle = LogHandle::open(&path, &options).unwrap();
        tracing::dispatcher::with_default(&handle.dispatch(), || {
            tracing::info!("table orders created");
            tracing::debug!("filtered out");
        });
        handle.close();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("INFO"));
        assert!(contents.contains("table orders created"));
        assert!(!contents.contains("filtered out"));
    }

    #[test]
    fn test_log_file_is_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("migration.log");
        let options = LogOptions {
            level: "info".to_string(),
            console: None,
        };

        for message in ["first run", "second run"] {
            let handle = LogHandle::open(&path, &options).unwrap();
            tracing::dispatcher::with_default(&handle.dispatch(), || tracing::warn!("{}", message));
            handle.close();
        }

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("first run"));
        assert!(contents.contains("second run"));
    }

    #[test]
    fn test_invalid_level_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let options = LogOptions {
            level: "mysql_pg_migrate=loud".to_string(),
            console: None,
        };
        assert!(LogHandle::open(dir.path().join("m.log"), &options).is_err());
    }

    #[test]
    fn test_console_format_parse() {
        assert_eq!(ConsoleFormat::parse("JSON").unwrap(), ConsoleFormat::Json);
        assert_eq!(ConsoleFormat::parse("text").unwrap(), ConsoleFormat::Text);
        assert!(ConsoleFormat::parse("xml").is_err());
    }
}
