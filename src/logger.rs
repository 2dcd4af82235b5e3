//! Append-only domain log for sync decisions.
//!
//! Operators observe the worker exclusively through this file and the queue
//! statuses, so every decision gets one timestamped, bracket-tagged line.
//! `tracing` still carries process-level diagnostics alongside.

use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogCategory {
    Startup,
    Info,
    Operation,
    Success,
    Delete,
    Error,
    ApiRequest,
    ApiResponse,
    Queue,
}

impl LogCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Startup => "STARTUP",
            LogCategory::Info => "INFO",
            LogCategory::Operation => "OPERATION",
            LogCategory::Success => "SUCCESS",
            LogCategory::Delete => "DELETE",
            LogCategory::Error => "ERROR",
            LogCategory::ApiRequest => "API_REQUEST",
            LogCategory::ApiResponse => "API_RESPONSE",
            LogCategory::Queue => "QUEUE",
        }
    }
}

#[derive(Debug)]
pub struct SyncLogger {
    path: PathBuf,
    verbose: bool,
    // Serializes appends from concurrent tasks within this process.
    write_lock: Mutex<()>,
}

impl SyncLogger {
    pub fn new(path: impl AsRef<Path>, verbose: bool) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path,
            verbose,
            write_lock: Mutex::new(()),
        })
    }

    pub fn log(&self, category: LogCategory, message: impl AsRef<str>) {
        let message = message.as_ref();
        let line = format!(
            "[{}] [{}] {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            category.as_str(),
            message
        );

        {
            let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
            let res = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .and_then(|mut f| f.write_all(line.as_bytes()));
            if let Err(err) = res {
                error!(?err, path = %self.path.display(), "failed to append to sync log");
            }
        }

        if self.verbose {
            print!("{line}");
        }
        match category {
            LogCategory::Error => error!("{message}"),
            _ => info!(category = category.as_str(), "{message}"),
        }
    }

    pub fn operation(&self, action: &str, booking_id: i64, details: &str) {
        self.log(
            LogCategory::Operation,
            format!("Operation: {action} | Booking ID: {booking_id} | {details}"),
        );
    }

    pub fn success(&self, message: impl AsRef<str>) {
        self.log(LogCategory::Success, message);
    }

    pub fn error(&self, context: &str, message: impl AsRef<str>) {
        self.log(
            LogCategory::Error,
            format!("{context}: {}", message.as_ref()),
        );
    }

    pub fn api_request(&self, method: &str, url: &str, body: Option<&str>) {
        let mut message = format!("API Request: {method} {url}");
        if let Some(body) = body {
            message.push_str(&format!("\n  Request Body: {body}"));
        }
        self.log(LogCategory::ApiRequest, message);
    }

    pub fn api_response(&self, status: u16, body: &str) {
        self.log(
            LogCategory::ApiResponse,
            format!("API Response: Status {status}\n  Response Body: {body}"),
        );
    }

    pub fn deletion(&self, booking_id: i64, event_id: &str, outcome: &str) {
        self.log(
            LogCategory::Delete,
            format!("Booking ID: {booking_id} | Event ID: {event_id} | {outcome}"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_bracket_tagged_lines() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("logs/worker.log");
        let logger = SyncLogger::new(&path, false).unwrap();

        logger.log(LogCategory::Startup, "worker starting");
        logger.operation("CREATE", 42, "client_name: Alice");
        logger.error("SYNC_EXCEPTION", "provider unreachable");

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("[STARTUP] worker starting"));
        assert!(lines[1].contains("[OPERATION] Operation: CREATE | Booking ID: 42"));
        assert!(lines[2].contains("[ERROR] SYNC_EXCEPTION: provider unreachable"));
    }

    #[test]
    fn appends_across_instances() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("worker.log");

        SyncLogger::new(&path, false)
            .unwrap()
            .log(LogCategory::Info, "first");
        SyncLogger::new(&path, false)
            .unwrap()
            .log(LogCategory::Info, "second");

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
