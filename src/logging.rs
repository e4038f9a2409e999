//! Structured logging module for Eidolon
//!
//! Writes logs to ~/Library/Logs/Eidolon/ with categories:
//! - ROUTING: Turn router decisions (local command vs remote completion)
//! - MEMORY: Task list changes
//! - SYNC: Remote/local persistence outcomes
//! - SESSION: Sign-in/sign-out and load sequencing
//! - ERROR: Errors and fallbacks

use chrono::{Local, Utc};
use once_cell::sync::Lazy;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

/// Log categories for structured logging
#[derive(Debug, Clone, Copy)]
pub enum LogCategory {
    Routing,
    Memory,
    Sync,
    Session,
    Error,
}

impl LogCategory {
    fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Routing => "ROUTING",
            LogCategory::Memory => "MEMORY",
            LogCategory::Sync => "SYNC",
            LogCategory::Session => "SESSION",
            LogCategory::Error => "ERROR",
        }
    }
}

/// Global log file handle
static LOG_FILE: Lazy<Mutex<Option<PathBuf>>> = Lazy::new(|| Mutex::new(None));

/// Get the log directory path
fn get_log_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join("Library/Logs/Eidolon")
}

/// Get today's log file path
fn get_log_file_path() -> PathBuf {
    let today = Local::now().format("%Y-%m-%d").to_string();
    get_log_dir().join(format!("eidolon-{}.log", today))
}

/// Initialize the logging system - creates log directory if needed
pub fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let log_dir = get_log_dir();

    if !log_dir.exists() {
        fs::create_dir_all(&log_dir)?;
    }

    let log_path = get_log_file_path();
    *LOG_FILE.lock().unwrap() = Some(log_path);

    log(LogCategory::Session, None, "Eidolon logging initialized");

    Ok(())
}

/// Log a message with category and optional task/record context
pub fn log(category: LogCategory, context_id: Option<&str>, message: &str) {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let context = context_id
        .map(|id| format!("id={} | ", &id[..8.min(id.len())]))
        .unwrap_or_default();

    let log_line = format!(
        "[{}] [{}] {}{}\n",
        timestamp,
        category.as_str(),
        context,
        message
    );

    // Always print to console (for dev)
    print!("{}", log_line);

    let log_path = get_log_file_path();
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&log_path) {
        let _ = file.write_all(log_line.as_bytes());
    }
}

/// Log a routing decision (pattern matched, delegation, fallback)
pub fn log_routing(context_id: Option<&str>, message: &str) {
    log(LogCategory::Routing, context_id, message);
}

/// Log a memory event (task added, toggled, removed)
pub fn log_memory(context_id: Option<&str>, message: &str) {
    log(LogCategory::Memory, context_id, message);
}

/// Log a persistence outcome (remote insert, local write, id reconciliation)
pub fn log_sync(context_id: Option<&str>, message: &str) {
    log(LogCategory::Sync, context_id, message);
}

/// Log a session lifecycle event (sign-in, sign-out, load sequencing)
pub fn log_session(context_id: Option<&str>, message: &str) {
    log(LogCategory::Session, context_id, message);
}

/// Log an error
pub fn log_error(context_id: Option<&str>, message: &str) {
    log(LogCategory::Error, context_id, message);
}

/// Clean up old log files (keep last 7 days)
pub fn cleanup_old_logs() -> Result<usize, Box<dyn std::error::Error>> {
    let log_dir = get_log_dir();
    let mut deleted = 0;

    if !log_dir.exists() {
        return Ok(0);
    }

    let cutoff = Utc::now() - chrono::Duration::days(7);

    for entry in fs::read_dir(&log_dir)? {
        let entry = entry?;
        let path = entry.path();

        if let Ok(metadata) = entry.metadata() {
            if let Ok(modified) = metadata.modified() {
                let modified_time: chrono::DateTime<Utc> = modified.into();
                if modified_time < cutoff {
                    if fs::remove_file(&path).is_ok() {
                        deleted += 1;
                    }
                }
            }
        }
    }

    Ok(deleted)
}
