//! Unit tests for engine.rs
//!
//! The logger is a process-wide singleton, so tests that install a logger
//! are serialized with serial_test.

use crate::engine::Framework;
use crate::log::{Logger, LogEntry, LogSeverity};
use serial_test::serial;
use std::sync::{Arc, Mutex};

/// Logger that records every entry it receives
struct RecordingLogger {
    entries: Arc<Mutex<Vec<(LogSeverity, String, String)>>>,
}

impl Logger for RecordingLogger {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push((
            entry.severity,
            entry.source.clone(),
            entry.message.clone(),
        ));
    }
}

#[test]
#[serial]
fn test_log_routes_through_installed_logger() {
    let entries = Arc::new(Mutex::new(Vec::new()));
    Framework::set_logger(RecordingLogger {
        entries: Arc::clone(&entries),
    });

    Framework::log(LogSeverity::Info, "prism::test", "hello".to_string());

    {
        let recorded = entries.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].0, LogSeverity::Info);
        assert_eq!(recorded[0].1, "prism::test");
        assert_eq!(recorded[0].2, "hello");
    }

    Framework::reset_logger();
}

#[test]
#[serial]
fn test_log_detailed_carries_file_and_line() {
    struct FileLineLogger {
        saw_file_line: Arc<Mutex<bool>>,
    }

    impl Logger for FileLineLogger {
        fn log(&self, entry: &LogEntry) {
            if entry.file == Some("somewhere.rs") && entry.line == Some(7) {
                *self.saw_file_line.lock().unwrap() = true;
            }
        }
    }

    let saw = Arc::new(Mutex::new(false));
    Framework::set_logger(FileLineLogger {
        saw_file_line: Arc::clone(&saw),
    });

    Framework::log_detailed(
        LogSeverity::Error,
        "prism::test",
        "boom".to_string(),
        "somewhere.rs",
        7,
    );

    assert!(*saw.lock().unwrap());

    Framework::reset_logger();
}

#[test]
#[serial]
fn test_reset_logger_restores_default() {
    let entries = Arc::new(Mutex::new(Vec::new()));
    Framework::set_logger(RecordingLogger {
        entries: Arc::clone(&entries),
    });
    Framework::reset_logger();

    // After reset the recording logger must no longer receive entries
    Framework::log(LogSeverity::Warn, "prism::test", "ignored".to_string());
    assert!(entries.lock().unwrap().is_empty());
}
