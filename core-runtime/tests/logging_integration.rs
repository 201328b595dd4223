//! Integration tests for the logging system
//!
//! The global subscriber can only be installed once per process, so every
//! check that needs it lives in a single test.

use bridge_traits::error::Result as SinkResult;
use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};
use core_runtime::logging::{init_logging, redact_if_sensitive, LogFormat, LoggingConfig};
use core_runtime::Error;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct CollectingSink {
    entries: Mutex<Vec<LogEntry>>,
}

impl LoggerSink for CollectingSink {
    fn log(&self, entry: LogEntry) -> SinkResult<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }
}

#[test]
fn test_init_logging_forwards_to_sink_once() {
    let sink = Arc::new(CollectingSink::default());

    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_filter("logging_integration=debug")
        .with_logger_sink(sink.clone());

    init_logging(config).expect("first initialization succeeds");

    tracing::info!(item_id = "li_1", api_token = "abc", "session opened");

    {
        let entries = sink.entries.lock().unwrap();
        let entry = entries
            .iter()
            .find(|e| e.message == "session opened")
            .expect("event forwarded to sink");
        assert_eq!(entry.level, LogLevel::Info);
        assert_eq!(entry.fields.get("item_id").map(String::as_str), Some("li_1"));
        assert_eq!(
            entry.fields.get("api_token").map(String::as_str),
            Some("[REDACTED]")
        );
    }

    let second = init_logging(LoggingConfig::default());
    assert!(matches!(second, Err(Error::Config(_))));
}

#[test]
fn test_redaction_leaves_playback_fields_alone() {
    assert_eq!(redact_if_sensitive("session_id", "sess-1"), "sess-1");
    assert_eq!(redact_if_sensitive("position", "12.5"), "12.5");
    assert_eq!(redact_if_sensitive("authorization", "Bearer x"), "[REDACTED]");
}

#[test]
fn test_format_selection() {
    #[cfg(debug_assertions)]
    assert_eq!(LogFormat::default(), LogFormat::Pretty);

    #[cfg(not(debug_assertions))]
    assert_eq!(LogFormat::default(), LogFormat::Json);
}
