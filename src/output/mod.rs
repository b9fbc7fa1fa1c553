//! Log routing for stamped records.
//!
//! The core produces `(timestamp, topic, message)` triples. A [`LogSink`]
//! consumes them; [`LogRouter`] fans one record out to every configured sink.
//! A failing sink is logged and skipped so that the remaining sinks still
//! receive the record.

pub mod console;
pub mod csv;

use crate::timestamp::Timestamp;
use log::warn;
use serde::Serialize;
use std::io;

/// A topic and its message body, ready to be stamped and routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub topic: String,
    /// Minified JSON object body without the enclosing braces.
    pub message: String,
}

impl Record {
    pub fn new(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            message: message.into(),
        }
    }
}

/// Serialize `value` as minified JSON and strip the enclosing braces.
///
/// # Example
/// ```
/// use datagator::output::json_body;
///
/// #[derive(serde::Serialize)]
/// struct Battery { #[serde(rename = "BATT_VOLTAGE")] mv: u16 }
///
/// assert_eq!(json_body(&Battery { mv: 2950 }).unwrap(), r#""BATT_VOLTAGE":2950"#);
/// ```
pub fn json_body<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(value)?;
    Ok(json
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .unwrap_or(json.as_str())
        .to_string())
}

/// Destination for stamped records.
pub trait LogSink {
    /// Short name used in log lines.
    fn name(&self) -> &str;

    fn write(&mut self, timestamp: &Timestamp, record: &Record) -> io::Result<()>;
}

/// Fan-out over a list of sinks.
#[derive(Default)]
pub struct LogRouter {
    sinks: Vec<Box<dyn LogSink + Send>>,
    written: usize,
}

impl LogRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: impl LogSink + Send + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Deliver one record to every sink. Returns the number of sinks that
    /// accepted it.
    pub fn route(&mut self, timestamp: &Timestamp, record: &Record) -> usize {
        let mut delivered = 0;
        for sink in &mut self.sinks {
            match sink.write(timestamp, record) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("{} sink failed for {}: {e}", sink.name(), record.topic),
            }
        }
        if delivered > 0 {
            self.written += 1;
        }
        delivered
    }

    /// Records accepted by at least one sink since the router was built.
    pub fn written(&self) -> usize {
        self.written
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Sink that remembers every record it was given.
    #[derive(Clone, Default)]
    pub struct MemorySink {
        pub records: Arc<Mutex<Vec<(String, Record)>>>,
        pub fail: bool,
    }

    impl MemorySink {
        pub fn lines(&self) -> Vec<(String, Record)> {
            self.records.lock().unwrap().clone()
        }
    }

    impl LogSink for MemorySink {
        fn name(&self) -> &str {
            "memory"
        }

        fn write(&mut self, timestamp: &Timestamp, record: &Record) -> io::Result<()> {
            if self.fail {
                return Err(io::Error::other("card removed"));
            }
            self.records
                .lock()
                .unwrap()
                .push((timestamp.to_string(), record.clone()));
            Ok(())
        }
    }
}
