//! Daily CSV log files, the on-device equivalent of the SD card log.
//!
//! One file per calendar day of the record's timestamp, named
//! `log_<M>-<D>-<Y>.csv`. Records stamped with the unknown timestamp go to
//! `log.csv`. Each new file starts with a header row.

use super::{LogSink, Record};
use crate::timestamp::Timestamp;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;

pub const HEADER: &str = "TIME,MQTT TOPIC,MQTT MESSAGE";

pub struct CsvSink {
    dir: PathBuf,
}

impl CsvSink {
    /// Creates `dir` if it does not exist yet.
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, timestamp: &Timestamp) -> PathBuf {
        self.dir.join(format!("{}.csv", timestamp.log_file_stem()))
    }
}

/// Quote a field if it contains a delimiter, quote or line break.
fn field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

impl LogSink for CsvSink {
    fn name(&self) -> &str {
        "csv"
    }

    fn write(&mut self, timestamp: &Timestamp, record: &Record) -> io::Result<()> {
        let path = self.path_for(timestamp);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        if file.metadata()?.len() == 0 {
            writeln!(file, "{HEADER}")?;
        }
        writeln!(
            file,
            "{},{},{}",
            field(&timestamp.to_string()),
            field(&record.topic),
            field(&format!("{{{}}}", record.message))
        )?;
        file.sync_data()
    }
}
