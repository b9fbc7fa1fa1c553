//! Line-per-record output to a writer, normally stdout.

use super::{LogSink, Record};
use crate::timestamp::Timestamp;
use std::io::{self, Write};

/// Writes `<timestamp> <topic> {<message>}` lines.
pub struct ConsoleSink<W: Write> {
    out: W,
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> LogSink for ConsoleSink<W> {
    fn name(&self) -> &str {
        "console"
    }

    fn write(&mut self, timestamp: &Timestamp, record: &Record) -> io::Result<()> {
        writeln!(
            self.out,
            "{timestamp} {} {{{}}}",
            record.topic, record.message
        )?;
        self.out.flush()
    }
}
