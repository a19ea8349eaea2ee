//! Per-step execution traces.
//!
//! Warps hand a [`TraceRecord`] to a [`Sink`] after every executed instruction.
//! Records are only built when the sink is enabled.

use std::io::Write;
use std::path::Path;
use trace_model::TraceRecord;

pub trait Sink {
    fn enabled(&self) -> bool;

    fn record(&mut self, record: &TraceRecord);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct Noop;

impl Sink for Noop {
    fn enabled(&self) -> bool {
        false
    }

    fn record(&mut self, _record: &TraceRecord) {}
}

/// Forwards records to the `log` facade.
#[derive(Debug, Clone, Copy)]
pub struct Log {
    pub level: log::Level,
}

impl Default for Log {
    fn default() -> Self {
        Self {
            level: log::Level::Trace,
        }
    }
}

impl Sink for Log {
    fn enabled(&self) -> bool {
        log::log_enabled!(target: "warpsim::trace", self.level)
    }

    fn record(&mut self, record: &TraceRecord) {
        log::log!(target: "warpsim::trace", self.level, "{record}");
    }
}

/// Writes one JSON object per line.
///
/// Write errors do not interrupt the simulation. The first one is kept and
/// returned by [`Json::flush`].
#[derive(Debug)]
pub struct Json<W: Write> {
    writer: W,
    error: Option<std::io::Error>,
    num_records: u64,
}

impl Json<std::io::BufWriter<std::fs::File>> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, utils::fs::Error> {
        let writer = utils::fs::open_writable(path)?;
        Ok(Self::new(writer))
    }
}

impl<W: Write> Json<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            error: None,
            num_records: 0,
        }
    }

    #[must_use]
    pub fn num_records(&self) -> u64 {
        self.num_records
    }

    pub fn flush(&mut self) -> Result<(), std::io::Error> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        self.writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write(&mut self, record: &TraceRecord) -> Result<(), std::io::Error> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")
    }
}

impl<W: Write> Sink for Json<W> {
    fn enabled(&self) -> bool {
        self.error.is_none()
    }

    fn record(&mut self, record: &TraceRecord) {
        match self.write(record) {
            Ok(()) => self.num_records += 1,
            Err(err) => {
                log::error!("failed to write trace record: {err}");
                self.error = Some(err);
            }
        }
    }
}
