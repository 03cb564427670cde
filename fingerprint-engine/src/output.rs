//! Output record sink (spec.md section 6 "Output record format"): one JSON
//! object per line. [`pipeline::Pipeline`] runs exactly one writer on a
//! dedicated thread, draining every worker's ring in turn.

use crate::error::Result;
use std::io::{BufWriter, Write};

pub trait RecordWriter: Send {
    fn write_record(&mut self, record: &str) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
}

/// Writes one record per line to any `Write` destination, buffered the way
/// the teacher's config loader treats files: unbuffered reads are fine at
/// startup, but a per-packet write path always goes through a `BufWriter`.
pub struct LineWriter<W: Write> {
    inner: BufWriter<W>,
}

impl<W: Write> LineWriter<W> {
    pub fn new(inner: W) -> Self {
        LineWriter { inner: BufWriter::new(inner) }
    }
}

impl<W: Write + Send> RecordWriter for LineWriter<W> {
    fn write_record(&mut self, record: &str) -> Result<()> {
        self.inner.write_all(record.as_bytes())?;
        self.inner.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}
