//! JSON Lines (NDJSON) helpers for streaming input values.
//!
//! One JSON number per line. The reader owns its file so the iterator can be
//! boxed and handed around without borrowing a buffer, and each item carries
//! its own line-numbered error.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Owning JSONL iterator over `f64` values.
pub struct JsonlValueIter {
    rdr: BufReader<File>,
    buf: String,
    line_no: usize,
}

impl JsonlValueIter {
    fn new(file: File) -> Self {
        Self {
            rdr: BufReader::new(file),
            buf: String::with_capacity(256),
            line_no: 0,
        }
    }
}

impl Iterator for JsonlValueIter {
    type Item = Result<f64>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.rdr.read_line(&mut self.buf) {
            Ok(0) => None, // EOF
            Ok(_) => {
                self.line_no += 1;
                let line = self.buf.trim_end_matches(|c: char| c == '\n' || c == '\r');
                if line.is_empty() {
                    return Some(Err(anyhow::anyhow!(
                        "parse jsonl line {}: empty line",
                        self.line_no
                    )));
                }
                let parsed: Result<f64> = serde_json::from_str(line)
                    .with_context(|| format!("parse jsonl line {}", self.line_no));
                Some(parsed)
            }
            Err(e) => Some(Err(e).with_context(|| format!("read line {}", self.line_no + 1))),
        }
    }
}

/// Stream read: one JSON number per line.
///
/// # Errors
/// Opening the file may fail. Individual items are `Err` for malformed lines.
pub fn stream_values_jsonl<P: AsRef<Path>>(path: P) -> Result<JsonlValueIter> {
    let f = File::open(path.as_ref())
        .with_context(|| format!("open {}", path.as_ref().display()))?;
    Ok(JsonlValueIter::new(f))
}

/// Write values as JSON Lines (one number per line).
pub fn write_values_jsonl<P: AsRef<Path>>(path: P, values: &[f64]) -> Result<()> {
    let f = File::create(path.as_ref())
        .with_context(|| format!("create {}", path.as_ref().display()))?;
    let mut w = BufWriter::new(f);
    for v in values {
        serde_json::to_writer(&mut w, v).context("serialize value to json")?;
        w.write_all(b"\n").context("write newline")?;
    }
    w.flush().context("flush writer")?;
    Ok(())
}
