//! Serialization helpers for partial-state files and input value sets.
//!
//! JSON and CBOR read/write utilities with extension-based auto-detection.
//! Unknown/missing extensions are rejected for reads and default to JSON
//! for writes.
//!
//! A state file is a [`Versioned`] wrapper around a [`PartialState`]. The
//! version tag belongs to the *file*, not to the state record: the record
//! itself is still the bare two-slot array.
//!
//! Extras:
//! - In-memory CBOR: [`encode_state_cbor`] / [`decode_state_cbor`]
//! - Streaming helper: [`stream_values_auto`] returning a boxed iterator so
//!   callers can uniformly consume JSONL/NDJSON (true streaming) or a JSON
//!   array (load-then-iterate).

use crate::PartialState;
use anyhow::{anyhow, ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Wire version of state files written by this crate.
pub const STATE_FILE_VERSION: u16 = 1;

/// On-disk form of a partial state.
pub type StateFile = Versioned<PartialState>;

/// Ensure the parent directory for a file exists (no-op if none).
fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating parent directory {}", display(path)))?;
        }
    }
    Ok(())
}

fn check_version(file: StateFile) -> Result<PartialState> {
    ensure!(
        file.ver == STATE_FILE_VERSION,
        "unsupported state file version {} (expected {})",
        file.ver,
        STATE_FILE_VERSION
    );
    Ok(file.payload)
}

/// ------------------------------
/// PartialState I/O
/// ------------------------------

/// Read a [`PartialState`] from a **JSON** state file.
pub fn read_state_json<P: AsRef<Path>>(path: P) -> Result<PartialState> {
    let path_ref = path.as_ref();
    let f = File::open(path_ref).with_context(|| format!("open {}", display(path_ref)))?;
    let rdr = BufReader::new(f);
    let v: StateFile =
        serde_json::from_reader(rdr).with_context(|| "deserialize JSON state file")?;
    check_version(v)
}

/// Write a [`PartialState`] to a **JSON** state file (pretty).
pub fn write_state_json<P: AsRef<Path>>(path: P, state: &PartialState) -> Result<()> {
    let path_ref = path.as_ref();
    ensure_parent_dir(path_ref)?;
    let f = File::create(path_ref).with_context(|| format!("create {}", display(path_ref)))?;
    let w = BufWriter::new(f);
    serde_json::to_writer_pretty(w, &Versioned::new(STATE_FILE_VERSION, *state))
        .with_context(|| "serialize JSON state file")?;
    Ok(())
}

/// Read a [`PartialState`] from a **CBOR** state file.
pub fn read_state_cbor<P: AsRef<Path>>(path: P) -> Result<PartialState> {
    let path_ref = path.as_ref();
    let bytes = fs::read(path_ref).with_context(|| format!("read {}", display(path_ref)))?;
    decode_state_cbor(&bytes)
}

/// Write a [`PartialState`] to a **CBOR** state file.
pub fn write_state_cbor<P: AsRef<Path>>(path: P, state: &PartialState) -> Result<()> {
    let path_ref = path.as_ref();
    ensure_parent_dir(path_ref)?;
    fs::write(path_ref, encode_state_cbor(state)?)
        .with_context(|| format!("write {}", display(path_ref)))
}

/// Auto-detect read by extension `.json` / `.cbor` (case-insensitive).
pub fn read_state_auto<P: AsRef<Path>>(path: P) -> Result<PartialState> {
    match ext_lower(path.as_ref()).as_deref() {
        Some("json") => read_state_json(path),
        Some("cbor") => read_state_cbor(path),
        Some(other) => Err(anyhow!(
            "unsupported state extension: {} (supported: .json, .cbor)",
            other
        )),
        None => Err(anyhow!("path has no extension (expected .json or .cbor)")),
    }
}

/// Auto-detect write (defaults to **JSON** if unknown or missing).
pub fn write_state_auto<P: AsRef<Path>>(path: P, state: &PartialState) -> Result<()> {
    match ext_lower(path.as_ref()).as_deref() {
        Some("cbor") => write_state_cbor(path, state),
        _ => write_state_json(path, state),
    }
}

/// ------------------------------
/// Input values
/// ------------------------------

/// Read a JSON array of numbers.
pub fn read_values_json<P: AsRef<Path>>(path: P) -> Result<Vec<f64>> {
    let path_ref = path.as_ref();
    let f = File::open(path_ref).with_context(|| format!("open {}", display(path_ref)))?;
    let v: Vec<f64> = serde_json::from_reader(BufReader::new(f))
        .with_context(|| "deserialize JSON value array")?;
    Ok(v)
}

/// Return a boxed iterator over input values for the given path.
///
/// - **`.jsonl` / `.ndjson`**: true streaming, one JSON number per line.
/// - **`.json`**: load the array, then iterate.
pub fn stream_values_auto<P: AsRef<Path>>(
    path: P,
) -> Result<Box<dyn Iterator<Item = Result<f64>> + Send>> {
    // Own the path so the iterator type doesn't capture `P`.
    let pb = path.as_ref().to_owned();

    match ext_lower(&pb).as_deref() {
        Some("jsonl" | "ndjson") => {
            let it = crate::io_jsonl::stream_values_jsonl(pb)?;
            Ok(Box::new(it))
        }
        Some("json") => {
            let v = read_values_json(&pb)?;
            Ok(Box::new(v.into_iter().map(Ok)))
        }
        Some(other) => Err(anyhow!(
            "unsupported values extension: {} (supported: .json, .jsonl, .ndjson)",
            other
        )),
        None => Err(anyhow!(
            "path has no extension (expected .json, .jsonl, or .ndjson)"
        )),
    }
}

/// ------------------------------
/// In-memory CBOR
/// ------------------------------

/// Encode a state as the bytes of a CBOR state file.
pub fn encode_state_cbor(state: &PartialState) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(32);
    ciborium::ser::into_writer(&Versioned::new(STATE_FILE_VERSION, *state), &mut buf)
        .context("serialize CBOR state file")?;
    Ok(buf)
}

/// Decode the bytes of a CBOR state file, checking its version.
pub fn decode_state_cbor(bytes: &[u8]) -> Result<PartialState> {
    let file: StateFile =
        ciborium::de::from_reader(bytes).context("deserialize CBOR state file")?;
    check_version(file)
}

/// ------------------------------
/// File envelope
/// ------------------------------

/// Version-tagged envelope around a file payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Versioned<T> {
    /// File format version; see [`STATE_FILE_VERSION`].
    pub ver: u16,
    /// The enveloped value.
    pub payload: T,
}

impl<T> Versioned<T> {
    /// Wrap `payload` under version `ver`.
    #[inline]
    pub const fn new(ver: u16, payload: T) -> Self {
        Self { ver, payload }
    }
}

/// Return the lowercase extension (without dot) if present.
fn ext_lower(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// Lossy path text for error contexts.
fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
