//! Split an input value set into contiguous partitions.
//!
//! Partition sizes differ by at most one; the first `len % parts` partitions
//! carry the extra value. Asking for more partitions than values yields empty
//! trailing partitions, which is a legitimate executor choice: an empty
//! partition contributes a zeroed state that merges as the identity.

/// Partition `values` into exactly `parts` contiguous slices (left to right).
///
/// # Panics
/// Panics if `parts == 0`.
#[must_use]
pub fn partition_values(values: &[f64], parts: usize) -> Vec<&[f64]> {
    assert!(parts > 0, "partition_values: parts must be > 0");

    let base = values.len() / parts;
    let extra = values.len() % parts;

    let mut out = Vec::with_capacity(parts);
    let mut lo = 0usize;
    for k in 0..parts {
        let len = base + usize::from(k < extra);
        out.push(&values[lo..lo + len]);
        lo += len;
    }
    out
}
