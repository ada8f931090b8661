//! Utility functions for index arithmetic and storage-order normalization

use crate::error::{DcError, Result};

/// Reverse a storage-ordered list into canonical (X-first) order, or back
pub fn reversed<T: Clone>(values: &[T]) -> Vec<T> {
    values.iter().rev().cloned().collect()
}

/// Validate an inclusive `[min, max]` region against canonical dimension lengths
pub fn check_region(min: &[usize], max: &[usize], dims: &[usize]) -> Result<()> {
    if min.len() != dims.len() || max.len() != dims.len() {
        return Err(DcError::InvalidDimensions(format!(
            "region rank {}/{} does not match variable rank {}",
            min.len(),
            max.len(),
            dims.len()
        )));
    }

    for (i, ((&lo, &hi), &len)) in min.iter().zip(max).zip(dims).enumerate() {
        if lo > hi {
            return Err(DcError::InvalidDimensions(format!(
                "axis {}: min {} greater than max {}",
                i, lo, hi
            )));
        }
        if hi >= len {
            return Err(DcError::OutOfBounds(format!(
                "axis {}: max {} beyond length {}",
                i, hi, len
            )));
        }
    }

    Ok(())
}

/// Shape of an inclusive `[min, max]` region
pub fn region_shape(min: &[usize], max: &[usize]) -> Vec<usize> {
    min.iter().zip(max).map(|(lo, hi)| hi - lo + 1).collect()
}

/// Convert a canonical inclusive region into storage-order `(start, count)`
pub fn storage_region(min: &[usize], max: &[usize]) -> (Vec<usize>, Vec<usize>) {
    let start = reversed(min);
    let count = reversed(&region_shape(min, max));
    (start, count)
}

/// Decode a fixed-width character record, dropping NUL and blank padding
pub fn chars_to_string(chars: &[u8]) -> String {
    String::from_utf8_lossy(chars)
        .trim_end_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string()
}
