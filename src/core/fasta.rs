//! Reference FASTA loading
//!
//! Only the first sequence of the file is read; its bytes are uppercased
//! into a contiguous vector.

use crate::core::error::{FastaError, FastaResult};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Read the first sequence of a FASTA file into an uppercased byte vector
pub fn read_single_sequence<P: AsRef<Path>>(path: P) -> FastaResult<Vec<u8>> {
    let file = File::open(path.as_ref())?;
    let reader = BufReader::with_capacity(super::io::DEFAULT_BUFFER_SIZE, file);

    let mut sequence = Vec::new();
    let mut in_first = false;

    for line in reader.lines() {
        let line = line?;
        if let Some(rest) = line.strip_prefix('>') {
            if in_first {
                break;
            }
            in_first = true;
            log::info!(
                "Reading reference sequence '{}'",
                rest.split_whitespace().next().unwrap_or("")
            );
        } else {
            if !in_first {
                return Err(FastaError::MissingHeader(path.as_ref().to_path_buf()));
            }
            sequence.extend(line.trim().bytes().map(|b| b.to_ascii_uppercase()));
        }
    }

    if !in_first {
        return Err(FastaError::MissingHeader(path.as_ref().to_path_buf()));
    }
    if sequence.is_empty() {
        return Err(FastaError::EmptySequence(path.as_ref().to_path_buf()));
    }

    Ok(sequence)
}
