//! Shared infrastructure
//!
//! This module contains the error taxonomy, the I/O abstraction layer,
//! the reference FASTA loader, and the mismatch report writer.

pub mod error;
pub mod fasta;
pub mod io;
pub mod report;

pub use error::{AlignError, FastaError, FastaResult, Result, VcfParseError, VcfResult};
pub use fasta::read_single_sequence;
pub use io::{
    ByteSink, FileLimiter, FileSlot, MappedFile, DEFAULT_BUFFER_SIZE, LARGE_BUFFER_SIZE,
};
pub use report::MismatchReport;
