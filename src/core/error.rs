//! Error types for hapalign
//!
//! Defines all error types used throughout the library.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for hapalign operations
#[derive(Debug, Error)]
pub enum AlignError {
    /// VCF parsing errors
    #[error("VCF parse error: {0}")]
    Vcf(#[from] VcfParseError),

    /// Reference FASTA errors
    #[error("FASTA error: {0}")]
    Fasta(#[from] FastaError),

    /// A subgraph needs more haplotype slots than generated paths
    #[error(
        "Subgraph starting at line {start_lineno} needs {needed} paths but only {available} were requested"
    )]
    PathCapacity {
        start_lineno: usize,
        needed: usize,
        available: usize,
    },

    /// Internal contract violation
    #[error("Invariant violation: {0}")]
    Invariant(String),

    /// Worker thread terminated abnormally
    #[error("Worker thread panicked: {0}")]
    WorkerPanic(&'static str),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while parsing a VCF file
#[derive(Debug, Error)]
pub enum VcfParseError {
    /// The header did not end with a #CHROM line
    #[error("Expected a '#CHROM' header line, got '{line}'")]
    MissingColumnHeader { line: String },

    /// Two sample columns share one name
    #[error("Duplicate sample name '{name}' in header")]
    DuplicateSampleName { name: String },

    /// A data line has too few tab-delimited fields
    #[error("Too few fields on line {lineno}: expected at least {expected}, found {found}")]
    TooFewFields {
        lineno: usize,
        expected: usize,
        found: usize,
    },

    /// A data line has more sample columns than the header declared
    #[error("Line {lineno} has {found} sample columns, header declared {expected}")]
    TooManySamples {
        lineno: usize,
        expected: usize,
        found: usize,
    },

    /// POS could not be parsed as an integer
    #[error("Invalid POS '{value}' on line {lineno}")]
    InvalidPos { lineno: usize, value: String },

    /// FORMAT lacks the GT field needed for genotypes
    #[error("FORMAT on line {lineno} has no GT field")]
    MissingGenotypeField { lineno: usize },

    /// A sample's GT arity disagrees with the ploidy map
    #[error("Sample {sample_no} on line {lineno} has ploidy {found}, expected {expected}")]
    PloidyChanged {
        lineno: usize,
        sample_no: usize,
        expected: usize,
        found: usize,
    },

    /// Records must be sorted by POS
    #[error("Line {lineno}: POS {pos} is smaller than previous POS {previous}")]
    UnsortedInput {
        lineno: usize,
        pos: usize,
        previous: usize,
    },

    /// I/O error during parsing
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while reading the reference FASTA
#[derive(Debug, Error)]
pub enum FastaError {
    /// The file did not start with a '>' header
    #[error("Not a FASTA file (missing '>' header): {0}")]
    MissingHeader(PathBuf),

    /// The first sequence was empty
    #[error("Empty reference sequence in {0}")]
    EmptySequence(PathBuf),

    /// I/O error during reading
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for hapalign operations
pub type Result<T> = std::result::Result<T, AlignError>;

/// Result type alias for VCF parsing operations
pub type VcfResult<T> = std::result::Result<T, VcfParseError>;

/// Result type alias for FASTA reading operations
pub type FastaResult<T> = std::result::Result<T, FastaError>;
