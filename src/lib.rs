//! hapalign - multiply-aligned haplotype sequences
//!
//! Reads a reference FASTA and a VCF and emits one aligned byte string per
//! haplotype: equal-length sequences in which every position corresponds to
//! the same reference coordinate, with insertions materialised as padding
//! columns in the other haplotypes.
//!
//! # Modes
//!
//! - **All-haplotypes**: one output file per (sample, chromosome copy)
//! - **Reduced-samples**: all distinct haplotype paths packed into a fixed
//!   number of output files, stitched across subgraph boundaries by a
//!   minimum-cost path matching
//!
//! # Example
//!
//! ```ignore
//! use hapalign::pipeline::{generate_haplotypes, GenerateConfig};
//!
//! let mut config = GenerateConfig::new("reference.fa", "variants.vcf");
//! config.check_ref = true;
//! generate_haplotypes(&config)?;
//! ```

pub mod core;
pub mod graph;
pub mod pipeline;
pub mod vcf;

// Re-export commonly used types
pub use crate::core::{
    AlignError, ByteSink, FastaError, MappedFile, MismatchReport, Result, VcfParseError,
};
pub use graph::{AltChecker, CutScan, GraphRange, SvPolicy};
pub use pipeline::{
    generate_haplotypes, GenerateConfig, HaplotypeId, HaplotypeStream, SampleReducer,
    SequenceWriter, VariantBuffer, REF_SAMPLE_NUMBER,
};
pub use vcf::{RecordBuf, RecordView, VcfField, VcfReader};
