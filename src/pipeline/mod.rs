//! The haplotype generation pipeline
//!
//! Preparation, same-POS batching with backpressure, the overlap-stack
//! sequence writer, the sample reducer, and the two output drivers
//! (all-haplotypes and reduced-samples).

pub mod all_haplotypes;
pub mod buffer;
pub mod dispatch;
pub mod generate;
pub mod prepare;
pub mod reduce;
pub mod subgraphs;
pub mod writer;

/// Sample number reserved for the reference output stream
pub const REF_SAMPLE_NUMBER: usize = 0;

/// One haplotype: (1-based sample number, 0-based chromosome copy)
pub type HaplotypeId = (usize, u8);

pub use buffer::{VariantBuffer, VariantHandler, DEFAULT_BUFFER_DEPTH};
pub use generate::{generate_haplotypes, GenerateConfig};
pub use prepare::{prepare, Preparation};
pub use reduce::{RangeMap, SampleReducer, VariantSequence};
pub use subgraphs::ReducedSubgraph;
pub use writer::{HaplotypeStream, SequenceWriter};
