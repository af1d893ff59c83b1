//! VCF parsing
//!
//! A streaming, line-oriented reader with lazy field parsing, plus the
//! transient/owned record pair the rest of the pipeline consumes.

pub mod reader;
pub mod record;

pub use reader::{VcfReader, VcfSource};
pub use record::{
    decode_gt, gt_subfield_index, subfield, RecordBuf, RecordView, VcfField, FIXED_FIELD_COUNT,
};
