//! Subgraph partitioning
//!
//! A cut point is a data-line boundary no live variant overlap crosses:
//! every earlier record ends at or before the record starting there. Cut
//! points at least `min_path_length` source bytes apart partition the
//! variant stream into the ranges the reduced-samples pipeline reads
//! concurrently.

use crate::core::error::Result;
use crate::graph::alt_check::AltChecker;
use crate::vcf::{VcfField, VcfReader};

/// A data-line boundary where the variant stream has no pending overlap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CutPoint {
    /// Byte offset of the line start in the VCF source
    pub offset: usize,
    /// 1-based line number of the record starting the new component
    pub lineno: usize,
    /// Non-skipped records seen before this point
    pub seen: usize,
}

/// One subgraph's extent in the VCF source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphRange {
    pub start_offset: usize,
    pub end_offset: usize,
    pub start_lineno: usize,
    /// Non-skipped records within the range
    pub variant_count: usize,
}

/// Result of scanning the variant stream for cut points
#[derive(Debug, Default)]
pub struct CutScan {
    pub cut_points: Vec<CutPoint>,
    /// Total non-skipped records
    pub total_variants: usize,
    /// Offset of the first data line
    pub first_offset: usize,
    /// Line number of the first data line
    pub first_lineno: usize,
}

/// Scan all records and locate every cut point.
///
/// Skipped records neither open overlaps nor start components. The implicit
/// cut at the first data line is reported through `first_offset`, not as a
/// `CutPoint`.
pub fn find_cut_points(reader: &mut VcfReader, checker: &AltChecker) -> Result<CutScan> {
    reader.reset()?;
    reader.set_parsed_fields(VcfField::Ref);

    let mut scan = CutScan {
        first_offset: reader.buffer_start(),
        first_lineno: reader.last_header_lineno() + 1,
        ..CutScan::default()
    };
    let mut max_end: Option<usize> = None;

    reader.parse(|view| {
        if checker.is_skipped(view.lineno()) {
            return Ok(true);
        }
        let pos = view.zero_based_pos()?;
        let end = view.end_pos()?;

        if let Some(previous_end) = max_end {
            if previous_end <= pos {
                scan.cut_points.push(CutPoint {
                    offset: view.source_offset(),
                    lineno: view.lineno(),
                    seen: scan.total_variants,
                });
            }
        }

        max_end = Some(max_end.map_or(end, |m| m.max(end)));
        scan.total_variants += 1;
        Ok(true)
    })?;

    log::info!("Found {} possible cut points", scan.cut_points.len());
    Ok(scan)
}

/// Turn cut points into subgraph ranges.
///
/// A cut point starts a new range only when it lies at least
/// `min_path_length` bytes past the previous accepted start; the final range
/// always runs to `end_offset`.
pub fn partition(scan: &CutScan, end_offset: usize, min_path_length: usize) -> Vec<GraphRange> {
    let mut ranges = Vec::new();
    let mut current_offset = scan.first_offset;
    let mut current_lineno = scan.first_lineno;
    let mut current_seen = 0;

    for cut in &scan.cut_points {
        if cut.offset - current_offset >= min_path_length {
            ranges.push(GraphRange {
                start_offset: current_offset,
                end_offset: cut.offset,
                start_lineno: current_lineno,
                variant_count: cut.seen - current_seen,
            });
            current_offset = cut.offset;
            current_lineno = cut.lineno;
            current_seen = cut.seen;
        }
    }

    ranges.push(GraphRange {
        start_offset: current_offset,
        end_offset,
        start_lineno: current_lineno,
        variant_count: scan.total_variants - current_seen,
    });

    ranges
}
