//! Preparation stage
//!
//! Before any output is produced the VCF is validated against the
//! reference: the ploidy map is established from the first record, the REF
//! column is optionally compared byte-for-byte, every ALT is classified
//! under the SV policy, non-nested overlaps are excluded, and the cut-point
//! scan locates the subgraph boundaries.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::path::Path;

use crate::core::error::{Result, VcfParseError};
use crate::core::fasta::read_single_sequence;
use crate::core::report::MismatchReport;
use crate::graph::alt_check::{AltChecker, SvPolicy};
use crate::graph::subgraph::{find_cut_points, CutScan};
use crate::vcf::record::{decode_gt, gt_subfield_index, subfield};
use crate::vcf::{VcfField, VcfReader};

/// Everything later pipeline stages need from the input files
pub struct Preparation {
    pub reference: Vec<u8>,
    /// Ploidy per sample; index is sample number minus one
    pub ploidy: Vec<usize>,
    pub checker: AltChecker,
    /// Data records in the file, skipped ones included
    pub record_count: usize,
    pub scan: CutScan,
}

impl Preparation {
    /// Sum of all sample ploidies: the number of haplotype streams
    pub fn haplotype_count(&self) -> usize {
        self.ploidy.iter().sum()
    }
}

/// Compare a record's REF column against the reference sequence.
///
/// Returns the offset of the first disagreeing byte on mismatch.
fn compare_references(reference: &[u8], var_ref: &[u8], var_pos: usize) -> Option<usize> {
    if var_pos + var_ref.len() > reference.len() {
        return Some(0);
    }
    var_ref
        .iter()
        .zip(&reference[var_pos..])
        .position(|(a, b)| !a.eq_ignore_ascii_case(b))
}

fn check_ploidy(reader: &mut VcfReader) -> Result<Vec<usize>> {
    reader.reset()?;
    reader.set_parsed_fields(VcfField::All);

    let sample_count = reader.sample_count();
    let mut ploidy = Vec::with_capacity(sample_count);
    let mut alleles = Vec::with_capacity(2);

    reader.parse(|view| {
        let gt_index = view.format().and_then(gt_subfield_index).ok_or(
            VcfParseError::MissingGenotypeField {
                lineno: view.lineno(),
            },
        )?;
        for sample_no in 1..=sample_count {
            let gt = subfield(view.sample(sample_no).unwrap_or(b""), gt_index);
            decode_gt(gt, &mut alleles);
            ploidy.push(alleles.len());
        }
        Ok(false)
    })?;

    if ploidy.is_empty() && sample_count > 0 {
        // No data records to derive ploidy from; assume diploid.
        log::warn!("No variant records; assuming ploidy 2 for every sample");
        ploidy = vec![2; sample_count];
    }
    Ok(ploidy)
}

fn check_ref(
    reader: &mut VcfReader,
    reference: &[u8],
    report: &mut MismatchReport,
) -> Result<()> {
    reader.reset()?;
    reader.set_parsed_fields(VcfField::Ref);

    reader.parse(|view| {
        let pos = view.zero_based_pos()?;
        if let Some(offset) = compare_references(reference, view.ref_allele(), pos) {
            report.log_mismatch(view.lineno(), offset)?;
        }
        Ok(true)
    })?;
    Ok(())
}

/// Classify ALTs and exclude records that overlap without nesting.
///
/// Returns the total record count.
fn check_alts_and_overlaps(reader: &mut VcfReader, checker: &mut AltChecker) -> Result<usize> {
    reader.reset()?;
    reader.set_parsed_fields(VcfField::Alt);

    // Min-heap of open intervals as (end position, lineno).
    let mut open_ends: BinaryHeap<Reverse<(usize, usize)>> = BinaryHeap::new();
    let mut previous_pos = 0usize;
    let mut conflicts = 0usize;

    reader.parse(|view| {
        let pos = view.zero_based_pos()?;
        let end = view.end_pos()?;
        if view.pos()? < previous_pos {
            return Err(VcfParseError::UnsortedInput {
                lineno: view.lineno(),
                pos: view.pos()?,
                previous: previous_pos,
            });
        }
        previous_pos = view.pos()?;

        checker.check_record(view);
        if checker.is_skipped(view.lineno()) {
            return Ok(true);
        }

        while open_ends.peek().is_some_and(|&Reverse((e, _))| e <= pos) {
            open_ends.pop();
        }
        // An open interval ending inside this record cannot nest it; both
        // sides of every such pair join the skipped set.
        let mut conflicted = false;
        while let Some(&Reverse((e, earlier))) = open_ends.peek() {
            if e >= end {
                break;
            }
            open_ends.pop();
            conflicts += 1;
            conflicted = true;
            checker.mark_skipped(earlier);
            log::warn!(
                "Lines {} and {} overlap without nesting; skipping both",
                earlier,
                view.lineno()
            );
        }
        if conflicted {
            checker.mark_skipped(view.lineno());
        } else {
            open_ends.push(Reverse((end, view.lineno())));
        }
        Ok(true)
    })?;

    if conflicts == 0 {
        log::info!("Found no conflicting variants");
    } else {
        log::info!(
            "Found {} conflicts; {} variants will be skipped",
            conflicts,
            checker.skipped_count()
        );
    }
    Ok(reader.counter_value())
}

/// Run every preparation pass.
///
/// The reader must have its header read already. `want_subgraphs` controls
/// whether the cut-point scan runs; all-haplotypes mode does not need it.
pub fn prepare<P: AsRef<Path>>(
    reader: &mut VcfReader,
    reference_path: P,
    policy: SvPolicy,
    should_check_ref: bool,
    report: &mut MismatchReport,
    want_subgraphs: bool,
) -> Result<Preparation> {
    let reference = read_single_sequence(reference_path)?;
    log::info!("Reference length: {}", reference.len());

    log::info!("Checking ploidy");
    let ploidy = check_ploidy(reader)?;

    if should_check_ref {
        log::info!("Comparing the REF column to the reference");
        check_ref(reader, &reference, report)?;
        if report.mismatch_count() > 0 {
            log::info!("{} reference mismatches", report.mismatch_count());
        }
    }

    log::info!("Checking ALT alleles and overlapping variants");
    let mut checker = AltChecker::new(policy);
    let record_count = check_alts_and_overlaps(reader, &mut checker)?;

    let scan = if want_subgraphs {
        log::info!("Finding subgraphs connected by single edges");
        find_cut_points(reader, &checker)?
    } else {
        CutScan {
            first_offset: reader.buffer_start(),
            first_lineno: reader.last_header_lineno() + 1,
            ..CutScan::default()
        }
    };

    Ok(Preparation {
        reference,
        ploidy,
        checker,
        record_count,
        scan,
    })
}
