//! Reduced-samples output mode
//!
//! Every subgraph range is read concurrently into a reduced subgraph (its
//! distinct haplotype paths). Adjacent subgraphs are stitched by a
//! minimum-cost path matching as soon as both sides are ready; once every
//! matching exists, a single writer task replays the whole record stream
//! and emits `generated_path_count` files plus the optional REF file.

use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};

use crate::core::error::{AlignError, Result};
use crate::core::io::{ByteSink, FileLimiter};
use crate::graph::alt_check::AltChecker;
use crate::graph::matching::max_weight_assignment;
use crate::graph::subgraph::GraphRange;
use crate::pipeline::buffer::{VariantBuffer, VariantHandler, DEFAULT_BUFFER_DEPTH};
use crate::pipeline::dispatch::TaskRegistry;
use crate::pipeline::generate::GenerateConfig;
use crate::pipeline::prepare::Preparation;
use crate::pipeline::reduce::SampleReducer;
use crate::pipeline::writer::{HaplotypeStream, SequenceWriter};
use crate::pipeline::{HaplotypeId, REF_SAMPLE_NUMBER};
use crate::vcf::{RecordBuf, VcfField, VcfReader};

/// The distinct haplotype paths observed through one subgraph
#[derive(Debug)]
pub struct ReducedSubgraph {
    pub start_lineno: usize,
    pub variant_count: usize,
    /// Path byte-strings: entry i is the ALT index of the i-th variant.
    /// Distinct paths come first in lexicographic order; all-REF filler
    /// paths pad the list to the generated path count.
    pub paths: Vec<Vec<u8>>,
    /// Path indices each haplotype's variant sequences landed in
    pub hap_paths: BTreeMap<HaplotypeId, Vec<usize>>,
}

impl ReducedSubgraph {
    /// Pack a finished reducer into paths.
    ///
    /// `linenos` lists the subgraph's non-skipped records in order.
    fn build(
        reducer: &SampleReducer,
        linenos: &[usize],
        start_lineno: usize,
        path_count: usize,
    ) -> Result<Self> {
        let variant_count = linenos.len();
        let line_index: HashMap<usize, usize> = linenos
            .iter()
            .enumerate()
            .map(|(i, &lineno)| (lineno, i))
            .collect();

        let map = reducer.assign_ranges_greedy();

        // One candidate path per slot column.
        let column_paths: Vec<Vec<u8>> = map
            .columns
            .iter()
            .map(|column| {
                let mut path = vec![0u8; variant_count];
                for &seq_idx in column.values() {
                    for (lineno, alt) in reducer.prepared()[seq_idx].alts() {
                        path[line_index[&lineno]] = alt;
                    }
                }
                path
            })
            .collect();

        let mut paths = column_paths.clone();
        paths.sort();
        paths.dedup();
        let distinct = paths.len();
        if distinct > path_count {
            return Err(AlignError::PathCapacity {
                start_lineno,
                needed: distinct,
                available: path_count,
            });
        }
        while paths.len() < path_count {
            paths.push(vec![0u8; variant_count]);
        }

        let path_of_column: Vec<usize> = column_paths
            .iter()
            .map(|p| {
                paths[..distinct]
                    .binary_search(p)
                    .expect("every column path is among the distinct paths")
            })
            .collect();

        let mut hap_paths: BTreeMap<HaplotypeId, Vec<usize>> = BTreeMap::new();
        for (&id, seqs) in reducer.memberships() {
            let mut indices: Vec<usize> = seqs
                .iter()
                .map(|&seq_idx| path_of_column[map.slot_of[seq_idx]])
                .collect();
            indices.sort_unstable();
            indices.dedup();
            hap_paths.insert(id, indices);
        }

        Ok(Self {
            start_lineno,
            variant_count,
            paths,
            hap_paths,
        })
    }
}

/// Feeds one subgraph's records into a sample reducer
struct SubgraphHandler<'a> {
    reducer: SampleReducer,
    checker: &'a AltChecker,
    ploidy: &'a [usize],
    linenos: Vec<usize>,
}

impl VariantHandler for SubgraphHandler<'_> {
    fn handle_variant(&mut self, record: &RecordBuf) -> Result<()> {
        let lineno = record.lineno();
        if self.checker.is_skipped(lineno) {
            return Ok(());
        }
        self.linenos.push(lineno);

        let pos = record.zero_based_pos();
        let checker = self.checker;
        let reducer = &mut self.reducer;
        record.for_each_genotype(self.ploidy, |sample_no, chr_idx, alt_idx, _phased| {
            let choice =
                (alt_idx != 0 && checker.is_valid_alt(lineno, alt_idx)).then_some(alt_idx);
            reducer.handle_allele((sample_no, chr_idx), lineno, pos, choice);
        })?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.reducer.finish();
        Ok(())
    }
}

/// Read one subgraph range and enumerate its distinct paths
fn read_subgraph_task(
    main_reader: &VcfReader,
    range: &GraphRange,
    prep: &Preparation,
    path_count: usize,
) -> Result<ReducedSubgraph> {
    let mut reader = main_reader
        .clone_for_range(range.start_offset, range.end_offset, range.start_lineno)
        .ok_or_else(|| {
            AlignError::Invariant("subgraph tasks need a memory-mapped reader".into())
        })?;
    reader.set_parsed_fields(VcfField::All);

    let mut handler = SubgraphHandler {
        reducer: SampleReducer::new(false),
        checker: &prep.checker,
        ploidy: &prep.ploidy,
        linenos: Vec::with_capacity(range.variant_count),
    };
    VariantBuffer::new(DEFAULT_BUFFER_DEPTH).drive(&mut reader, &mut handler)?;

    if handler.linenos.len() != range.variant_count {
        return Err(AlignError::Invariant(format!(
            "subgraph at line {} read {} variants, expected {}",
            range.start_lineno,
            handler.linenos.len(),
            range.variant_count
        )));
    }

    ReducedSubgraph::build(
        &handler.reducer,
        &handler.linenos,
        range.start_lineno,
        path_count,
    )
}

/// Match the left subgraph's paths to the right's.
///
/// `matching[a] = b` pairs left path a with right path b, maximising the
/// number of haplotypes whose sequences continue from a into b.
fn merge_subgraph_paths(
    left: &ReducedSubgraph,
    right: &ReducedSubgraph,
    path_count: usize,
) -> Vec<usize> {
    let mut weight = vec![vec![0i64; path_count]; path_count];
    for (id, left_paths) in &left.hap_paths {
        let Some(right_paths) = right.hap_paths.get(id) else {
            continue;
        };
        for &a in left_paths {
            for &b in right_paths {
                weight[a][b] += 1;
            }
        }
    }
    max_weight_assignment(&weight)
}

/// Replays the record stream, choosing each path's ALT per record
struct PathWriteHandler<'a> {
    writer: Option<SequenceWriter<'a>>,
    checker: &'a AltChecker,
    subgraphs: &'a [ReducedSubgraph],
    matchings: &'a [Vec<usize>],
    permutation: Vec<usize>,
    current: usize,
    consumed: usize,
    choices: Vec<(HaplotypeId, u8)>,
}

impl PathWriteHandler<'_> {
    fn advance_subgraph(&mut self) -> Result<()> {
        while self.consumed == self.subgraphs[self.current].variant_count {
            if self.current >= self.matchings.len() {
                return Err(AlignError::Invariant(
                    "record stream extends past the last subgraph".into(),
                ));
            }
            let matching = &self.matchings[self.current];
            for slot in &mut self.permutation {
                *slot = matching[*slot];
            }
            self.current += 1;
            self.consumed = 0;
        }
        Ok(())
    }
}

impl VariantHandler for PathWriteHandler<'_> {
    fn handle_variant(&mut self, record: &RecordBuf) -> Result<()> {
        if self.checker.is_skipped(record.lineno()) {
            return Ok(());
        }
        self.advance_subgraph()?;

        let subgraph = &self.subgraphs[self.current];
        let index = self.consumed;
        self.consumed += 1;

        self.choices.clear();
        for (file, &path) in self.permutation.iter().enumerate() {
            let alt_idx = subgraph.paths[path][index];
            if alt_idx != 0 {
                self.choices.push(((file + 1, 0), alt_idx));
            }
        }
        self.writer
            .as_mut()
            .expect("writer taken before finish")
            .handle_variant(record, &self.choices)
    }

    fn finish(&mut self) -> Result<()> {
        let writer = self.writer.take().expect("finish called twice");
        let streams = writer.finish()?;
        streams
            .into_par_iter()
            .try_for_each(|stream| stream.into_sink().finish())?;
        Ok(())
    }
}

/// Run the reduced-samples pipeline over the given subgraph ranges
pub fn run(
    reader: &mut VcfReader,
    prep: &Preparation,
    config: &GenerateConfig,
    ranges: &[GraphRange],
) -> Result<()> {
    let subgraph_count = ranges.len();
    let path_count = config.generated_path_count.max(1);

    if config.print_subgraph_handling {
        for (idx, range) in ranges.iter().enumerate() {
            log::info!(
                "Subgraph {}: lines {}..{} ({} variants, {} bytes)",
                idx,
                range.start_lineno,
                range.start_lineno + range.variant_count,
                range.variant_count,
                range.end_offset - range.start_offset
            );
        }
    }

    let registry = TaskRegistry::new();
    let subgraphs: Vec<OnceLock<ReducedSubgraph>> =
        (0..subgraph_count).map(|_| OnceLock::new()).collect();
    let matchings: Vec<OnceLock<Vec<usize>>> = (0..subgraph_count.saturating_sub(1))
        .map(|_| OnceLock::new())
        .collect();
    let merge_started: Vec<AtomicBool> = (0..subgraph_count.saturating_sub(1))
        .map(|_| AtomicBool::new(false))
        .collect();
    let remaining_merges = AtomicUsize::new(matchings.len());
    let first_error: Mutex<Option<AlignError>> = Mutex::new(None);

    {
        let reader = &*reader;
        let subgraphs = &subgraphs;
        let matchings = &matchings;
        let merge_started = &merge_started;
        let remaining_merges = &remaining_merges;
        let first_error = &first_error;
        let registry = &registry;

        rayon::scope(|scope| {
            for (idx, range) in ranges.iter().enumerate() {
                scope.spawn(move |scope| {
                    let _task = registry.register(format!("read subgraph {}", idx));
                    let result = read_subgraph_task(reader, range, prep, path_count);
                    let reduced = match result {
                        Ok(reduced) => reduced,
                        Err(e) => {
                            first_error.lock().expect("error slot").get_or_insert(e);
                            return;
                        }
                    };
                    subgraphs[idx]
                        .set(reduced)
                        .unwrap_or_else(|_| unreachable!("each slot is written once"));

                    // A finished slot starts the merges whose other side is
                    // ready; the swap keeps each merge to a single task.
                    let mut candidates = Vec::with_capacity(2);
                    if idx > 0 {
                        candidates.push(idx - 1);
                    }
                    if idx + 1 < subgraph_count {
                        candidates.push(idx);
                    }
                    for merge_idx in candidates {
                        let both_ready = subgraphs[merge_idx].get().is_some()
                            && subgraphs[merge_idx + 1].get().is_some();
                        if both_ready && !merge_started[merge_idx].swap(true, Ordering::SeqCst) {
                            scope.spawn(move |_| {
                                let _task =
                                    registry.register(format!("merge subgraphs {}", merge_idx));
                                let left = subgraphs[merge_idx].get().expect("ready");
                                let right = subgraphs[merge_idx + 1].get().expect("ready");
                                let matching = merge_subgraph_paths(left, right, path_count);
                                matchings[merge_idx]
                                    .set(matching)
                                    .unwrap_or_else(|_| unreachable!("merge runs once"));
                                if remaining_merges.fetch_sub(1, Ordering::SeqCst) == 1 {
                                    log::debug!("All path matchings complete");
                                }
                            });
                        }
                    }
                });
            }
        });
    }

    if let Some(e) = first_error.into_inner().expect("error slot") {
        return Err(e);
    }
    if remaining_merges.load(Ordering::SeqCst) != 0 {
        return Err(AlignError::Invariant(
            "subgraph merges did not all complete".into(),
        ));
    }

    let subgraphs: Vec<ReducedSubgraph> = subgraphs
        .into_iter()
        .map(|slot| slot.into_inner().expect("all subgraphs read"))
        .collect();
    let matchings: Vec<Vec<usize>> = matchings
        .into_iter()
        .map(|slot| slot.into_inner().expect("all merges complete"))
        .collect();

    // Final writer task: one stream per generated path plus optional REF.
    let limiter = FileLimiter::new(path_count + 1);
    let mut streams = Vec::with_capacity(path_count + 1);
    if let Some(ref_name) = &config.output_reference {
        streams.push(HaplotypeStream::new(
            (REF_SAMPLE_NUMBER, 0),
            ByteSink::create(
                config.output_dir.join(ref_name),
                config.overwrite,
                config.compress_output,
                Some(limiter.acquire()),
            )?,
        ));
    }
    for file in 0..path_count {
        streams.push(HaplotypeStream::new(
            (file + 1, 0),
            ByteSink::create(
                config.output_dir.join(format!("{}", file + 1)),
                config.overwrite,
                config.compress_output,
                Some(limiter.acquire()),
            )?,
        ));
    }

    let _task = registry.register("sequence writer");
    registry.poll_hup();

    reader.reset()?;
    reader.set_parsed_fields(VcfField::Alt);

    let mut handler = PathWriteHandler {
        writer: Some(SequenceWriter::new(
            &prep.reference,
            &config.null_allele,
            streams,
        )),
        checker: &prep.checker,
        subgraphs: &subgraphs,
        matchings: &matchings,
        permutation: (0..path_count).collect(),
        current: 0,
        consumed: 0,
        choices: Vec::new(),
    };
    VariantBuffer::new(DEFAULT_BUFFER_DEPTH).drive(reader, &mut handler)?;

    Ok(())
}
