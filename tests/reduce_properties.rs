//! Property-based tests for the sample reducer and the reduced pipeline
//!
//! Covers greedy slot packing, subgraph partitioning, and determinism of
//! the reduced-samples output.

use hapalign::graph::{find_cut_points, max_weight_assignment, partition, AltChecker, SvPolicy};
use hapalign::pipeline::{generate_haplotypes, GenerateConfig, SampleReducer};
use hapalign::vcf::{VcfField, VcfReader};
use proptest::prelude::*;
use std::collections::BTreeMap;

#[test]
fn test_greedy_packing_matches_interval_scenario() {
    // Three intervals [10,20], [15,25], [30,40]: two slots, the outer pair
    // sharing slot 0.
    let mut reducer = SampleReducer::new(false);
    reducer.handle_allele((1, 0), 4, 10, Some(1));
    reducer.handle_allele((1, 0), 5, 19, Some(1));
    reducer.handle_allele((2, 0), 6, 15, Some(1));
    reducer.handle_allele((2, 0), 7, 24, Some(1));
    reducer.handle_allele((3, 0), 8, 30, Some(1));
    reducer.handle_allele((3, 0), 9, 39, Some(1));
    reducer.finish();

    let map = reducer.assign_ranges_greedy();
    assert_eq!(map.width(), 2);

    let slot_of = |start: usize| {
        let idx = reducer
            .prepared()
            .iter()
            .position(|s| s.start_pos() == start)
            .unwrap();
        map.slot_of[idx]
    };
    assert_eq!(slot_of(10), 0);
    assert_eq!(slot_of(30), 0);
    assert_eq!(slot_of(15), 1);
}

/// Random non-overlapping-per-haplotype allele runs
fn arb_runs() -> impl Strategy<Value = Vec<(usize, usize, usize)>> {
    // (haplotype, start, length) with small coordinates
    proptest::collection::vec((0usize..6, 0usize..40, 1usize..6), 1..24)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// No slot column ever holds two overlapping intervals, and every
    /// prepared sequence is assigned to exactly one slot.
    #[test]
    fn prop_slots_never_overlap(runs in arb_runs()) {
        let mut reducer = SampleReducer::new(true);
        let mut lineno = 2usize;
        // Serialise the runs into per-haplotype sequences at increasing
        // line numbers; a REF allele afterwards closes each run.
        let mut sorted = runs;
        sorted.sort_by_key(|&(hap, start, _)| (hap, start));
        let mut last_end: BTreeMap<usize, usize> = BTreeMap::new();
        for &(hap, start, len) in &sorted {
            // Keep one haplotype's runs disjoint.
            let offset = last_end.get(&hap).copied().unwrap_or(0);
            let start = start.max(offset);
            for i in 0..len {
                reducer.handle_allele((hap, 0), lineno, start + i, Some(1));
                lineno += 1;
            }
            reducer.handle_allele((hap, 0), lineno, start + len, None);
            lineno += 1;
            last_end.insert(hap, start + len + 1);
        }
        reducer.finish();

        let map = reducer.assign_ranges_greedy();

        // Every sequence sits in exactly the slot recorded for it.
        for (idx, &slot) in map.slot_of.iter().enumerate() {
            let seq = &reducer.prepared()[idx];
            prop_assert_eq!(map.columns[slot].get(&seq.start_pos()), Some(&idx));
        }

        // Within each column, intervals are pairwise disjoint.
        for column in &map.columns {
            let mut previous_end = 0usize;
            for (&start, &idx) in column {
                prop_assert!(start >= previous_end);
                previous_end = reducer.prepared()[idx].end_pos();
            }
        }
    }

    /// The assignment solver returns a permutation and is deterministic.
    #[test]
    fn prop_assignment_is_a_permutation(seed in proptest::collection::vec(0i64..50, 16)) {
        let weight: Vec<Vec<i64>> = seed.chunks(4).map(|row| row.to_vec()).collect();
        let a = max_weight_assignment(&weight);
        let b = max_weight_assignment(&weight);
        prop_assert_eq!(&a, &b);

        let mut seen = vec![false; 4];
        for &col in &a {
            prop_assert!(!seen[col]);
            seen[col] = true;
        }
    }
}

const VCF_HEADER: &str = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2\n";

fn write_inputs(dir: &tempfile::TempDir, reference: &str, body: &str) -> (VcfReader, GenerateConfig) {
    let ref_path = dir.path().join("ref.fa");
    let vcf_path = dir.path().join("in.vcf");
    std::fs::write(&ref_path, format!(">chr1\n{}\n", reference)).unwrap();
    std::fs::write(&vcf_path, format!("{}{}", VCF_HEADER, body)).unwrap();

    let mut reader = VcfReader::from_path(&vcf_path, 0).unwrap();
    reader.read_header().unwrap();

    let mut config = GenerateConfig::new(&ref_path, &vcf_path);
    config.output_dir = dir.path().to_path_buf();
    (reader, config)
}

#[test]
fn test_partition_counts_cover_all_records() {
    let dir = tempfile::tempdir().unwrap();
    let body = "\
chr1\t2\t.\tC\tG\t.\t.\t.\tGT\t0|1\t0|0\n\
chr1\t10\t.\tC\tT\t.\t.\t.\tGT\t0|1\t1|0\n\
chr1\t20\t.\tC\tA\t.\t.\t.\tGT\t1|1\t0|0\n\
chr1\t30\t.\tC\tG\t.\t.\t.\tGT\t0|0\t0|1\n";
    let (mut reader, _config) = write_inputs(
        &dir,
        "ACGTACGTACGTACGTACGTACGTACGTACGT",
        body,
    );

    let mut checker = AltChecker::new(SvPolicy::Discard);
    reader.set_parsed_fields(VcfField::Alt);
    reader
        .parse(|view| {
            checker.check_record(view);
            Ok(true)
        })
        .unwrap();

    let scan = find_cut_points(&mut reader, &checker).unwrap();
    let end = reader.buffer_end();

    for min_len in [1usize, 40, 100, usize::MAX] {
        let ranges = partition(&scan, end, min_len);
        let total: usize = ranges.iter().map(|r| r.variant_count).sum();
        assert_eq!(total, scan.total_variants, "min_len {}", min_len);
        assert_eq!(ranges.first().unwrap().start_offset, scan.first_offset);
        assert_eq!(ranges.last().unwrap().end_offset, end);
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end_offset, pair[1].start_offset);
        }
    }
}

fn run_reduced(reference: &str, body: &str, paths: usize) -> BTreeMap<String, Vec<u8>> {
    let dir = tempfile::tempdir().unwrap();
    let (_reader, mut config) = write_inputs(&dir, reference, body);
    config.reduce_samples = true;
    config.generated_path_count = paths;
    config.output_reference = Some("REF".into());
    generate_haplotypes(&config).unwrap();

    let mut outputs = BTreeMap::new();
    for entry in std::fs::read_dir(dir.path()).unwrap() {
        let entry = entry.unwrap();
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == "ref.fa" || name == "in.vcf" {
            continue;
        }
        outputs.insert(name, std::fs::read(entry.path()).unwrap());
    }
    outputs
}

#[test]
fn test_reduced_outputs_are_aligned_and_deterministic() {
    let reference = "ACGTACGTACGTACGTACGTACGTACGTACGT";
    let body = "\
chr1\t2\t.\tC\tCAA\t.\t.\t.\tGT\t0|1\t0|0\n\
chr1\t10\t.\tC\tT\t.\t.\t.\tGT\t0|1\t1|0\n\
chr1\t20\t.\tC\tA\t.\t.\t.\tGT\t1|1\t0|0\n\
chr1\t30\t.\tC\tG\t.\t.\t.\tGT\t0|0\t0|1\n";

    let first = run_reduced(reference, body, 4);
    let second = run_reduced(reference, body, 4);
    assert_eq!(first, second);

    let len = first["REF"].len();
    assert_eq!(len, reference.len() + 2);
    for (name, bytes) in &first {
        assert_eq!(bytes.len(), len, "output {}", name);
    }

    // Every ALT appears in at least one generated path.
    let paths: Vec<&Vec<u8>> = first
        .iter()
        .filter(|(name, _)| name.as_str() != "REF")
        .map(|(_, bytes)| bytes)
        .collect();
    assert_eq!(paths.len(), 4);
    assert!(paths.iter().any(|p| p[11] == b'T'));
    assert!(paths.iter().any(|p| p[21] == b'A'));
    assert!(paths.iter().any(|p| p[31] == b'G'));
}

#[test]
fn test_reduced_capacity_error_names_the_subgraph() {
    // Three distinct ALTs at one position cannot fit into two paths.
    let reference = "ACGTACGT";
    let body = "chr1\t2\t.\tC\tA,G,T\t.\t.\t.\tGT\t1|2\t3|0\n";
    let dir = tempfile::tempdir().unwrap();
    let (_reader, mut config) = write_inputs(&dir, reference, body);
    config.reduce_samples = true;
    config.generated_path_count = 2;

    let err = generate_haplotypes(&config).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("needs 3 paths"), "got: {}", message);
}
