//! All-haplotypes output mode
//!
//! One output file per (sample, chromosome copy), named `<sample>-<copy>`.
//! Haplotypes are written in rounds of `chunk_size` open files; every round
//! replays the whole VCF, and haplotypes outside the round still flow
//! through the writer with discarding sinks so padding decisions are
//! identical in every round.

use rayon::prelude::*;
use std::collections::HashSet;
use std::path::Path;

use crate::core::error::Result;
use crate::core::io::{ByteSink, FileLimiter};
use crate::graph::alt_check::AltChecker;
use crate::pipeline::buffer::{VariantBuffer, VariantHandler, DEFAULT_BUFFER_DEPTH};
use crate::pipeline::dispatch::TaskRegistry;
use crate::pipeline::generate::GenerateConfig;
use crate::pipeline::prepare::Preparation;
use crate::pipeline::writer::{HaplotypeStream, SequenceWriter};
use crate::pipeline::{HaplotypeId, REF_SAMPLE_NUMBER};
use crate::vcf::{RecordBuf, VcfField, VcfReader};

/// Routes decoded genotypes into the sequence writer
struct GenotypeHandler<'a> {
    writer: Option<SequenceWriter<'a>>,
    checker: &'a AltChecker,
    ploidy: &'a [usize],
    choices: Vec<(HaplotypeId, u8)>,
}

impl VariantHandler for GenotypeHandler<'_> {
    fn handle_variant(&mut self, record: &RecordBuf) -> Result<()> {
        if self.checker.is_skipped(record.lineno()) {
            return Ok(());
        }
        let lineno = record.lineno();
        let checker = self.checker;
        self.choices.clear();
        let choices = &mut self.choices;
        record.for_each_genotype(self.ploidy, |sample_no, chr_idx, alt_idx, _phased| {
            if alt_idx != 0 && checker.is_valid_alt(lineno, alt_idx) {
                choices.push(((sample_no, chr_idx), alt_idx));
            }
        })?;
        self.writer
            .as_mut()
            .expect("writer taken before finish")
            .handle_variant(record, &self.choices)
    }

    fn finish(&mut self) -> Result<()> {
        let writer = self.writer.take().expect("finish called twice");
        let streams = writer.finish()?;
        // Closes flush in parallel; the round completes when every close has.
        streams
            .into_par_iter()
            .try_for_each(|stream| stream.into_sink().finish())?;
        Ok(())
    }
}

/// Write one file per haplotype plus the optional REF file
pub fn run(reader: &mut VcfReader, prep: &Preparation, config: &GenerateConfig) -> Result<()> {
    let names = reader.sample_names().to_vec();
    let mut all_ids: Vec<(HaplotypeId, String)> = Vec::with_capacity(prep.haplotype_count());
    for (i, name) in names.iter().enumerate() {
        for copy in 0..prep.ploidy[i] {
            all_ids.push(((i + 1, copy as u8), format!("{}-{}", name, copy + 1)));
        }
    }

    let chunk = if config.chunk_size == 0 {
        all_ids.len().max(1)
    } else {
        config.chunk_size
    };
    let limiter = FileLimiter::new(chunk + 1);
    let registry = TaskRegistry::new();
    let buffer = VariantBuffer::new(DEFAULT_BUFFER_DEPTH);

    let rounds = all_ids.len().div_ceil(chunk).max(1);
    log::info!(
        "Writing {} haplotypes in {} round(s) of at most {}",
        all_ids.len(),
        rounds,
        chunk
    );

    let mut batches = all_ids.chunks(chunk);
    for round in 0..rounds {
        let batch = batches.next().unwrap_or(&[]);
        let _task = registry.register(format!("haplotype round {}/{}", round + 1, rounds));
        registry.poll_hup();

        let active: HashSet<HaplotypeId> = batch.iter().map(|&(id, _)| id).collect();
        let mut streams = Vec::with_capacity(all_ids.len() + 1);

        if round == 0 {
            if let Some(ref_name) = &config.output_reference {
                let path = config.output_dir.join(ref_name);
                streams.push(HaplotypeStream::new(
                    (REF_SAMPLE_NUMBER, 0),
                    open_sink(&path, config, &limiter)?,
                ));
            }
        }
        for (id, name) in &all_ids {
            let sink = if active.contains(id) {
                open_sink(&config.output_dir.join(name), config, &limiter)?
            } else {
                ByteSink::null()
            };
            streams.push(HaplotypeStream::new(*id, sink));
        }

        reader.reset()?;
        reader.set_parsed_fields(VcfField::All);

        let mut handler = GenotypeHandler {
            writer: Some(SequenceWriter::new(
                &prep.reference,
                &config.null_allele,
                streams,
            )),
            checker: &prep.checker,
            ploidy: &prep.ploidy,
            choices: Vec::new(),
        };
        buffer.drive(reader, &mut handler)?;
    }

    Ok(())
}

fn open_sink(path: &Path, config: &GenerateConfig, limiter: &FileLimiter) -> Result<ByteSink> {
    Ok(ByteSink::create(
        path,
        config.overwrite,
        config.compress_output,
        Some(limiter.acquire()),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::report::MismatchReport;
    use crate::pipeline::prepare::prepare;

    fn run_mode(
        reference: &str,
        vcf: &str,
        config_tweak: impl FnOnce(&mut GenerateConfig),
    ) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();

        let fasta_path = dir.path().join("ref.fa");
        std::fs::write(&fasta_path, format!(">chr1\n{}\n", reference)).unwrap();
        let vcf_path = dir.path().join("in.vcf");
        std::fs::write(&vcf_path, vcf).unwrap();

        let mut config = GenerateConfig::new(&fasta_path, &vcf_path);
        config.output_dir = dir.path().to_path_buf();
        config_tweak(&mut config);

        let mut reader = VcfReader::from_path(&vcf_path, 0).unwrap();
        reader.read_header().unwrap();
        let mut report = MismatchReport::disabled();
        let prep = prepare(
            &mut reader,
            &fasta_path,
            config.sv_policy,
            false,
            &mut report,
            false,
        )
        .unwrap();

        run(&mut reader, &prep, &config).unwrap();
        dir
    }

    fn read(dir: &tempfile::TempDir, name: &str) -> Vec<u8> {
        std::fs::read(dir.path().join(name)).unwrap()
    }

    const HEADER: &str = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\n";

    #[test]
    fn test_reference_only_vcf() {
        let dir = run_mode("ACGT", HEADER, |_| {});
        assert_eq!(read(&dir, "S1-1"), b"ACGT");
        assert_eq!(read(&dir, "S1-2"), b"ACGT");
    }

    #[test]
    fn test_single_snp() {
        let vcf = format!("{HEADER}chr1\t2\t.\tC\tG\t.\t.\t.\tGT\t0|1\n");
        let dir = run_mode("ACGT", &vcf, |_| {});
        assert_eq!(read(&dir, "S1-1"), b"ACGT");
        assert_eq!(read(&dir, "S1-2"), b"AGGT");
    }

    #[test]
    fn test_chunked_rounds_stay_aligned() {
        // chunk_size 1 forces one round per haplotype; the insertion must
        // pad both files identically.
        let vcf = format!("{HEADER}chr1\t2\t.\tC\tCAT\t.\t.\t.\tGT\t0|1\n");
        let dir = run_mode("ACGT", &vcf, |c| c.chunk_size = 1);
        assert_eq!(read(&dir, "S1-1"), b"AC--GT");
        assert_eq!(read(&dir, "S1-2"), b"ACATGT");
    }

    #[test]
    fn test_skipped_sv_record_leaves_reference() {
        let vcf = format!(
            "{HEADER}\
chr1\t2\t.\tC\t<DEL>\t.\t.\t.\tGT\t0|1\n\
chr1\t3\t.\tG\tT\t.\t.\t.\tGT\t1|0\n"
        );
        let dir = run_mode("ACGT", &vcf, |_| {});
        assert_eq!(read(&dir, "S1-1"), b"ACTT");
        assert_eq!(read(&dir, "S1-2"), b"ACGT");
    }

    #[test]
    fn test_reference_output_file() {
        let vcf = format!("{HEADER}chr1\t2\t.\tC\tCAT\t.\t.\t.\tGT\t0|1\n");
        let dir = run_mode("ACGT", &vcf, |c| {
            c.output_reference = Some("REF".into());
        });
        assert_eq!(read(&dir, "REF"), b"AC--GT");
    }
}
