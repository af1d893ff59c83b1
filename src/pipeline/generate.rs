//! End-to-end haplotype generation
//!
//! Wires the preparation stage to one of the two output drivers and owns
//! the run configuration.

use std::path::{Path, PathBuf};

use crate::core::error::Result;
use crate::core::io::MappedFile;
use crate::core::report::MismatchReport;
use crate::graph::alt_check::SvPolicy;
use crate::graph::subgraph::partition;
use crate::pipeline::dispatch::install_hup_hook;
use crate::pipeline::prepare::prepare;
use crate::pipeline::{all_haplotypes, subgraphs};
use crate::vcf::VcfReader;

/// Configuration of one generation run
#[derive(Debug, Clone)]
pub struct GenerateConfig {
    pub reference_path: PathBuf,
    pub vcf_path: PathBuf,
    /// File name for the aligned reference, if wanted
    pub output_reference: Option<String>,
    /// File for REF/reference mismatch rows, if wanted
    pub report_path: Option<PathBuf>,
    /// Bytes emitted for missing alleles; first byte pads insertions
    pub null_allele: Vec<u8>,
    /// Haplotypes written per pass in all-haplotypes mode (0 = all at once)
    pub chunk_size: usize,
    /// Minimum subgraph length in source bytes (0 = sqrt of reference length)
    pub min_path_length: usize,
    /// Output paths in reduced-samples mode
    pub generated_path_count: usize,
    pub sv_policy: SvPolicy,
    pub overwrite: bool,
    pub check_ref: bool,
    pub reduce_samples: bool,
    pub print_subgraph_handling: bool,
    pub compress_output: bool,
    pub output_dir: PathBuf,
}

impl GenerateConfig {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(reference_path: P, vcf_path: Q) -> Self {
        Self {
            reference_path: reference_path.as_ref().to_path_buf(),
            vcf_path: vcf_path.as_ref().to_path_buf(),
            output_reference: None,
            report_path: None,
            null_allele: b"-".to_vec(),
            chunk_size: 0,
            min_path_length: 0,
            generated_path_count: 16,
            sv_policy: SvPolicy::Discard,
            overwrite: false,
            check_ref: false,
            reduce_samples: false,
            print_subgraph_handling: false,
            compress_output: false,
            output_dir: PathBuf::from("."),
        }
    }
}

/// Read the reference and VCF, then emit every haplotype stream
pub fn generate_haplotypes(config: &GenerateConfig) -> Result<()> {
    if let Err(e) = install_hup_hook() {
        log::warn!("Could not install SIGHUP handler: {}", e);
    }

    // Reduced-samples mode maps the file so subgraph tasks can share it.
    let mut reader = if config.reduce_samples {
        VcfReader::from_mapped(MappedFile::open(&config.vcf_path)?)
    } else {
        VcfReader::from_path(&config.vcf_path, 0)?
    };

    log::info!("Reading the VCF header");
    reader.read_header()?;

    let mut report = match &config.report_path {
        Some(path) => MismatchReport::create(path, config.overwrite)?,
        None => MismatchReport::disabled(),
    };

    let prep = prepare(
        &mut reader,
        &config.reference_path,
        config.sv_policy,
        config.check_ref,
        &mut report,
        config.reduce_samples,
    )?;

    if config.reduce_samples {
        let min_path_length = if config.min_path_length == 0 {
            let derived = (prep.reference.len() as f64).sqrt().ceil() as usize;
            log::info!("Set minimum path length to {}", derived);
            derived
        } else {
            config.min_path_length
        };
        let ranges = partition(&prep.scan, reader.buffer_end(), min_path_length);
        log::info!("Processing {} subgraphs", ranges.len());
        subgraphs::run(&mut reader, &prep, config, &ranges)?;
    } else {
        all_haplotypes::run(&mut reader, &prep, config)?;
    }

    report.finish()?;
    Ok(())
}
