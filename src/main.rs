//! hapalign CLI entry point
//!
//! Generates multiply-aligned haplotype sequences from a reference FASTA
//! and a VCF file.

use clap::{Parser, ValueEnum};
use hapalign::pipeline::{generate_haplotypes, GenerateConfig};
use hapalign::SvPolicy;
use std::path::PathBuf;
use std::time::Instant;

/// Structural-variant handling (CLI enum)
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum SvPolicyArg {
    /// Keep `*` and symbolic ALT alleles (emitted as the null allele)
    #[value(name = "keep")]
    Keep,
    /// Skip every structural ALT allele
    #[default]
    #[value(name = "discard")]
    Discard,
    /// Keep `*` alleles only
    #[value(name = "keep-asterisks-only")]
    KeepAsterisksOnly,
}

impl From<SvPolicyArg> for SvPolicy {
    fn from(arg: SvPolicyArg) -> Self {
        match arg {
            SvPolicyArg::Keep => SvPolicy::Keep,
            SvPolicyArg::Discard => SvPolicy::Discard,
            SvPolicyArg::KeepAsterisksOnly => SvPolicy::KeepAsterisksOnly,
        }
    }
}

#[derive(Parser)]
#[command(name = "hapalign")]
#[command(about = "Multiply-aligned haplotype sequences from a reference FASTA and a VCF")]
#[command(version)]
struct Cli {
    /// Reference FASTA file (only the first sequence is read)
    reference: PathBuf,

    /// Variant call file, sorted by POS
    variants: PathBuf,

    /// Also write the aligned reference to this file
    #[arg(long = "output-reference")]
    output_reference: Option<String>,

    /// Write REF/reference mismatches to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Byte sequence emitted for missing alleles; its first byte pads
    /// insertion columns
    #[arg(long = "null-allele", default_value = "-")]
    null_allele: String,

    /// Haplotypes written per pass in all-haplotypes mode (0 = all at once)
    #[arg(long = "chunk-size", default_value = "0")]
    chunk_size: usize,

    /// Minimum subgraph length in source bytes (0 = sqrt of reference length)
    #[arg(long = "min-path-length", default_value = "0")]
    min_path_length: usize,

    /// Number of output paths in reduced-samples mode
    #[arg(short = 'p', long = "generated-paths", default_value = "16")]
    generated_paths: usize,

    /// Structural-variant handling
    #[arg(long = "structural-variants", default_value = "discard")]
    structural_variants: SvPolicyArg,

    /// Overwrite existing output files
    #[arg(short = 'f', long)]
    overwrite: bool,

    /// Compare the REF column to the reference and report mismatches
    #[arg(long = "check-ref")]
    check_ref: bool,

    /// Pack all haplotypes into the generated paths instead of writing one
    /// file per haplotype
    #[arg(long = "reduce-samples")]
    reduce_samples: bool,

    /// Log each subgraph's extent before processing
    #[arg(long = "print-subgraphs")]
    print_subgraphs: bool,

    /// Gzip-compress every output file
    #[arg(short = 'z', long = "compress-output")]
    compress_output: bool,

    /// Directory output files are written to
    #[arg(long = "output-dir", default_value = ".")]
    output_dir: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let start = Instant::now();

    let mut config = GenerateConfig::new(&cli.reference, &cli.variants);
    config.output_reference = cli.output_reference;
    config.report_path = cli.report;
    config.null_allele = cli.null_allele.into_bytes();
    config.chunk_size = cli.chunk_size;
    config.min_path_length = cli.min_path_length;
    config.generated_path_count = cli.generated_paths;
    config.sv_policy = cli.structural_variants.into();
    config.overwrite = cli.overwrite;
    config.check_ref = cli.check_ref;
    config.reduce_samples = cli.reduce_samples;
    config.print_subgraph_handling = cli.print_subgraphs;
    config.compress_output = cli.compress_output;
    config.output_dir = cli.output_dir;

    generate_haplotypes(&config)?;

    eprintln!("Time elapsed: {:.2}s", start.elapsed().as_secs_f64());
    Ok(())
}
