use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

use orgval::config::{InsertionType, ValidateConfig};
use orgval::mapping_table::PositionMapping;
use orgval::merge::{merge_qc_records, merge_region_tables};
use orgval::sample::{run_sample, SampleOutput};

/// orgval - validate candidate organelle-DNA insertions against long reads
///
/// Re-examines per-sample PAF alignments of long reads to extracted candidate
/// sequences and classifies every candidate region as validated, partial, or
/// unsupported.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Insertion type to process: numt or nupt
    #[clap(long = "type", value_parser = InsertionType::parse)]
    insertion_type: InsertionType,

    /// Directory holding per-sample PAF files named <sample>_<type>_mapped.paf
    #[clap(long = "paf-dir")]
    paf_dir: PathBuf,

    /// Position mapping CSV describing the candidate regions
    #[clap(long = "position-mapping-csv")]
    position_mapping_csv: PathBuf,

    /// Output directory root
    #[clap(long = "out-dir")]
    out_dir: PathBuf,

    /// Comma-separated sample ids to process (default: all discovered)
    #[clap(long = "samples", default_value = "")]
    samples: String,

    /// Minimum mapping quality
    #[clap(long = "mapq-min", default_value = "20")]
    mapq_min: u32,

    /// Comma-separated tp tags to include, e.g. P or P,S
    #[clap(long = "include-tp", default_value = "P")]
    include_tp: String,

    /// Slack at each target end when testing full-span alignment (bp)
    #[clap(long = "edge-window", default_value = "200")]
    edge_window: u64,

    /// Minimum target coverage fraction
    #[clap(long = "min-target-cov", default_value = "0.95")]
    min_target_cov: f64,

    /// Minimum overlap with each boundary window (bp)
    #[clap(long = "min-overlap-bp", default_value = "1")]
    min_overlap_bp: u64,

    /// Minimum insert overlap for single-junction evidence (bp)
    #[clap(long = "insert-min-overlap", default_value = "10000")]
    insert_min_overlap: u64,

    /// Supporting reads required to call a region validated
    #[clap(long = "min-support-reads", default_value = "2")]
    min_support_reads: usize,

    /// Also write a per-(read, region) detail table per sample
    #[clap(long = "write-read-details")]
    write_read_details: bool,

    /// Skip the in-process cross-sample combination (for parallel drivers)
    #[clap(long = "no-combined")]
    no_combined: bool,

    /// Number of threads for parallel sample processing
    #[clap(short = 't', long = "threads", default_value = "8")]
    threads: usize,

    /// Quiet mode (no progress output)
    #[clap(long = "quiet")]
    quiet: bool,
}

/// Find `<sample>_<type>_mapped.paf[.gz]` files and pair them with their
/// sample ids (filename prefix up to the first underscore), sorted by sample.
fn discover_samples(args: &Args) -> Result<Vec<(String, PathBuf)>> {
    let suffix_plain = format!("_{}_mapped.paf", args.insertion_type);
    let suffix_gz = format!("{suffix_plain}.gz");

    let mut found = Vec::new();
    let entries = std::fs::read_dir(&args.paf_dir)
        .with_context(|| format!("reading PAF directory {}", args.paf_dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !(name.ends_with(&suffix_plain) || name.ends_with(&suffix_gz)) {
            continue;
        }
        let sample = name.split('_').next().unwrap_or(name).to_string();
        found.push((sample, path));
    }
    found.sort();

    if found.is_empty() {
        bail!(
            "no PAF files matched *{suffix_plain} in {}",
            args.paf_dir.display()
        );
    }

    let keep: BTreeSet<&str> = args
        .samples
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if !keep.is_empty() {
        found.retain(|(sample, _)| keep.contains(sample.as_str()));
        if found.is_empty() {
            bail!("no PAF files matched requested samples: {keep:?}");
        }
    }

    Ok(found)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = ValidateConfig {
        insertion_type: args.insertion_type,
        mapq_min: args.mapq_min,
        include_tp: args
            .include_tp
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        edge_window: args.edge_window,
        min_target_cov: args.min_target_cov,
        min_overlap_bp: args.min_overlap_bp,
        insert_min_overlap: args.insert_min_overlap,
        min_support_reads: args.min_support_reads,
        write_read_details: args.write_read_details,
    };
    config.validate()?;

    let mapping = PositionMapping::load(&args.position_mapping_csv).with_context(|| {
        format!(
            "loading position mapping {}",
            args.position_mapping_csv.display()
        )
    })?;

    let sample_paths = discover_samples(&args)?;

    rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build_global()?;

    let progress = if !args.quiet {
        let pb = ProgressBar::new(sample_paths.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:30}] {pos}/{len} {msg}")
                .unwrap(),
        );
        pb.set_message(format!("validating {} regions", args.insertion_type));
        Some(pb)
    } else {
        None
    };

    // Each sample writes to its own directory, so the fan-out shares nothing
    // but the read-only mapping table.
    let results: Vec<(String, std::result::Result<SampleOutput, String>)> = sample_paths
        .par_iter()
        .map(|(sample, paf_path)| {
            let outcome = run_sample(sample, paf_path, &mapping, &config, &args.out_dir)
                .map_err(|e| e.to_string());
            if let Some(pb) = &progress {
                pb.inc(1);
            }
            (sample.clone(), outcome)
        })
        .collect();

    if let Some(pb) = &progress {
        pb.finish_with_message("done");
    }

    let mut outputs = Vec::new();
    let mut n_failed = 0usize;
    for (sample, result) in results {
        match result {
            Ok(output) => {
                log::info!("{sample}: {} region rows written", output.n_rows);
                outputs.push(output);
            }
            Err(err) => {
                n_failed += 1;
                eprintln!("sample {sample} failed: {err}");
            }
        }
    }

    if !args.no_combined && !outputs.is_empty() {
        let type_dir = args.out_dir.join(args.insertion_type.as_str());
        let tables: Vec<PathBuf> = outputs.iter().map(|o| o.region_table.clone()).collect();
        let n_rows = merge_region_tables(&tables, &type_dir.join("all_samples_region_validation.tsv"))?;
        let qc_records: Vec<_> = outputs.iter().map(|o| o.qc.clone()).collect();
        merge_qc_records(&qc_records, &type_dir.join("qc_all_samples.json"))?;
        if !args.quiet {
            eprintln!(
                "combined {} rows from {} samples",
                n_rows,
                outputs.len()
            );
        }
    }

    if n_failed > 0 {
        bail!("{n_failed} sample(s) failed");
    }
    Ok(())
}
