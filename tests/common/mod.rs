use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

pub const MAPPING_HEADER: &str = "sample,region_id,category,orig_chrom,orig_start,orig_end,orig_length,extr_chrom,extr_start,extr_end,extr_length,left_flank,right_flank,total_flank";

/// Write a mapping CSV with the standard header plus the given rows.
pub fn write_mapping_csv(dir: &Path, rows: &[&str]) -> PathBuf {
    let path = dir.join("position_mapping.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "{MAPPING_HEADER}").unwrap();
    for row in rows {
        writeln!(file, "{row}").unwrap();
    }
    path
}

/// Write a PAF file under the sample naming convention.
pub fn write_paf(dir: &Path, sample: &str, lines: &[&str]) -> PathBuf {
    let path = dir.join(format!("{sample}_numt_mapped.paf"));
    let mut file = std::fs::File::create(&path).unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    path
}

/// A PAF line for a read aligned to an extracted region target.
pub fn paf_line(qname: &str, tname: &str, tlen: u64, tstart: u64, tend: u64, mapq: u32) -> String {
    let span = tend - tstart;
    format!(
        "{qname}\t{qlen}\t0\t{span}\t+\t{tname}\t{tlen}\t{tstart}\t{tend}\t{span}\t{span}\t{mapq}\ttp:A:P",
        qlen = tlen + 5000,
    )
}

pub fn workspace() -> TempDir {
    tempfile::tempdir().unwrap()
}
