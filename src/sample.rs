use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::classify::{RegionClassifier, READ_DETAIL_HEADER, REGION_TABLE_HEADER};
use crate::config::ValidateConfig;
use crate::error::{Result, ValidateError};
use crate::mapping_table::PositionMapping;
use crate::paf::PafReader;
use crate::qc::QcRecord;

/// Artifacts written for one sample.
#[derive(Debug)]
pub struct SampleOutput {
    pub qc: QcRecord,
    pub n_rows: usize,
    pub region_table: PathBuf,
    pub qc_path: PathBuf,
    pub read_details: Option<PathBuf>,
}

/// Process one sample end to end: stream the PAF once, classify every region
/// of the sample, and write the region table, QC record, and optional
/// read-detail table under `<out_root>/<type>/<sample>/`.
///
/// Outputs land via temp-file-and-rename in the destination directory, and
/// only after classification finished, so a failed sample leaves no partial
/// artifact behind for the merge step to pick up.
pub fn run_sample(
    sample: &str,
    paf_path: &Path,
    mapping: &PositionMapping,
    config: &ValidateConfig,
    out_root: &Path,
) -> Result<SampleOutput> {
    let mut reader = PafReader::open(paf_path)?;
    let mut classifier = RegionClassifier::new(sample, mapping, config);
    while let Some(record) = reader.next_record(config)? {
        classifier.observe(record);
    }
    let counts = reader.counts();
    let outcome = classifier.finalize();
    let qc = QcRecord::new(sample, paf_path, config, counts, outcome.stats);

    log::info!(
        "{sample}: {} records in, {} kept, {} pairs, {} regions ({} validated)",
        counts.total_records,
        counts.kept_records,
        outcome.stats.unique_pairs,
        outcome.rows.len(),
        outcome.stats.n_validated,
    );

    let sample_dir = out_root.join(config.insertion_type.as_str()).join(sample);
    fs::create_dir_all(&sample_dir)?;

    let mut table = String::new();
    table.push_str(&REGION_TABLE_HEADER.join("\t"));
    table.push('\n');
    for row in &outcome.rows {
        table.push_str(&row.to_tsv());
        table.push('\n');
    }
    let region_table = write_atomic(&sample_dir, "region_validation.tsv", &table)?;

    let qc_json = qc
        .to_json()
        .map_err(|e| ValidateError::Io(std::io::Error::other(e)))?;
    let qc_path = write_atomic(&sample_dir, "qc.json", &qc_json)?;

    let read_details = if config.write_read_details {
        let mut detail = String::new();
        detail.push_str(&READ_DETAIL_HEADER.join("\t"));
        detail.push('\n');
        for row in &outcome.details {
            detail.push_str(&row.to_tsv());
            detail.push('\n');
        }
        Some(write_atomic(&sample_dir, "read_details.tsv", &detail)?)
    } else {
        None
    };

    Ok(SampleOutput {
        qc,
        n_rows: outcome.rows.len(),
        region_table,
        qc_path,
        read_details,
    })
}

fn write_atomic(dir: &Path, name: &str, content: &str) -> Result<PathBuf> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    let path = dir.join(name);
    tmp.persist(&path).map_err(|e| ValidateError::Io(e.error))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InsertionType;
    use std::io::Write as _;

    const HEADER: &str = "sample,region_id,category,orig_chrom,orig_start,orig_end,orig_length,extr_chrom,extr_start,extr_end,extr_length,left_flank,right_flank,total_flank";

    #[test]
    fn missing_paf_writes_nothing() {
        let out = tempfile::tempdir().unwrap();
        let mut csv = NamedTempFile::new().unwrap();
        writeln!(
            csv,
            "{HEADER}\ns1,r1,mt,MT,0,500,500,chr1,1000,15000,14000,2000,2000,4000"
        )
        .unwrap();
        let mapping = PositionMapping::load(csv.path()).unwrap();
        let config = ValidateConfig::new(InsertionType::Numt);

        let err = run_sample(
            "s1",
            Path::new("/no/such/s1_numt_mapped.paf"),
            &mapping,
            &config,
            out.path(),
        )
        .unwrap_err();
        assert!(matches!(err, ValidateError::MissingInput { .. }));
        assert!(!out.path().join("numt/s1/region_validation.tsv").exists());
        assert!(!out.path().join("numt/s1/qc.json").exists());
    }
}
