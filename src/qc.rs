use std::collections::BTreeSet;
use std::path::Path;

use serde::Serialize;

use crate::classify::ClassifyStats;
use crate::config::ValidateConfig;
use crate::paf::FilterCounts;

/// Per-sample QC document, written as `qc.json` next to the region table and
/// collected across samples by the merge step. Pure bookkeeping; nothing in
/// here feeds back into classification.
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct QcRecord {
    pub sample: String,
    #[serde(rename = "type")]
    pub type_label: String,
    pub paf_path: String,
    pub generated_at: String,
    pub mapq_min: u32,
    pub include_tp: BTreeSet<String>,
    pub total_records: u64,
    pub filtered_mapq: u64,
    pub filtered_tag: u64,
    pub malformed_records: u64,
    pub kept_records: u64,
    pub unique_pairs: u64,
    pub missing_region_meta: u64,
    pub tlen_vs_extr_length_mismatch_count: u64,
    pub tlen_vs_extr_length_max_abs_diff: u64,
    pub regions_total: u64,
    pub regions_validated: u64,
    pub regions_partial: u64,
    pub regions_unsupported: u64,
}

impl QcRecord {
    pub fn new(
        sample: &str,
        paf_path: &Path,
        config: &ValidateConfig,
        reader: FilterCounts,
        classify: ClassifyStats,
    ) -> Self {
        QcRecord {
            sample: sample.to_string(),
            type_label: config.insertion_type.as_str().to_string(),
            paf_path: paf_path.display().to_string(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            mapq_min: config.mapq_min,
            include_tp: config.include_tp.clone(),
            total_records: reader.total_records,
            filtered_mapq: reader.filtered_mapq,
            filtered_tag: reader.filtered_tag,
            malformed_records: reader.malformed_records,
            kept_records: reader.kept_records,
            unique_pairs: classify.unique_pairs,
            missing_region_meta: classify.missing_region_meta,
            tlen_vs_extr_length_mismatch_count: classify.tlen_vs_extr_length_mismatch_count,
            tlen_vs_extr_length_max_abs_diff: classify.tlen_vs_extr_length_max_abs_diff,
            regions_total: classify.n_validated + classify.n_partial + classify.n_unsupported,
            regions_validated: classify.n_validated,
            regions_partial: classify.n_partial,
            regions_unsupported: classify.n_unsupported,
        }
    }

    /// Records read must be fully accounted for by kept + dropped.
    pub fn counters_balance(&self) -> bool {
        self.kept_records + self.filtered_mapq + self.filtered_tag + self.malformed_records
            == self.total_records
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
