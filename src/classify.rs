use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use indexmap::IndexMap;

use crate::config::ValidateConfig;
use crate::mapping_table::{CandidateRegion, PositionMapping};
use crate::paf::AlignmentRecord;

/// Validation category assigned to a region, first matching rule wins:
/// `Validated` when enough supporting reads and coverage exist, `Partial`
/// when at least one supporting read exists, `Unsupported` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatedLevel {
    Validated,
    Partial,
    Unsupported,
}

impl ValidatedLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidatedLevel::Validated => "validated",
            ValidatedLevel::Partial => "partial",
            ValidatedLevel::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for ValidatedLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overlap length between two half-open intervals.
pub fn overlap_len(a0: u64, a1: u64, b0: u64, b1: u64) -> u64 {
    let lo = a0.max(b0);
    let hi = a1.min(b1);
    hi.saturating_sub(lo)
}

/// What one representative alignment says about its region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadEvidence {
    pub target_cov: f64,
    pub insert_overlap: u64,
    pub full_span: bool,
    pub single_junction: bool,
}

impl ReadEvidence {
    pub fn supports(&self) -> bool {
        self.full_span || self.single_junction
    }
}

/// Evidence in the extracted-sequence coordinate system: the target is
/// left flank + insert + right flank, so the insert window sits at
/// `[left_flank, tlen - right_flank)` after clamping flanks to the target.
pub fn compute_evidence(
    record: &AlignmentRecord,
    region: &CandidateRegion,
    config: &ValidateConfig,
) -> ReadEvidence {
    let tlen = record.tlen;
    let (tstart, tend) = (record.tstart, record.tend);
    let target_cov = if tlen > 0 {
        record.target_span() as f64 / tlen as f64
    } else {
        0.0
    };

    let left_flank = region.left_flank.min(tlen);
    let right_flank = region.right_flank.min(tlen);
    let insert_start = left_flank;
    let insert_end = insert_start.max(tlen.saturating_sub(right_flank));

    let left_ok =
        left_flank == 0 || overlap_len(tstart, tend, 0, left_flank) >= config.min_overlap_bp;
    let insert_ok = overlap_len(tstart, tend, insert_start, insert_end) >= config.min_overlap_bp;
    let right_ok =
        right_flank == 0 || overlap_len(tstart, tend, insert_end, tlen) >= config.min_overlap_bp;

    let full_span = target_cov >= config.min_target_cov
        && tstart <= config.edge_window
        && tend >= tlen.saturating_sub(config.edge_window)
        && left_ok
        && insert_ok
        && right_ok;

    let insert_overlap = overlap_len(tstart, tend, insert_start, insert_end);
    let crosses_left = tstart < insert_start && tend > insert_start;
    let crosses_right = tstart < insert_end && tend > insert_end;
    // A read's relationship is exclusive: full-span, else single-junction,
    // else neither. Keeps the support counters disjoint.
    let single_junction = !full_span
        && insert_overlap >= config.insert_min_overlap
        && (crosses_left || crosses_right);

    ReadEvidence {
        target_cov,
        insert_overlap,
        full_span,
        single_junction,
    }
}

/// Total order over a read's candidate records for one region: larger target
/// span, then larger aligned block, then higher mapq, then earlier target
/// start, then earlier query start. Total so that grouping cannot depend on
/// arrival order.
pub fn representative_order(a: &AlignmentRecord, b: &AlignmentRecord) -> Ordering {
    a.target_span()
        .cmp(&b.target_span())
        .then(a.block_len.cmp(&b.block_len))
        .then(a.mapq.cmp(&b.mapq))
        .then(b.tstart.cmp(&a.tstart))
        .then(b.qstart.cmp(&a.qstart))
}

/// Per-region accumulator, mutated as (read, region) representatives are
/// consumed and finalized into one output row.
#[derive(Debug, Default, Clone)]
struct RegionEvidence {
    full_span_reads: BTreeSet<String>,
    single_junction_reads: BTreeSet<String>,
    max_target_cov: f64,
    max_insert_overlap: u64,
    n_pairs: u64,
    tlen_seen: Option<u64>,
}

/// One finalized output row, one per region per sample.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionValidationRow {
    pub sample: String,
    pub type_label: String,
    pub region_id: String,
    pub validated_level: ValidatedLevel,
    pub extr_chrom: String,
    pub extr_start: u64,
    pub extr_end: u64,
    pub extr_length: u64,
    pub left_flank: u64,
    pub right_flank: u64,
    pub insert_length: u64,
    pub tlen: Option<u64>,
    pub n_full_span_reads: usize,
    pub n_single_junction_reads: usize,
    pub max_target_cov: f64,
    pub max_insert_overlap: u64,
    pub n_read_region_pairs: u64,
    pub orig_chrom: String,
    pub orig_start: u64,
    pub orig_end: u64,
    pub orig_length: u64,
    pub category: String,
}

/// Fixed column order; the cross-sample merge step checks this header.
pub const REGION_TABLE_HEADER: [&str; 22] = [
    "sample",
    "type",
    "region_id",
    "validated_level",
    "extr_chrom",
    "extr_start",
    "extr_end",
    "extr_length",
    "left_flank",
    "right_flank",
    "insert_length",
    "tlen",
    "n_full_span_reads",
    "n_single_junction_reads",
    "max_target_cov",
    "max_insert_overlap",
    "n_read_region_pairs",
    "orig_chrom",
    "orig_start",
    "orig_end",
    "orig_length",
    "category",
];

impl RegionValidationRow {
    pub fn to_tsv(&self) -> String {
        let tlen = self.tlen.map(|v| v.to_string()).unwrap_or_default();
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{:.6}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.sample,
            self.type_label,
            self.region_id,
            self.validated_level,
            self.extr_chrom,
            self.extr_start,
            self.extr_end,
            self.extr_length,
            self.left_flank,
            self.right_flank,
            self.insert_length,
            tlen,
            self.n_full_span_reads,
            self.n_single_junction_reads,
            self.max_target_cov,
            self.max_insert_overlap,
            self.n_read_region_pairs,
            self.orig_chrom,
            self.orig_start,
            self.orig_end,
            self.orig_length,
            self.category,
        )
    }
}

/// One row per (region, read) representative, emitted only on request.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadDetailRow {
    pub sample: String,
    pub type_label: String,
    pub region_id: String,
    pub qname: String,
    pub tlen: u64,
    pub tstart: u64,
    pub tend: u64,
    pub target_cov: f64,
    pub insert_overlap: u64,
    pub full_span: bool,
    pub single_junction: bool,
    pub mapq: u32,
    pub tp: Option<String>,
}

pub const READ_DETAIL_HEADER: [&str; 13] = [
    "sample",
    "type",
    "region_id",
    "qname",
    "tlen",
    "tstart",
    "tend",
    "target_cov",
    "insert_overlap",
    "full_span_evidence",
    "single_junction_evidence",
    "mapq",
    "tp",
];

impl ReadDetailRow {
    pub fn to_tsv(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{:.6}\t{}\t{}\t{}\t{}\t{}",
            self.sample,
            self.type_label,
            self.region_id,
            self.qname,
            self.tlen,
            self.tstart,
            self.tend,
            self.target_cov,
            self.insert_overlap,
            self.full_span as u8,
            self.single_junction as u8,
            self.mapq,
            self.tp.as_deref().unwrap_or(""),
        )
    }
}

/// Counters the classifier contributes to the sample QC record.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ClassifyStats {
    pub unique_pairs: u64,
    pub missing_region_meta: u64,
    pub tlen_vs_extr_length_mismatch_count: u64,
    pub tlen_vs_extr_length_max_abs_diff: u64,
    pub n_validated: u64,
    pub n_partial: u64,
    pub n_unsupported: u64,
}

pub struct ClassifyOutcome {
    pub rows: Vec<RegionValidationRow>,
    pub details: Vec<ReadDetailRow>,
    pub stats: ClassifyStats,
}

/// Groups filtered alignment records by (read, region), keeps one
/// representative per pair, and folds per-read evidence into one validation
/// row per candidate region of the sample.
pub struct RegionClassifier<'a> {
    sample: &'a str,
    mapping: &'a PositionMapping,
    config: &'a ValidateConfig,
    best_by_pair: IndexMap<(String, String), AlignmentRecord>,
}

impl<'a> RegionClassifier<'a> {
    pub fn new(sample: &'a str, mapping: &'a PositionMapping, config: &'a ValidateConfig) -> Self {
        RegionClassifier {
            sample,
            mapping,
            config,
            best_by_pair: IndexMap::new(),
        }
    }

    /// Associate one record with its region(s) and fold it into the per-pair
    /// representative. Targets named `<region_id>::...` associate directly;
    /// anything else is looked up against the extraction coordinate index
    /// with the edge window as slack.
    pub fn observe(&mut self, record: AlignmentRecord) {
        if let Some(region_id) = record.region_id().map(str::to_string) {
            self.fold_pair(region_id, record);
            return;
        }

        let start = record.tstart.saturating_sub(self.config.edge_window);
        let end = record.tend + self.config.edge_window;
        let hits: Vec<String> = self
            .mapping
            .find_overlapping(self.sample, &record.tname, start, end)
            .iter()
            .map(|r| r.region_id.clone())
            .collect();
        for region_id in hits {
            self.fold_pair(region_id, record.clone());
        }
    }

    fn fold_pair(&mut self, region_id: String, record: AlignmentRecord) {
        let key = (record.qname.clone(), region_id);
        match self.best_by_pair.entry(key) {
            indexmap::map::Entry::Occupied(mut entry) => {
                if representative_order(&record, entry.get()) == Ordering::Greater {
                    entry.insert(record);
                }
            }
            indexmap::map::Entry::Vacant(entry) => {
                entry.insert(record);
            }
        }
    }

    /// Consume the accumulated pairs and emit one row per region, in
    /// mapping-table order. Regions with no evidence still get a row.
    pub fn finalize(self) -> ClassifyOutcome {
        let type_label = self.config.insertion_type.as_str();
        let regions = self.mapping.regions_for_sample(self.sample);

        let mut stats = ClassifyStats {
            unique_pairs: self.best_by_pair.len() as u64,
            ..Default::default()
        };
        let mut evidence: HashMap<&str, RegionEvidence> = HashMap::new();
        let mut details: Vec<ReadDetailRow> = Vec::new();

        for ((qname, region_id), record) in &self.best_by_pair {
            let Some(region) = self.mapping.get(self.sample, region_id) else {
                stats.missing_region_meta += 1;
                continue;
            };

            let diff = record.tlen.abs_diff(region.extr_length);
            if diff != 0 {
                stats.tlen_vs_extr_length_mismatch_count += 1;
                stats.tlen_vs_extr_length_max_abs_diff =
                    stats.tlen_vs_extr_length_max_abs_diff.max(diff);
            }

            let ev = compute_evidence(record, region, self.config);
            let acc = evidence.entry(region.region_id.as_str()).or_default();
            acc.n_pairs += 1;
            acc.max_target_cov = acc.max_target_cov.max(ev.target_cov);
            acc.max_insert_overlap = acc.max_insert_overlap.max(ev.insert_overlap);
            acc.tlen_seen = Some(acc.tlen_seen.unwrap_or(0).max(record.tlen));
            if ev.full_span {
                acc.full_span_reads.insert(qname.clone());
            }
            if ev.single_junction {
                acc.single_junction_reads.insert(qname.clone());
            }

            if self.config.write_read_details {
                details.push(ReadDetailRow {
                    sample: self.sample.to_string(),
                    type_label: type_label.to_string(),
                    region_id: region.region_id.clone(),
                    qname: qname.clone(),
                    tlen: record.tlen,
                    tstart: record.tstart,
                    tend: record.tend,
                    target_cov: ev.target_cov,
                    insert_overlap: ev.insert_overlap,
                    full_span: ev.full_span,
                    single_junction: ev.single_junction,
                    mapq: record.mapq,
                    tp: record.tp.clone(),
                });
            }
        }

        let mut rows = Vec::with_capacity(regions.len());
        for region in regions {
            let acc = evidence.remove(region.region_id.as_str()).unwrap_or_default();
            let n_full = acc.full_span_reads.len();
            let n_single = acc.single_junction_reads.len();

            let level = if n_full + n_single >= self.config.min_support_reads
                && acc.max_target_cov >= self.config.min_target_cov
            {
                ValidatedLevel::Validated
            } else if n_full + n_single >= 1 {
                ValidatedLevel::Partial
            } else {
                ValidatedLevel::Unsupported
            };
            match level {
                ValidatedLevel::Validated => stats.n_validated += 1,
                ValidatedLevel::Partial => stats.n_partial += 1,
                ValidatedLevel::Unsupported => stats.n_unsupported += 1,
            }

            rows.push(RegionValidationRow {
                sample: self.sample.to_string(),
                type_label: type_label.to_string(),
                region_id: region.region_id.clone(),
                validated_level: level,
                extr_chrom: region.extr_chrom.clone(),
                extr_start: region.extr_start,
                extr_end: region.extr_end,
                extr_length: region.extr_length,
                left_flank: region.left_flank,
                right_flank: region.right_flank,
                insert_length: region.insert_length(),
                tlen: acc.tlen_seen,
                n_full_span_reads: n_full,
                n_single_junction_reads: n_single,
                max_target_cov: acc.max_target_cov,
                max_insert_overlap: acc.max_insert_overlap,
                n_read_region_pairs: acc.n_pairs,
                orig_chrom: region.orig_chrom.clone(),
                orig_start: region.orig_start,
                orig_end: region.orig_end,
                orig_length: region.orig_length,
                category: region.category.clone(),
            });
        }

        // Region table order, then read name: deterministic whatever the
        // arrival order of the alignment stream was.
        let region_rank: HashMap<&str, usize> = regions
            .iter()
            .enumerate()
            .map(|(i, r)| (r.region_id.as_str(), i))
            .collect();
        details.sort_by(|a, b| {
            let ra = region_rank.get(a.region_id.as_str()).copied().unwrap_or(usize::MAX);
            let rb = region_rank.get(b.region_id.as_str()).copied().unwrap_or(usize::MAX);
            ra.cmp(&rb).then_with(|| a.qname.cmp(&b.qname))
        });

        ClassifyOutcome {
            rows,
            details,
            stats,
        }
    }
}
