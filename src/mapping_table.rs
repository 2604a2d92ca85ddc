use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use indexmap::IndexMap;

use crate::error::{Result, ValidateError};

/// Required columns of the position mapping CSV, in no particular order.
const REQUIRED_COLUMNS: [&str; 14] = [
    "sample",
    "region_id",
    "category",
    "orig_chrom",
    "orig_start",
    "orig_end",
    "orig_length",
    "extr_chrom",
    "extr_start",
    "extr_end",
    "extr_length",
    "left_flank",
    "right_flank",
    "total_flank",
];

/// One candidate insertion locus: the organelle-side origin coordinates and
/// the nuclear-side extraction coordinates, plus the flank lengths that were
/// added around the insert when the candidate sequence was extracted.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRegion {
    pub sample: String,
    pub region_id: String,
    pub category: String,
    pub orig_chrom: String,
    pub orig_start: u64,
    pub orig_end: u64,
    pub orig_length: u64,
    pub extr_chrom: String,
    pub extr_start: u64,
    pub extr_end: u64,
    pub extr_length: u64,
    pub left_flank: u64,
    pub right_flank: u64,
    pub total_flank: u64,
}

impl CandidateRegion {
    /// Insert length implied by the extraction minus both flanks.
    pub fn insert_length(&self) -> u64 {
        self.extr_length
            .saturating_sub(self.left_flank)
            .saturating_sub(self.right_flank)
    }
}

/// Candidate regions loaded from the position mapping CSV, keyed for lookup
/// by region id and by extraction coordinate range. Read-only after load.
#[derive(Debug)]
pub struct PositionMapping {
    /// Sample -> regions in file order. That order fixes output row order.
    by_sample: IndexMap<String, Vec<CandidateRegion>>,
    /// (sample, region_id) -> index into the sample's region vector.
    by_id: HashMap<(String, String), usize>,
    /// (sample, extr_chrom) -> (extr_start, extr_end, region index), sorted
    /// by start for the overlap lookup.
    interval_index: HashMap<(String, String), Vec<(u64, u64, usize)>>,
}

impl PositionMapping {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ValidateError::MissingInput {
                path: path.to_path_buf(),
            });
        }
        let reader = BufReader::new(File::open(path)?);
        Self::from_reader(reader, path)
    }

    fn from_reader<R: BufRead>(reader: R, path: &Path) -> Result<Self> {
        let mut lines = reader.lines().enumerate();

        let header_line = match lines.next() {
            Some((_, line)) => line?,
            None => return Err(ValidateError::mapping(path, 1, "empty mapping table")),
        };
        let columns: Vec<&str> = header_line.trim_end().split(',').collect();
        let mut col_idx: HashMap<&str, usize> = HashMap::new();
        for (i, name) in columns.iter().enumerate() {
            col_idx.entry(name.trim()).or_insert(i);
        }
        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .filter(|c| !col_idx.contains_key(**c))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(ValidateError::mapping(
                path,
                1,
                format!("missing columns: {}", missing.join(", ")),
            ));
        }

        let mut mapping = PositionMapping {
            by_sample: IndexMap::new(),
            by_id: HashMap::new(),
            interval_index: HashMap::new(),
        };

        for (line_idx, line) in lines {
            let line = line?;
            let line_no = line_idx + 1;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.trim_end().split(',').collect();
            if fields.len() < columns.len() {
                return Err(ValidateError::mapping(
                    path,
                    line_no,
                    format!(
                        "expected {} fields, found {}",
                        columns.len(),
                        fields.len()
                    ),
                ));
            }

            let get = |name: &str| fields[col_idx[name]].trim();
            let get_u64 = |name: &str| -> Result<u64> {
                get(name).parse().map_err(|_| {
                    ValidateError::mapping(
                        path,
                        line_no,
                        format!("non-numeric {name} '{}'", get(name)),
                    )
                })
            };

            let region = CandidateRegion {
                sample: get("sample").to_string(),
                region_id: get("region_id").to_string(),
                category: get("category").to_string(),
                orig_chrom: get("orig_chrom").to_string(),
                orig_start: get_u64("orig_start")?,
                orig_end: get_u64("orig_end")?,
                orig_length: get_u64("orig_length")?,
                extr_chrom: get("extr_chrom").to_string(),
                extr_start: get_u64("extr_start")?,
                extr_end: get_u64("extr_end")?,
                extr_length: get_u64("extr_length")?,
                left_flank: get_u64("left_flank")?,
                right_flank: get_u64("right_flank")?,
                total_flank: get_u64("total_flank")?,
            };

            if region.orig_start >= region.orig_end {
                return Err(ValidateError::mapping(
                    path,
                    line_no,
                    format!(
                        "inverted origin coordinates {}..{}",
                        region.orig_start, region.orig_end
                    ),
                ));
            }
            if region.extr_start >= region.extr_end {
                return Err(ValidateError::mapping(
                    path,
                    line_no,
                    format!(
                        "inverted extraction coordinates {}..{}",
                        region.extr_start, region.extr_end
                    ),
                ));
            }

            let key = (region.sample.clone(), region.region_id.clone());
            if mapping.by_id.contains_key(&key) {
                return Err(ValidateError::mapping(
                    path,
                    line_no,
                    format!(
                        "duplicate region id '{}' for sample '{}'",
                        region.region_id, region.sample
                    ),
                ));
            }

            let regions = mapping.by_sample.entry(region.sample.clone()).or_default();
            let idx = regions.len();
            mapping
                .interval_index
                .entry((region.sample.clone(), region.extr_chrom.clone()))
                .or_default()
                .push((region.extr_start, region.extr_end, idx));
            mapping.by_id.insert(key, idx);
            regions.push(region);
        }

        for intervals in mapping.interval_index.values_mut() {
            intervals.sort_unstable();
        }

        Ok(mapping)
    }

    /// Samples in file order.
    pub fn samples(&self) -> impl Iterator<Item = &str> {
        self.by_sample.keys().map(String::as_str)
    }

    /// Regions of one sample, in mapping-table order.
    pub fn regions_for_sample(&self, sample: &str) -> &[CandidateRegion] {
        self.by_sample.get(sample).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get(&self, sample: &str, region_id: &str) -> Option<&CandidateRegion> {
        let idx = *self
            .by_id
            .get(&(sample.to_string(), region_id.to_string()))?;
        self.by_sample.get(sample).and_then(|v| v.get(idx))
    }

    /// Regions of `sample` whose extraction span intersects
    /// `[start, end)` on `chrom`, in mapping-table order.
    pub fn find_overlapping(
        &self,
        sample: &str,
        chrom: &str,
        start: u64,
        end: u64,
    ) -> Vec<&CandidateRegion> {
        let Some(intervals) = self
            .interval_index
            .get(&(sample.to_string(), chrom.to_string()))
        else {
            return Vec::new();
        };
        let regions = self.regions_for_sample(sample);

        // Candidates are those starting before the query end; filter on the
        // other bound while scanning.
        let upper = intervals.partition_point(|&(s, _, _)| s < end);
        let mut hits: Vec<usize> = intervals[..upper]
            .iter()
            .filter(|&&(_, e, _)| e > start)
            .map(|&(_, _, idx)| idx)
            .collect();
        hits.sort_unstable();
        hits.into_iter().map(|idx| &regions[idx]).collect()
    }

    pub fn total_regions(&self) -> usize {
        self.by_sample.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const HEADER: &str = "sample,region_id,category,orig_chrom,orig_start,orig_end,orig_length,extr_chrom,extr_start,extr_end,extr_length,left_flank,right_flank,total_flank";

    fn load_str(content: &str) -> Result<PositionMapping> {
        PositionMapping::from_reader(content.as_bytes(), Path::new("test.csv"))
    }

    #[test]
    fn loads_regions_in_file_order() {
        let content = format!(
            "{HEADER}\n\
             s1,s1|r2,mt,MT,100,600,500,chr2,9000,23000,14000,2000,2000,4000\n\
             s1,s1|r1,mt,MT,0,500,500,chr1,1000,15000,14000,2000,2000,4000\n\
             s2,s2|r1,pt,PT,0,300,300,chr1,500,11000,10500,2000,2000,4000\n"
        );
        let mapping = load_str(&content).unwrap();
        assert_eq!(mapping.total_regions(), 3);
        let ids: Vec<&str> = mapping
            .regions_for_sample("s1")
            .iter()
            .map(|r| r.region_id.as_str())
            .collect();
        assert_eq!(ids, vec!["s1|r2", "s1|r1"]);
        let r1 = mapping.get("s1", "s1|r1").unwrap();
        assert_eq!(r1.insert_length(), 10000);
    }

    #[test]
    fn missing_column_is_malformed() {
        let content = "sample,region_id,category\ns1,r1,mt\n";
        let err = load_str(content).unwrap_err();
        match err {
            ValidateError::MalformedMapping { reason, .. } => {
                assert!(reason.contains("orig_start"), "reason: {reason}");
            }
            other => panic!("expected MalformedMapping, got {other:?}"),
        }
    }

    #[test]
    fn non_numeric_coordinate_is_malformed() {
        let content = format!(
            "{HEADER}\ns1,r1,mt,MT,zero,500,500,chr1,1000,15000,14000,2000,2000,4000\n"
        );
        assert!(matches!(
            load_str(&content),
            Err(ValidateError::MalformedMapping { .. })
        ));
    }

    #[test]
    fn inverted_coordinates_are_malformed() {
        let content = format!(
            "{HEADER}\ns1,r1,mt,MT,600,100,500,chr1,1000,15000,14000,2000,2000,4000\n"
        );
        assert!(matches!(
            load_str(&content),
            Err(ValidateError::MalformedMapping { .. })
        ));
    }

    #[test]
    fn duplicate_region_id_is_malformed() {
        let content = format!(
            "{HEADER}\n\
             s1,r1,mt,MT,0,500,500,chr1,1000,15000,14000,2000,2000,4000\n\
             s1,r1,mt,MT,0,500,500,chr1,1000,15000,14000,2000,2000,4000\n"
        );
        assert!(matches!(
            load_str(&content),
            Err(ValidateError::MalformedMapping { .. })
        ));
    }

    #[test]
    fn interval_lookup_finds_overlaps_only() {
        let content = format!(
            "{HEADER}\n\
             s1,r1,mt,MT,0,500,500,chr1,1000,15000,14000,2000,2000,4000\n\
             s1,r2,mt,MT,0,500,500,chr1,20000,34000,14000,2000,2000,4000\n\
             s1,r3,mt,MT,0,500,500,chr2,1000,15000,14000,2000,2000,4000\n"
        );
        let mapping = load_str(&content).unwrap();

        let hits = mapping.find_overlapping("s1", "chr1", 14000, 21000);
        let ids: Vec<&str> = hits.iter().map(|r| r.region_id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r2"]);

        assert!(mapping.find_overlapping("s1", "chr1", 15000, 20000).is_empty());
        assert!(mapping.find_overlapping("s1", "chr3", 0, 100).is_empty());
        assert!(mapping.find_overlapping("s9", "chr1", 0, 100).is_empty());
    }
}
