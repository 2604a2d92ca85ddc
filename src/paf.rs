use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use noodles::bgzf;

use crate::config::ValidateConfig;
use crate::error::{Result, ValidateError};

/// Open a PAF file and auto-detect bgzip compression, returning a boxed BufRead
pub fn open_paf_input<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead>> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(ValidateError::MissingInput {
            path: path.to_path_buf(),
        });
    }
    let file = File::open(path)?;

    // Check by file extension (faster than reading magic bytes)
    let is_compressed = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext == "gz" || ext == "bgz")
        .unwrap_or(false);

    if is_compressed {
        Ok(Box::new(BufReader::new(bgzf::io::reader::Reader::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// One pairwise alignment of a read against an extracted candidate sequence.
/// Coordinates are 0-based half-open, straight from the PAF fields.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentRecord {
    pub qname: String,
    pub qlen: u64,
    pub qstart: u64,
    pub qend: u64,
    pub strand: char,
    pub tname: String,
    pub tlen: u64,
    pub tstart: u64,
    pub tend: u64,
    pub nmatch: u64,
    pub block_len: u64,
    pub mapq: u32,
    /// `tp:A:` tag when present (P = primary, S = secondary, I = inversion).
    pub tp: Option<String>,
}

impl AlignmentRecord {
    /// Length of the alignment on the target.
    pub fn target_span(&self) -> u64 {
        self.tend.saturating_sub(self.tstart)
    }

    /// Region id encoded in the target name before the `::` separator, if
    /// the extraction step tagged the sequence that way.
    pub fn region_id(&self) -> Option<&str> {
        self.tname.split_once("::").map(|(id, _)| id)
    }
}

/// Read-time filter tallies. The QC record absorbs these once the stream is
/// exhausted; `kept + filtered_mapq + filtered_tag + malformed = total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterCounts {
    pub total_records: u64,
    pub filtered_mapq: u64,
    pub filtered_tag: u64,
    pub malformed_records: u64,
    pub kept_records: u64,
}

/// Streaming PAF reader. One pass, not restartable; reopen to re-scan.
/// Applies the mapq and tp-tag filters as records are pulled, so consumers
/// only ever see usable records.
pub struct PafReader<R: Read> {
    reader: BufReader<R>,
    line_number: usize,
    counts: FilterCounts,
}

impl PafReader<Box<dyn BufRead>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(PafReader::new(open_paf_input(path)?))
    }
}

impl<R: Read> PafReader<R> {
    pub fn new(reader: R) -> Self {
        PafReader {
            reader: BufReader::new(reader),
            line_number: 0,
            counts: FilterCounts::default(),
        }
    }

    pub fn counts(&self) -> FilterCounts {
        self.counts
    }

    /// Next record passing the filters, or `None` at end of input. Malformed
    /// lines are skipped and counted rather than aborting the sample.
    pub fn next_record(&mut self, config: &ValidateConfig) -> Result<Option<AlignmentRecord>> {
        loop {
            let mut line = String::new();
            if self.reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            self.line_number += 1;

            let trimmed = line.trim_end_matches(['\n', '\r']);
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            self.counts.total_records += 1;
            let record = match parse_paf_line(trimmed, self.line_number) {
                Ok(record) => record,
                Err(err) => {
                    log::warn!("skipping {err}");
                    self.counts.malformed_records += 1;
                    continue;
                }
            };

            if record.mapq < config.mapq_min {
                self.counts.filtered_mapq += 1;
                continue;
            }
            if let Some(ref tp) = record.tp {
                if !config.include_tp.contains(tp) {
                    self.counts.filtered_tag += 1;
                    continue;
                }
            }

            self.counts.kept_records += 1;
            return Ok(Some(record));
        }
    }
}

fn parse_field<T: std::str::FromStr>(
    fields: &[&str],
    idx: usize,
    name: &str,
    line_number: usize,
) -> Result<T> {
    fields[idx].parse().map_err(|_| {
        ValidateError::record(line_number, format!("non-numeric {name} '{}'", fields[idx]))
    })
}

fn parse_paf_line(line: &str, line_number: usize) -> Result<AlignmentRecord> {
    let fields: Vec<&str> = line.split('\t').collect();

    if fields.len() < 12 {
        return Err(ValidateError::record(
            line_number,
            format!("expected at least 12 fields, found {}", fields.len()),
        ));
    }

    let mut record = AlignmentRecord {
        qname: fields[0].to_string(),
        qlen: parse_field(&fields, 1, "query length", line_number)?,
        qstart: parse_field(&fields, 2, "query start", line_number)?,
        qend: parse_field(&fields, 3, "query end", line_number)?,
        strand: fields[4].chars().next().unwrap_or('+'),
        tname: fields[5].to_string(),
        tlen: parse_field(&fields, 6, "target length", line_number)?,
        tstart: parse_field(&fields, 7, "target start", line_number)?,
        tend: parse_field(&fields, 8, "target end", line_number)?,
        nmatch: parse_field(&fields, 9, "match count", line_number)?,
        block_len: parse_field(&fields, 10, "block length", line_number)?,
        mapq: parse_field(&fields, 11, "mapping quality", line_number)?,
        tp: None,
    };

    // Parse optional tags; only tp:A: matters here
    for field in &fields[12..] {
        if let Some(val) = field.strip_prefix("tp:A:") {
            if !val.is_empty() {
                record.tp = Some(val.to_string());
            }
        }
    }

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InsertionType;

    fn collect(content: &str, config: &ValidateConfig) -> (Vec<AlignmentRecord>, FilterCounts) {
        let mut reader = PafReader::new(content.as_bytes());
        let mut records = Vec::new();
        while let Some(record) = reader.next_record(config).unwrap() {
            records.push(record);
        }
        (records, reader.counts())
    }

    #[test]
    fn parses_basic_record_with_tp_tag() {
        let config = ValidateConfig::new(InsertionType::Numt);
        let line = "read1\t20000\t0\t15000\t+\tR1::chr1:100-200\t14000\t10\t13990\t13000\t14000\t60\ttp:A:P\tcm:i:100";
        let (records, counts) = collect(line, &config);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.qname, "read1");
        assert_eq!(r.tlen, 14000);
        assert_eq!(r.tp.as_deref(), Some("P"));
        assert_eq!(r.region_id(), Some("R1"));
        assert_eq!(r.target_span(), 13980);
        assert_eq!(counts.kept_records, 1);
    }

    #[test]
    fn filters_by_mapq_and_tag() {
        let config = ValidateConfig::new(InsertionType::Numt);
        let content = "\
read1\t100\t0\t90\t+\tR1::x\t100\t0\t90\t85\t90\t5\ttp:A:P
read2\t100\t0\t90\t+\tR1::x\t100\t0\t90\t85\t90\t60\ttp:A:S
read3\t100\t0\t90\t+\tR1::x\t100\t0\t90\t85\t90\t60\ttp:A:P
read4\t100\t0\t90\t+\tR1::x\t100\t0\t90\t85\t90\t60";
        let (records, counts) = collect(content, &config);
        // read1 fails mapq, read2 fails tag, read4 has no tag and passes
        assert_eq!(records.len(), 2);
        assert_eq!(counts.total_records, 4);
        assert_eq!(counts.filtered_mapq, 1);
        assert_eq!(counts.filtered_tag, 1);
        assert_eq!(counts.kept_records, 2);
    }

    #[test]
    fn malformed_lines_are_skipped_not_fatal() {
        let config = ValidateConfig::new(InsertionType::Numt);
        let content = "\
# comment line
read1\t100\t0\t90
read2\tnot_a_number\t0\t90\t+\tR1::x\t100\t0\t90\t85\t90\t60\ttp:A:P
read3\t100\t0\t90\t+\tR1::x\t100\t0\t90\t85\t90\t60\ttp:A:P";
        let (records, counts) = collect(content, &config);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].qname, "read3");
        assert_eq!(counts.malformed_records, 2);
        assert_eq!(
            counts.kept_records
                + counts.filtered_mapq
                + counts.filtered_tag
                + counts.malformed_records,
            counts.total_records
        );
    }

    #[test]
    fn region_id_requires_separator() {
        let config = ValidateConfig::new(InsertionType::Numt);
        let line = "read1\t100\t0\t90\t+\tchr7\t100\t0\t90\t85\t90\t60\ttp:A:P";
        let (records, _) = collect(line, &config);
        assert_eq!(records[0].region_id(), None);
    }

    #[test]
    fn missing_file_is_missing_input() {
        let err = open_paf_input("/no/such/file.paf").err().unwrap();
        assert!(matches!(err, ValidateError::MissingInput { .. }));
    }
}
