//! Merge per-sample outputs into the combined cross-sample artifacts.
//!
//! Each sample directory under `<out>/<type>/` holds a `region_validation.tsv`
//! and a `qc.json`. The merge concatenates the region tables under a single
//! header (refusing to mix tables with diverging headers) and collects the QC
//! documents into one JSON array.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{Result, ValidateError};
use crate::qc::QcRecord;

/// Concatenate region tables into `output_path`. Every input must share the
/// first table's header, which is written exactly once. Returns the number
/// of data rows in the combined table.
pub fn merge_region_tables(input_paths: &[PathBuf], output_path: &Path) -> Result<usize> {
    let first = input_paths.first().ok_or_else(|| ValidateError::MissingInput {
        path: output_path.to_path_buf(),
    })?;
    let header = read_header(first)?;

    let dir = output_path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    writeln!(tmp, "{header}")?;

    let mut n_rows = 0;
    for path in input_paths {
        let reader = BufReader::new(File::open(path)?);
        let mut lines = reader.lines();
        let first_line = match lines.next() {
            Some(line) => line?,
            None => String::new(),
        };
        if first_line != header {
            return Err(ValidateError::HeaderMismatch { path: path.clone() });
        }
        for line in lines {
            writeln!(tmp, "{}", line?)?;
            n_rows += 1;
        }
    }

    tmp.persist(output_path).map_err(|e| ValidateError::Io(e.error))?;
    Ok(n_rows)
}

/// Collect per-sample QC documents into one JSON array at `output_path`.
pub fn merge_qc_records(qc_records: &[QcRecord], output_path: &Path) -> Result<()> {
    let dir = output_path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let json = serde_json::to_string_pretty(qc_records)
        .map_err(|e| ValidateError::Io(std::io::Error::other(e)))?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(json.as_bytes())?;
    tmp.persist(output_path).map_err(|e| ValidateError::Io(e.error))?;
    Ok(())
}

fn read_header(path: &Path) -> Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut header = String::new();
    if reader.read_line(&mut header)? == 0 {
        return Err(ValidateError::HeaderMismatch {
            path: path.to_path_buf(),
        });
    }
    Ok(header.trim_end_matches(['\n', '\r']).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn table(dir: &Path, name: &str, header: &str, rows: &[&str]) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        writeln!(file, "{header}").unwrap();
        for row in rows {
            writeln!(file, "{row}").unwrap();
        }
        path
    }

    #[test]
    fn concatenates_rows_under_single_header() {
        let dir = tempfile::tempdir().unwrap();
        let a = table(dir.path(), "a.tsv", "sample\tregion_id", &["s1\tr1", "s1\tr2"]);
        let b = table(dir.path(), "b.tsv", "sample\tregion_id", &["s2\tr1"]);
        let out = dir.path().join("combined.tsv");

        let n = merge_region_tables(&[a, b], &out).unwrap();
        assert_eq!(n, 3);

        let content = fs::read_to_string(&out).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "sample\tregion_id");
        assert_eq!(lines[3], "s2\tr1");
    }

    #[test]
    fn header_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let a = table(dir.path(), "a.tsv", "sample\tregion_id", &["s1\tr1"]);
        let b = table(dir.path(), "b.tsv", "sample\tvalidated", &["s2\tr1"]);
        let out = dir.path().join("combined.tsv");

        let err = merge_region_tables(&[a, b], &out).unwrap_err();
        assert!(matches!(err, ValidateError::HeaderMismatch { .. }));
        assert!(!out.exists());
    }

    #[test]
    fn empty_input_set_is_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("combined.tsv");
        assert!(matches!(
            merge_region_tables(&[], &out),
            Err(ValidateError::MissingInput { .. })
        ));
    }
}
