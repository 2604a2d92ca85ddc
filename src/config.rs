use std::collections::BTreeSet;
use std::fmt;

use crate::error::{Result, ValidateError};

/// Which organelle the candidate insertions originate from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertionType {
    Numt,
    Nupt,
}

impl InsertionType {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "numt" => Ok(InsertionType::Numt),
            "nupt" => Ok(InsertionType::Nupt),
            other => Err(ValidateError::Config(format!(
                "unknown insertion type '{other}' (expected numt or nupt)"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InsertionType::Numt => "numt",
            InsertionType::Nupt => "nupt",
        }
    }
}

impl fmt::Display for InsertionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholds for region validation. Built once from the CLI, passed by
/// reference through every component; nothing reads ambient state.
#[derive(Debug, Clone)]
pub struct ValidateConfig {
    pub insertion_type: InsertionType,
    /// Minimum mapping quality; records below are dropped and counted.
    pub mapq_min: u32,
    /// Allowed `tp:A:` tag values. Records with no tag always pass.
    pub include_tp: BTreeSet<String>,
    /// Slack at each end of the target when testing full-span alignment.
    pub edge_window: u64,
    /// Minimum fraction of the target an alignment must cover.
    pub min_target_cov: f64,
    /// Minimum overlap with each boundary window for full-span evidence.
    pub min_overlap_bp: u64,
    /// Minimum insert overlap for single-junction evidence.
    pub insert_min_overlap: u64,
    /// Supporting reads required before a region is `validated`.
    pub min_support_reads: usize,
    pub write_read_details: bool,
}

impl ValidateConfig {
    pub fn new(insertion_type: InsertionType) -> Self {
        ValidateConfig {
            insertion_type,
            mapq_min: 20,
            include_tp: BTreeSet::from(["P".to_string()]),
            edge_window: 200,
            min_target_cov: 0.95,
            min_overlap_bp: 1,
            insert_min_overlap: 10_000,
            min_support_reads: 2,
            write_read_details: false,
        }
    }

    /// Fail fast on nonsense thresholds, before any file is touched.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_target_cov) {
            return Err(ValidateError::Config(format!(
                "min_target_cov must be within [0, 1], got {}",
                self.min_target_cov
            )));
        }
        if self.min_support_reads == 0 {
            return Err(ValidateError::Config(
                "min_support_reads must be at least 1".to_string(),
            ));
        }
        if self.include_tp.is_empty() {
            return Err(ValidateError::Config(
                "include_tp must name at least one alignment type tag".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ValidateConfig::new(InsertionType::Numt).validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_coverage() {
        let mut config = ValidateConfig::new(InsertionType::Numt);
        config.min_target_cov = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ValidateError::Config(_))
        ));
    }

    #[test]
    fn rejects_zero_support_reads() {
        let mut config = ValidateConfig::new(InsertionType::Nupt);
        config.min_support_reads = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_type_selector() {
        assert!(InsertionType::parse("mito").is_err());
        assert_eq!(InsertionType::parse("nupt").unwrap(), InsertionType::Nupt);
    }
}
