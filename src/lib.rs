// Library exports for orgval
pub mod classify;
pub mod config;
pub mod error;
pub mod mapping_table;
pub mod merge;
pub mod paf;
pub mod qc;
pub mod sample;
