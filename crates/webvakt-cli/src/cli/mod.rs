//! CLI subcommand implementations for the webvakt binary.

pub mod check_cmd;
pub mod doctor;
pub mod output;
