//! Core infrastructure for docgraph.
//!
//! This crate provides language-agnostic infrastructure:
//! - Report sink with severities, thresholds and violation counting
//! - Qualified-name pattern matching for privacy rules

pub mod qnmatch;
pub mod report;
