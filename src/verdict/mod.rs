//! Verdict classification
//!
//! Derives subprocess verdicts as pure functions over observed process outcomes.

pub mod verdict;
