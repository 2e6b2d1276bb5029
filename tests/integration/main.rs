//! Integration tests for the fqflow library.
//!
//! These tests exercise the pipelines end-to-end over real (temporary)
//! files, including the gzip adapters, and validate the cross-module
//! guarantees: order preservation, chain semantics, pool and token
//! accounting, fallback equivalence, and statistics determinism.

mod helpers;
mod test_concurrency;
mod test_error_paths;
mod test_filter_pipeline;
mod test_stat_pipeline;
