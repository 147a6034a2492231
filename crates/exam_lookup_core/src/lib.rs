//! Shared exam lookup domain primitives.
//!
//! This crate owns the lookup contracts, the allow-listed query fields and the
//! existence-check-then-fetch lookup flow. It intentionally excludes AWS SDK,
//! Lambda runtime and database driver concerns; those live behind the
//! [`lookup::RecordStore`] trait and in `exam_lookup_lambda`.

pub mod contract;
pub mod lookup;
pub mod sql;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
