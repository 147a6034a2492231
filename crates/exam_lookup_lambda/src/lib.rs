//! AWS-oriented adapters and handlers for the exam lookup Lambda.
//!
//! This crate owns runtime integration details (the MySQL record store, the
//! SQS notification publisher, event classification and routing, and the
//! failure boundary handed to `lambda_runtime`). Lookup semantics live in
//! `exam_lookup_core`.

pub mod adapters;
pub mod config;
pub mod handlers;
pub mod telemetry;
