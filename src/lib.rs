//! Test fixtures for gene-based GWAS summary statistics.
//!
//! Locates gene-based studies in the GWAS Catalog, resolves their files on
//! the FTP mirror, draws a reproducible sample of each, and validates sampled
//! rows against a small schema.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod listing;
pub mod locator;
pub mod output;
pub mod pipeline;
pub mod pool;
pub mod retry;
pub mod sampler;
pub mod schema;
