//! Kvasir-Capsule dataset loading, patient-aware splitting, and per-phase
//! iteration.
//!
//! This crate provides utilities for:
//! - Downloading and checksum-validating the Kvasir-Capsule archive
//! - Parsing the metadata.csv manifest into typed sample records
//! - Patient-aware train/val/test splitting with JSON round-trip persistence
//! - Augmented per-phase views for an external training loop

pub mod bbox;
pub mod config;
pub mod dataset;
pub mod download;
pub mod metadata;
pub mod split;
pub mod transforms;
pub mod types;

pub use bbox::BoundingBox;
pub use config::Config;
pub use dataset::{CapsuleDataset, CapsuleSubset, DatasetItem};
pub use metadata::{Metadata, PatientGroup};
pub use split::{PatientRatioSplit, SplitStrategy};
pub use transforms::{TransformPipeline, Transformed};
pub use types::{CapsuleError, DatasetResult, FindingCategory, FindingClass, Sample};
