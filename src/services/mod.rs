// src/services/mod.rs

//! Service layer: the parsing engine and the live-or-snapshot orchestration.
//!
//! - Grid tokenizing (`tokenizer`)
//! - Record normalizing (`normalizer`, with `glyphs` and `dates`)
//! - Page region extraction (`page`)
//! - Mileage files and junction distances (`mileage`)
//! - Category collection and merging (`CategoryResolver`)
//! - Reachability probing (`ConnectivityGate`)
//! - The request surface (`CodeRepository`)

pub mod connectivity;
pub mod dates;
pub mod glyphs;
pub mod mileage;
pub mod normalizer;
pub mod page;
pub mod repository;
pub mod resolver;
pub mod tokenizer;

pub use connectivity::{ConnectivityGate, FixedGate, HttpProbe};
pub use mileage::MileageParser;
pub use normalizer::RecordNormalizer;
pub use repository::{
    CategoryResponse, CodeRepository, MileageResponse, Provenance, UpdateReport, UpdateStatus,
};
pub use resolver::{CategoryResolver, merge};
