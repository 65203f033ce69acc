// src/pipeline/mod.rs

//! Pipeline entry points for the command line.
//!
//! - `run_collect`: Serve one category request and optionally save it
//! - `run_mileage`, `run_connect`: Mileage files and junction distances
//! - `run_update`: Refresh snapshots from the live site
//! - `run_validate`: Check configuration and category declarations

pub mod collect;
pub mod mileage;
pub mod update;
pub mod validate;

pub use collect::run_collect;
pub use mileage::{run_connect, run_mileage};
pub use update::run_update;
pub use validate::run_validate;
