// src/lib.rs

//! Railway codes library: table parsing, category collection, and offline snapshots.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
