//! # Comp Meta
//!
//! Incremental TFT composition statistics built from ranked match history.
//!
//! ## Architecture
//!
//! - **models**: Core data structures (matches, accumulator state, report rows)
//! - **calculate**: Composition signatures, counting, merging and finalization
//! - **storage**: Snapshot persistence
//! - **fetch**: HTTP JSON fetching with caching and rate-limit retries
//! - **sync**: Riot API client and run orchestration
//! - **config**: Configuration loading and validation

pub mod calculate;
pub mod config;
pub mod fetch;
pub mod models;
pub mod storage;
pub mod sync;

pub use models::*;
