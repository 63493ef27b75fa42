//! Chain traversal and harvest orchestration
//!
//! # Components
//!
//! - `Chapter` / `Source`: the capability contract adapters implement
//! - `ChainWalker`: walks one series chapter by chapter
//! - `HarvestEngine`: runs walkers for every subscribed series

mod engine;
mod item;
mod walker;

pub use engine::HarvestEngine;
pub use item::{Chapter, Source, SourceError};
pub use walker::{ChainWalker, SoftStop, WalkOutcome, WalkState};
