//! # Error Types
//!
//! Defines `ForgeError`, the unified error enum for every failure mode in
//! the generation pipeline. Validation variants abort before any item is
//! generated; transient variants (solver exhaustion, collision races,
//! decode failures) are absorbed by the scheduler with retries; the rest
//! terminate the run and close the event stream.

use thiserror::Error;

use crate::request::TraitId;

/// All errors that can occur while compiling or running a generation request.
#[derive(Error, Debug)]
pub enum ForgeError {
    /// A required layer has no traits, or the request has no usable layers
    /// at all (in which case `layer` carries the collection name).
    #[error("layer '{layer}' has no traits to draw from")]
    EmptyLayer { layer: String },

    #[error("output size {width}x{height} is invalid — both dimensions must be positive")]
    InvalidOutputSize { width: u32, height: u32 },

    #[error("trait '{trait_name}' in layer '{layer}' is {actual_width}x{actual_height}, expected {expected_width}x{expected_height}\n  Resize the source image or fix the declared output size")]
    DimensionMismatch {
        layer: String,
        trait_name: String,
        actual_width: u32,
        actual_height: u32,
        expected_width: u32,
        expected_height: u32,
    },

    #[error("ruler rule on trait '{trait_name}' is invalid: {reason}")]
    InvalidRule { trait_name: String, reason: String },

    #[error("rarity weight {weight} on trait '{trait_name}' is out of range (must be 1-5)")]
    WeightOutOfRange { trait_name: String, weight: u8 },

    #[error("requested {requested} items but at most {upper_bound} distinct items exist for this request\n  Add trait variations, relax rules, or lower the target count")]
    Infeasible { requested: u64, upper_bound: u128 },

    #[error("solver exhausted its restart budget ({budget}) without finding a fresh assignment")]
    SolverExhausted { budget: u32 },

    #[error("another worker reserved a colliding assignment")]
    CollisionRace,

    #[error("trait image {trait_id} failed to decode: {reason}")]
    DecodeFailure { trait_id: TraitId, reason: String },

    #[error("a composited item of {item_bytes} bytes exceeds the {budget_bytes}-byte outbound memory budget")]
    MemoryBudgetExceeded { item_bytes: u64, budget_bytes: u64 },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ForgeError>;
