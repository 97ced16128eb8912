//! # Request Model
//!
//! The caller-facing description of a collection: ordered layers of weighted
//! traits, ruler rules constraining cross-layer combinations, and strict-pair
//! uniqueness rules. A `GenerationRequest` is plain data — the engine
//! validates and compiles it (see [`crate::compile`]) before any item is
//! generated, and the compiled form is immutable for the lifetime of a run.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a layer, stable across a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(pub Uuid);

/// Identity of a trait, stable across a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraitId(pub Uuid);

/// Identity of a strict-pair rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CombinationId(pub Uuid);

impl LayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl TraitId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl CombinationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for TraitId {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for CombinationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pixel dimensions of the composited output raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSize {
    pub width: u32,
    pub height: u32,
}

/// Which metadata record shape to emit for each item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataStandard {
    #[serde(rename = "ERC721")]
    Erc721,
    #[serde(rename = "ERC1155")]
    Erc1155,
}

/// An opaque, immutable trait image payload with declared dimensions.
///
/// The declared `width`/`height` are validated against the request's
/// `output_size` up front; the bytes themselves are only decoded when the
/// compositor first needs them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageData {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub mime: String,
}

/// Constraint attached to a ruler trait: when the carrying trait is selected,
/// the trait selected in `target_layer` must be in `allowed` (when non-empty)
/// and must not be in `forbidden`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulerRule {
    pub target_layer: LayerId,
    #[serde(default)]
    pub allowed: Vec<TraitId>,
    #[serde(default)]
    pub forbidden: Vec<TraitId>,
}

/// Whether a trait is plain or carries ruler rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TraitKind {
    Normal,
    Ruler(Vec<RulerRule>),
}

/// One candidate image within a layer.
///
/// `weight` is the raw rarity multiplier in 1..=5. The UI labels weight 1
/// "Mythic" and 5 "Common"; those labels never enter the sampling math.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trait {
    pub id: TraitId,
    pub name: String,
    pub weight: u8,
    pub kind: TraitKind,
    pub image: ImageData,
}

impl Trait {
    pub fn rules(&self) -> &[RulerRule] {
        match &self.kind {
            TraitKind::Normal => &[],
            TraitKind::Ruler(rules) => rules,
        }
    }
}

/// An ordered group of candidate traits. Layers are painted low `order`
/// first; `order` must be unique within a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub order: u32,
    #[serde(default)]
    pub optional: bool,
    pub traits: Vec<Trait>,
}

/// A strict-pair rule: every emitted item's projection onto `layer_ids`
/// must be unique across the collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerCombination {
    pub id: CombinationId,
    pub layer_ids: Vec<LayerId>,
    pub active: bool,
}

/// Everything the engine needs to generate one collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub output_size: OutputSize,
    pub target_count: u32,
    pub metadata_standard: MetadataStandard,
    pub layers: Vec<Layer>,
    #[serde(default)]
    pub strict_pair_rules: Vec<LayerCombination>,
    /// Fixed seed for reproducible runs. Unset means OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Upper bound on worker threads. Defaults to 4.
    #[serde(default)]
    pub worker_cap: Option<u32>,
    /// Per-item solver restart budget. Defaults to 64.
    #[serde(default)]
    pub attempt_budget: Option<u32>,
    /// Cap on composited bytes in flight. Defaults to 256 MiB.
    #[serde(default)]
    pub memory_budget_bytes: Option<u64>,
    /// Optional wall-clock limit; expiry cancels the run with reason
    /// "timeout".
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}
