//! # Project Manifest
//!
//! Reads `layerforge.toml` and turns it (plus the trait images on disk) into
//! a [`GenerationRequest`]. A project looks like:
//!
//! ```toml
//! [collection]
//! name = "Woodland Apes"
//! description = "1000 apes, no two alike"
//! width = 600
//! height = 600
//! count = 1000
//! standard = "erc721"
//! seed = 42
//!
//! [[layer]]
//! name = "Background"
//! dir = "layers/background"
//! order = 0
//!
//! [[layer]]
//! name = "Body"
//! dir = "layers/body"
//! order = 1
//!
//! [[rule]]
//! layer = "Background"
//! trait = "Forest"
//! target = "Body"
//! forbidden = ["Robot"]
//!
//! [[strict_pair]]
//! layers = ["Background", "Body"]
//! ```
//!
//! Trait images are the files inside each layer's `dir`; a `#<w>` suffix on
//! the file stem sets the rarity weight (`Robot#2.png`), defaulting to 5
//! ("Common"). Layer directories are scanned in name order so trait ids are
//! stable across runs on the same tree.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use regex::Regex;
use serde::Deserialize;

use layerforge_core::request::{
    CombinationId, GenerationRequest, ImageData, Layer, LayerCombination, LayerId,
    MetadataStandard, OutputSize, RulerRule, Trait, TraitId, TraitKind,
};

/// Default manifest file name.
pub const MANIFEST_FILE_NAME: &str = "layerforge.toml";

/// Weight used when a trait file carries no `#<w>` suffix (5 = "Common").
const DEFAULT_TRAIT_WEIGHT: u8 = 5;

/// Top-level layerforge.toml structure.
#[derive(Debug, Deserialize)]
pub struct Manifest {
    pub collection: CollectionConfig,
    #[serde(default, rename = "layer")]
    pub layers: Vec<LayerConfig>,
    #[serde(default, rename = "rule")]
    pub rules: Vec<RuleConfig>,
    #[serde(default, rename = "strict_pair")]
    pub strict_pairs: Vec<StrictPairConfig>,

    /// Directory containing the manifest, so layer `dir` entries resolve
    /// against the project root rather than the CWD.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct CollectionConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub width: u32,
    pub height: u32,
    pub count: u32,
    #[serde(default)]
    pub standard: StandardConfig,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub workers: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StandardConfig {
    #[default]
    Erc721,
    Erc1155,
}

#[derive(Debug, Deserialize)]
pub struct LayerConfig {
    pub name: String,
    pub dir: String,
    pub order: u32,
    #[serde(default)]
    pub optional: bool,
}

/// A ruler rule attached to a named trait.
#[derive(Debug, Deserialize)]
pub struct RuleConfig {
    pub layer: String,
    #[serde(rename = "trait")]
    pub trait_name: String,
    pub target: String,
    #[serde(default)]
    pub allowed: Vec<String>,
    #[serde(default)]
    pub forbidden: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct StrictPairConfig {
    pub layers: Vec<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Manifest> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut manifest: Manifest =
            toml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))?;
        manifest.base_dir = path.parent().map(Path::to_path_buf);
        Ok(manifest)
    }

    /// Scan every layer directory and assemble the engine request.
    pub fn build_request(&self) -> Result<GenerationRequest> {
        let base = self
            .base_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));

        let mut layers = Vec::with_capacity(self.layers.len());
        for cfg in &self.layers {
            let dir = base.join(&cfg.dir);
            let traits = scan_traits(&dir)
                .with_context(|| format!("scanning layer '{}' in {}", cfg.name, dir.display()))?;
            layers.push(Layer {
                id: LayerId::new(),
                name: cfg.name.clone(),
                order: cfg.order,
                optional: cfg.optional,
                traits,
            });
        }

        for rule in &self.rules {
            let source_pos = layers
                .iter()
                .position(|l| l.name == rule.layer)
                .ok_or_else(|| anyhow!("rule references unknown layer '{}'", rule.layer))?;
            let target = layers
                .iter()
                .find(|l| l.name == rule.target)
                .ok_or_else(|| anyhow!("rule targets unknown layer '{}'", rule.target))?;
            let target_id = target.id;
            let allowed = resolve_trait_names(target, &rule.allowed)?;
            let forbidden = resolve_trait_names(target, &rule.forbidden)?;

            let ruler = RulerRule {
                target_layer: target_id,
                allowed,
                forbidden,
            };
            let source = layers[source_pos]
                .traits
                .iter_mut()
                .find(|t| t.name == rule.trait_name)
                .ok_or_else(|| {
                    anyhow!(
                        "rule references unknown trait '{}' in layer '{}'",
                        rule.trait_name,
                        rule.layer
                    )
                })?;
            match &mut source.kind {
                TraitKind::Ruler(rules) => rules.push(ruler),
                TraitKind::Normal => source.kind = TraitKind::Ruler(vec![ruler]),
            }
        }

        let strict_pair_rules = self
            .strict_pairs
            .iter()
            .map(|sp| {
                let layer_ids = sp
                    .layers
                    .iter()
                    .map(|name| {
                        layers
                            .iter()
                            .find(|l| l.name == *name)
                            .map(|l| l.id)
                            .ok_or_else(|| anyhow!("strict pair references unknown layer '{name}'"))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(LayerCombination {
                    id: CombinationId::new(),
                    layer_ids,
                    active: sp.active,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(GenerationRequest {
            name: self.collection.name.clone(),
            description: self.collection.description.clone(),
            output_size: OutputSize {
                width: self.collection.width,
                height: self.collection.height,
            },
            target_count: self.collection.count,
            metadata_standard: match self.collection.standard {
                StandardConfig::Erc721 => MetadataStandard::Erc721,
                StandardConfig::Erc1155 => MetadataStandard::Erc1155,
            },
            layers,
            strict_pair_rules,
            seed: self.collection.seed,
            worker_cap: self.collection.workers,
            attempt_budget: None,
            memory_budget_bytes: None,
            timeout_ms: None,
        })
    }
}

fn resolve_trait_names(layer: &Layer, names: &[String]) -> Result<Vec<TraitId>> {
    names
        .iter()
        .map(|name| {
            layer
                .traits
                .iter()
                .find(|t| t.name == *name)
                .map(|t| t.id)
                .ok_or_else(|| anyhow!("unknown trait '{}' in layer '{}'", name, layer.name))
        })
        .collect()
}

/// Collect the trait images in a layer directory, name-sorted. The file stem
/// is the trait name; an optional `#<w>` suffix is the rarity weight.
fn scan_traits(dir: &Path) -> Result<Vec<Trait>> {
    let stem_re = Regex::new(r"^(?P<name>.*?)(?:#(?P<weight>\d+))?$").expect("static regex");

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("failed to list {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    let mut traits = Vec::new();
    for path in paths {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        let mime = match ext.to_ascii_lowercase().as_str() {
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            _ => continue,
        };

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let caps = stem_re
            .captures(stem)
            .ok_or_else(|| anyhow!("unusable trait file name: {}", path.display()))?;
        let name = caps
            .name("name")
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| stem.to_string());
        if name.is_empty() {
            bail!("trait file has an empty name: {}", path.display());
        }
        let weight = match caps.name("weight") {
            Some(m) => m
                .as_str()
                .parse::<u8>()
                .with_context(|| format!("bad weight suffix on {}", path.display()))?,
            None => DEFAULT_TRAIT_WEIGHT,
        };

        let bytes =
            fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
        let (width, height) = image::ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()
            .with_context(|| format!("failed to sniff {}", path.display()))?
            .into_dimensions()
            .with_context(|| format!("failed to read dimensions of {}", path.display()))?;

        traits.push(Trait {
            id: TraitId::new(),
            name,
            weight,
            kind: TraitKind::Normal,
            image: ImageData {
                bytes,
                width,
                height,
                mime: mime.to_string(),
            },
        });
    }

    Ok(traits)
}
