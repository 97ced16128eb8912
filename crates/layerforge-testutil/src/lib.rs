//! Fixture builders for LayerForge tests: solid-color PNG trait images and
//! request/layer constructors with sensible defaults (seed 42, one worker).

use image::{ImageEncoder, Rgba, RgbaImage};
use layerforge_core::request::{
    GenerationRequest, ImageData, Layer, LayerId, MetadataStandard, OutputSize, RulerRule, Trait,
    TraitId, TraitKind,
};

/// Encode a solid-color RGBA PNG of the given size.
pub fn solid_png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba(rgba));
    let mut bytes = Vec::new();
    image::codecs::png::PngEncoder::new(&mut bytes)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgba8)
        .expect("encoding a test PNG should not fail");
    bytes
}

pub fn image_data(width: u32, height: u32, rgba: [u8; 4]) -> ImageData {
    ImageData {
        bytes: solid_png(width, height, rgba),
        width,
        height,
        mime: "image/png".to_string(),
    }
}

pub fn normal_trait(name: &str, weight: u8, size: (u32, u32), rgba: [u8; 4]) -> Trait {
    Trait {
        id: TraitId::new(),
        name: name.to_string(),
        weight,
        kind: TraitKind::Normal,
        image: image_data(size.0, size.1, rgba),
    }
}

pub fn ruler_trait(
    name: &str,
    weight: u8,
    size: (u32, u32),
    rgba: [u8; 4],
    rules: Vec<RulerRule>,
) -> Trait {
    Trait {
        id: TraitId::new(),
        name: name.to_string(),
        weight,
        kind: TraitKind::Ruler(rules),
        image: image_data(size.0, size.1, rgba),
    }
}

pub fn layer(name: &str, order: u32, traits: Vec<Trait>) -> Layer {
    Layer {
        id: LayerId::new(),
        name: name.to_string(),
        order,
        optional: false,
        traits,
    }
}

pub fn optional_layer(name: &str, order: u32, traits: Vec<Trait>) -> Layer {
    Layer {
        optional: true,
        ..layer(name, order, traits)
    }
}

/// A layer of `count` equally-weighted traits named `{name}-0..` with
/// distinct colors, for tests that just need combination volume.
pub fn swatch_layer(name: &str, order: u32, count: usize, size: (u32, u32)) -> Layer {
    let traits = (0..count)
        .map(|i| {
            let shade = [
                (i * 37 % 256) as u8,
                (i * 91 % 256) as u8,
                (i * 53 % 256) as u8,
                255,
            ];
            normal_trait(&format!("{name}-{i}"), 3, size, shade)
        })
        .collect();
    layer(name, order, traits)
}

/// A minimal seeded single-worker request over the given layers.
pub fn request(name: &str, size: (u32, u32), count: u32, layers: Vec<Layer>) -> GenerationRequest {
    GenerationRequest {
        name: name.to_string(),
        description: format!("{name} test collection"),
        output_size: OutputSize {
            width: size.0,
            height: size.1,
        },
        target_count: count,
        metadata_standard: MetadataStandard::Erc721,
        layers,
        strict_pair_rules: Vec::new(),
        seed: Some(42),
        worker_cap: Some(1),
        attempt_budget: None,
        memory_budget_bytes: None,
        timeout_ms: None,
    }
}

/// Look up a trait id by name within a layer.
pub fn trait_id(layer: &Layer, name: &str) -> TraitId {
    layer
        .traits
        .iter()
        .find(|t| t.name == name)
        .unwrap_or_else(|| panic!("no trait named '{name}' in layer '{}'", layer.name))
        .id
}
