//! # Metadata Records
//!
//! Renders the per-item JSON record consumed by downstream packagers. The
//! ERC-721 field order (name, description, image, edition, attributes) is a
//! compatibility contract and must stay byte-stable: records are built with
//! insertion-order-preserving maps, pretty-printed with two-space indent,
//! and newline-terminated.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ForgeError, Result};
use crate::request::MetadataStandard;

/// One `{trait_type, value}` entry in an item's attribute list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attribute {
    pub trait_type: String,
    pub value: String,
}

/// Item display name: `"{collection} #{index}"`.
pub fn item_name(collection: &str, index: u32) -> String {
    format!("{collection} #{index}")
}

/// Conventional image reference inside the packaged archive.
pub fn image_path(index: u32) -> String {
    format!("images/{index}.png")
}

/// Render one item's metadata record.
///
/// Both standards share the base shape; `edition` is an ERC-721 generator
/// convention and is omitted for ERC-1155.
pub fn render_record(
    standard: MetadataStandard,
    collection: &str,
    description: &str,
    index: u32,
    attributes: &[Attribute],
) -> Result<String> {
    let mut root = Map::new();
    root.insert("name".into(), Value::String(item_name(collection, index)));
    root.insert("description".into(), Value::String(description.to_string()));
    root.insert("image".into(), Value::String(image_path(index)));
    if matches!(standard, MetadataStandard::Erc721) {
        root.insert("edition".into(), Value::from(index));
    }

    let attrs = attributes
        .iter()
        .map(|a| {
            let mut entry = Map::new();
            entry.insert("trait_type".into(), Value::String(a.trait_type.clone()));
            entry.insert("value".into(), Value::String(a.value.clone()));
            Value::Object(entry)
        })
        .collect();
    root.insert("attributes".into(), Value::Array(attrs));

    let mut body = serde_json::to_string_pretty(&Value::Object(root))
        .map_err(|e| ForgeError::Other(format!("metadata serialization failed: {e}")))?;
    body.push('\n');
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_erc721_record_is_byte_stable() {
        let attributes = vec![
            Attribute {
                trait_type: "Background".to_string(),
                value: "Forest".to_string(),
            },
            Attribute {
                trait_type: "Body".to_string(),
                value: "Knight".to_string(),
            },
        ];
        let record = render_record(
            MetadataStandard::Erc721,
            "Woodland Apes",
            "A test collection",
            7,
            &attributes,
        )
        .unwrap();

        let expected = concat!(
            "{\n",
            "  \"name\": \"Woodland Apes #7\",\n",
            "  \"description\": \"A test collection\",\n",
            "  \"image\": \"images/7.png\",\n",
            "  \"edition\": 7,\n",
            "  \"attributes\": [\n",
            "    {\n",
            "      \"trait_type\": \"Background\",\n",
            "      \"value\": \"Forest\"\n",
            "    },\n",
            "    {\n",
            "      \"trait_type\": \"Body\",\n",
            "      \"value\": \"Knight\"\n",
            "    }\n",
            "  ]\n",
            "}\n",
        );
        assert_eq!(record, expected);
    }

    #[test]
    fn test_erc1155_record_omits_edition() {
        let record = render_record(MetadataStandard::Erc1155, "C", "", 1, &[]).unwrap();
        assert!(!record.contains("\"edition\""));
        assert!(record.ends_with('\n'));
        let parsed: serde_json::Value = serde_json::from_str(&record).unwrap();
        assert_eq!(parsed["image"], "images/1.png");
    }

    #[test]
    fn test_names_and_paths() {
        assert_eq!(item_name("Apes", 12), "Apes #12");
        assert_eq!(image_path(12), "images/12.png");
    }
}
