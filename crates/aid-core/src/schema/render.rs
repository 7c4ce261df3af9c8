//! JSON Schema (draft-07) rendering of schema trees.
//!
//! Output is stable: `serde_json::Map` keeps keys sorted, so rendering the
//! same tree twice yields byte-identical text.

use serde_json::{json, Map, Value};

use super::walk::{DOMAIN_PATTERN, HTTPS_URI_PATTERN};
use super::{DocumentSchema, Format, Node, ObjectNode, StringNode, TaggedNode};

const DRAFT_07: &str = "http://json-schema.org/draft-07/schema#";

/// The published schema document as a JSON value.
pub fn schema_document(schema: &DocumentSchema) -> Value {
    let mut doc = render_object(&schema.root, None);
    doc.insert("$schema".to_string(), json!(DRAFT_07));
    doc.insert("title".to_string(), json!(schema.title));
    doc.insert("description".to_string(), json!(schema.description));
    Value::Object(doc)
}

/// The published schema document as text: two-space indentation and a
/// trailing newline.
pub fn render_schema_document(schema: &DocumentSchema) -> String {
    format!("{:#}\n", schema_document(schema))
}

fn render(node: &Node) -> Value {
    match node {
        Node::String(rule) => Value::Object(render_string(rule)),
        Node::Const(value) => json!({ "type": "string", "const": value }),
        Node::Enum(values) => json!({ "type": "string", "enum": values }),
        Node::Boolean => json!({ "type": "boolean" }),
        Node::Scalar => json!({ "type": ["string", "boolean", "number"] }),
        Node::Array(rule) => {
            let mut out = Map::new();
            out.insert("type".to_string(), json!("array"));
            out.insert("items".to_string(), render(&rule.items));
            if rule.min_items > 0 {
                out.insert("minItems".to_string(), json!(rule.min_items));
            }
            Value::Object(out)
        }
        Node::Object(rule) => Value::Object(render_object(rule, None)),
        Node::Map(values) => json!({ "type": "object", "additionalProperties": render(values) }),
        Node::Tagged(rule) => render_tagged(rule),
    }
}

fn render_string(rule: &StringNode) -> Map<String, Value> {
    let mut out = Map::new();
    out.insert("type".to_string(), json!("string"));
    if let Some(min) = rule.min_len {
        out.insert("minLength".to_string(), json!(min));
    }
    match rule.format {
        Some(Format::Uri) => {
            out.insert("format".to_string(), json!("uri"));
        }
        Some(Format::HttpsUri) => {
            out.insert("format".to_string(), json!("uri"));
            out.insert("pattern".to_string(), json!(HTTPS_URI_PATTERN));
        }
        Some(Format::Domain) => {
            out.insert("pattern".to_string(), json!(DOMAIN_PATTERN));
        }
        None => {}
    }
    out
}

/// `tag` is the discriminator of an enclosing tagged union; it is emitted as
/// the first declared property with a `const` value.
fn render_object(rule: &ObjectNode, tag: Option<(&str, &str)>) -> Map<String, Value> {
    let mut properties = Map::new();
    let mut required = Vec::new();

    if let Some((key, value)) = tag {
        properties.insert(key.to_string(), json!({ "type": "string", "const": value }));
        required.push(key.to_string());
    }

    for field in &rule.fields {
        properties.insert(field.name.to_string(), render(&field.node));
        if field.required {
            required.push(field.name.to_string());
        }
    }

    let mut out = Map::new();
    out.insert("type".to_string(), json!("object"));
    out.insert("properties".to_string(), Value::Object(properties));
    if !required.is_empty() {
        out.insert("required".to_string(), json!(required));
    }
    out.insert("additionalProperties".to_string(), json!(false));
    if rule.allow_extensions {
        out.insert("patternProperties".to_string(), json!({ "^x-": {} }));
    }
    out
}

fn render_tagged(rule: &TaggedNode) -> Value {
    let variants: Vec<Value> = rule
        .variants
        .iter()
        .map(|(name, object)| Value::Object(render_object(object, Some((rule.tag, name)))))
        .collect();
    json!({ "oneOf": variants })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::*;

    fn sample() -> DocumentSchema {
        DocumentSchema {
            title: "Sample",
            description: "A sample document",
            root: object(vec![
                required("name", non_empty()),
                optional("site", formatted(Format::HttpsUri)),
                required("items", non_empty_array(one_of(&["a", "b"]))),
            ])
            .with_extensions(),
        }
    }

    #[test]
    fn test_document_header() {
        let doc = schema_document(&sample());
        assert_eq!(doc["$schema"], DRAFT_07);
        assert_eq!(doc["title"], "Sample");
        assert_eq!(doc["additionalProperties"], false);
        assert_eq!(doc["patternProperties"]["^x-"], json!({}));
        assert_eq!(doc["required"], json!(["name", "items"]));
    }

    #[test]
    fn test_property_shapes() {
        let doc = schema_document(&sample());
        assert_eq!(doc["properties"]["name"], json!({ "type": "string", "minLength": 1 }));
        assert_eq!(
            doc["properties"]["site"],
            json!({ "type": "string", "format": "uri", "pattern": "^https://" })
        );
        assert_eq!(
            doc["properties"]["items"],
            json!({ "type": "array", "minItems": 1, "items": { "type": "string", "enum": ["a", "b"] } })
        );
    }

    #[test]
    fn test_tagged_variants_carry_const_discriminator() {
        let node = tagged(
            "type",
            vec![("remote", object(vec![required("uri", formatted(Format::Uri))]))],
        );
        let rendered = render(&node);
        let variant = &rendered["oneOf"][0];
        assert_eq!(variant["properties"]["type"]["const"], "remote");
        assert_eq!(variant["required"], json!(["type", "uri"]));
    }

    #[test]
    fn test_rendering_is_byte_stable() {
        let first = render_schema_document(&sample());
        let second = render_schema_document(&sample());
        assert_eq!(first, second);
        assert!(first.ends_with("}\n"));
        // sorted keys
        assert!(first.find("\"$schema\"").unwrap() < first.find("\"additionalProperties\"").unwrap());
    }

    #[test]
    fn test_field_change_changes_output() {
        let mut mutated = sample();
        mutated.root.fields[0].required = false;
        assert_ne!(
            render_schema_document(&sample()),
            render_schema_document(&mutated)
        );
    }
}
