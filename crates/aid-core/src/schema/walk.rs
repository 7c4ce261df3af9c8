//! Runtime validation against a schema tree.
//!
//! The walk never stops at the first violation. Errors are appended in
//! declaration order: an object's declared fields first (depth first), then
//! its undeclared keys in sorted order; array items by index.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::{ArrayNode, Format, Node, ObjectNode, StringNode, TaggedNode};
use crate::validation::{child_path, index_path, FieldError, FieldErrorKind};

/// Mirrors the `pattern` published for [`Format::Domain`].
pub(crate) const DOMAIN_PATTERN: &str = "^(https?://)?[A-Za-z0-9.-]+/?$";

static DOMAIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DOMAIN_PATTERN).expect("valid domain pattern"));

/// Mirrors the `pattern` published for [`Format::HttpsUri`]. Case-sensitive.
pub(crate) const HTTPS_URI_PATTERN: &str = "^https://";

static HTTPS_URI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(HTTPS_URI_PATTERN).expect("valid https pattern"));

/// Validate `value` against an object schema, collecting every violation.
pub fn validate_document(root: &ObjectNode, value: &Value) -> Vec<FieldError> {
    let mut errors = Vec::new();
    walk_object(root, value, "", None, &mut errors);
    errors
}

fn walk(node: &Node, value: &Value, path: &str, errors: &mut Vec<FieldError>) {
    match node {
        Node::String(rule) => walk_string(rule, value, path, errors),
        Node::Const(expected) => match value.as_str() {
            Some(s) if s == *expected => {}
            Some(s) => errors.push(FieldError::new(
                path,
                FieldErrorKind::InvalidValue,
                format!("expected {expected:?}, found {s:?}"),
            )),
            None => errors.push(type_error(path, "string", value)),
        },
        Node::Enum(allowed) => match value.as_str() {
            Some(s) if allowed.contains(&s) => {}
            Some(s) => errors.push(FieldError::new(
                path,
                FieldErrorKind::InvalidValue,
                format!("expected one of {}, found {s:?}", allowed.join(", ")),
            )),
            None => errors.push(type_error(path, "string", value)),
        },
        Node::Boolean => {
            if !value.is_boolean() {
                errors.push(type_error(path, "boolean", value));
            }
        }
        Node::Scalar => {
            if !(value.is_string() || value.is_boolean() || value.is_number()) {
                errors.push(type_error(path, "string, boolean or number", value));
            }
        }
        Node::Array(rule) => walk_array(rule, value, path, errors),
        Node::Object(rule) => walk_object(rule, value, path, None, errors),
        Node::Map(values) => match value.as_object() {
            Some(entries) => {
                for (key, entry) in entries {
                    walk(values, entry, &child_path(path, key), errors);
                }
            }
            None => errors.push(type_error(path, "object", value)),
        },
        Node::Tagged(rule) => walk_tagged(rule, value, path, errors),
    }
}

fn walk_string(rule: &StringNode, value: &Value, path: &str, errors: &mut Vec<FieldError>) {
    let Some(s) = value.as_str() else {
        errors.push(type_error(path, "string", value));
        return;
    };

    if let Some(min) = rule.min_len {
        if s.chars().count() < min {
            errors.push(FieldError::new(
                path,
                FieldErrorKind::TooShort,
                format!("must be at least {min} character(s)"),
            ));
            return;
        }
    }

    if let Some(format) = rule.format {
        if let Err(reason) = check_format(format, s) {
            errors.push(FieldError::new(path, FieldErrorKind::InvalidFormat, reason));
        }
    }
}

fn check_format(format: Format, s: &str) -> Result<(), String> {
    match format {
        Format::Uri => url::Url::parse(s)
            .map(|_| ())
            .map_err(|e| format!("{s:?} is not an absolute URI: {e}")),
        Format::HttpsUri => match url::Url::parse(s) {
            Err(e) => Err(format!("{s:?} is not an absolute URI: {e}")),
            Ok(url) if url.scheme() != "https" => {
                Err(format!("{s:?} must use https, not {}", url.scheme()))
            }
            Ok(_) if !HTTPS_URI.is_match(s) => {
                Err(format!("{s:?} must start with lowercase \"https://\""))
            }
            Ok(_) => Ok(()),
        },
        Format::Domain => {
            if DOMAIN.is_match(s) {
                Ok(())
            } else {
                Err(format!(
                    "{s:?} must be a bare domain of letters, digits, dots and hyphens"
                ))
            }
        }
    }
}

fn walk_array(rule: &ArrayNode, value: &Value, path: &str, errors: &mut Vec<FieldError>) {
    let Some(items) = value.as_array() else {
        errors.push(type_error(path, "array", value));
        return;
    };

    if items.len() < rule.min_items {
        errors.push(FieldError::new(
            path,
            FieldErrorKind::TooShort,
            format!("must contain at least {} item(s)", rule.min_items),
        ));
    }

    for (index, item) in items.iter().enumerate() {
        walk(&rule.items, item, &index_path(path, index), errors);
    }
}

fn walk_tagged(rule: &TaggedNode, value: &Value, path: &str, errors: &mut Vec<FieldError>) {
    let Some(map) = value.as_object() else {
        errors.push(type_error(path, "object", value));
        return;
    };

    let tag_path = child_path(path, rule.tag);
    let variant = match map.get(rule.tag) {
        None => {
            errors.push(FieldError::new(
                tag_path,
                FieldErrorKind::MissingRequired,
                "field is required",
            ));
            return;
        }
        Some(Value::String(name)) => match rule.variant(name) {
            Some(variant) => variant,
            None => {
                errors.push(FieldError::new(
                    tag_path,
                    FieldErrorKind::InvalidValue,
                    format!(
                        "expected one of {}, found {name:?}",
                        rule.variant_names().join(", ")
                    ),
                ));
                return;
            }
        },
        Some(other) => {
            errors.push(type_error(&tag_path, "string", other));
            return;
        }
    };

    walk_fields(variant, map, path, Some(rule.tag), errors);
}

fn walk_object(
    rule: &ObjectNode,
    value: &Value,
    path: &str,
    tag: Option<&str>,
    errors: &mut Vec<FieldError>,
) {
    match value.as_object() {
        Some(map) => walk_fields(rule, map, path, tag, errors),
        None => errors.push(type_error(path, "object", value)),
    }
}

fn walk_fields(
    rule: &ObjectNode,
    map: &Map<String, Value>,
    path: &str,
    tag: Option<&str>,
    errors: &mut Vec<FieldError>,
) {
    for field in &rule.fields {
        let field_path = child_path(path, field.name);
        match map.get(field.name) {
            Some(value) => walk(&field.node, value, &field_path, errors),
            None if field.required => errors.push(FieldError::new(
                field_path,
                FieldErrorKind::MissingRequired,
                "field is required",
            )),
            None => {}
        }
    }

    let mut unknown: Vec<&String> = map
        .keys()
        .filter(|key| Some(key.as_str()) != tag)
        .filter(|key| rule.field(key).is_none())
        .filter(|key| !(rule.allow_extensions && key.starts_with("x-")))
        .collect();
    unknown.sort();

    for key in unknown {
        errors.push(FieldError::new(
            child_path(path, key),
            FieldErrorKind::UnknownField,
            "field is not part of the schema",
        ));
    }
}

fn type_error(path: &str, expected: &str, found: &Value) -> FieldError {
    FieldError::new(
        path,
        FieldErrorKind::InvalidType,
        format!("expected {expected}, found {}", json_type(found)),
    )
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::*;
    use serde_json::json;

    fn person() -> ObjectNode {
        object(vec![
            required("name", non_empty()),
            optional("homepage", formatted(Format::HttpsUri)),
            required("tags", array(string())),
        ])
    }

    #[test]
    fn test_valid_document_has_no_errors() {
        let errors = validate_document(&person(), &json!({ "name": "a", "tags": ["x"] }));
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn test_collects_all_violations_in_declaration_order() {
        let doc = json!({ "homepage": "http://insecure", "tags": [1, "ok", true], "zeta": 1, "alpha": 2 });
        let errors = validate_document(&person(), &doc);
        let got: Vec<(&str, FieldErrorKind)> =
            errors.iter().map(|e| (e.path.as_str(), e.kind)).collect();
        assert_eq!(
            got,
            vec![
                ("name", FieldErrorKind::MissingRequired),
                ("homepage", FieldErrorKind::InvalidFormat),
                ("tags[0]", FieldErrorKind::InvalidType),
                ("tags[2]", FieldErrorKind::InvalidType),
                ("alpha", FieldErrorKind::UnknownField),
                ("zeta", FieldErrorKind::UnknownField),
            ]
        );
    }

    #[test]
    fn test_root_must_be_object() {
        let errors = validate_document(&person(), &json!([1, 2]));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "");
        assert_eq!(errors[0].kind, FieldErrorKind::InvalidType);
    }

    #[test]
    fn test_extensions_only_when_allowed() {
        let doc = json!({ "name": "a", "tags": [], "x-vendor": true });
        assert_eq!(validate_document(&person(), &doc).len(), 1);
        assert!(validate_document(&person().with_extensions(), &doc).is_empty());
    }

    #[test]
    fn test_empty_string_is_too_short() {
        let errors = validate_document(&person(), &json!({ "name": "", "tags": [] }));
        assert_eq!(errors[0].kind, FieldErrorKind::TooShort);
    }

    #[test]
    fn test_tagged_union_dispatch() {
        let shape = object(vec![required(
            "shape",
            tagged(
                "type",
                vec![
                    ("circle", object(vec![required("radius", scalar())])),
                    ("label", object(vec![required("text", non_empty())])),
                ],
            ),
        )]);

        assert!(validate_document(&shape, &json!({ "shape": { "type": "circle", "radius": 2 } })).is_empty());

        let missing_tag = validate_document(&shape, &json!({ "shape": { "radius": 2 } }));
        assert_eq!(missing_tag[0].path, "shape.type");
        assert_eq!(missing_tag[0].kind, FieldErrorKind::MissingRequired);

        let bad_tag = validate_document(&shape, &json!({ "shape": { "type": "square" } }));
        assert_eq!(bad_tag.len(), 1);
        assert_eq!(bad_tag[0].kind, FieldErrorKind::InvalidValue);
        assert!(bad_tag[0].message.contains("circle, label"));

        let wrong_fields =
            validate_document(&shape, &json!({ "shape": { "type": "label", "radius": 2 } }));
        let got: Vec<&str> = wrong_fields.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(got, vec!["shape.text", "shape.radius"]);
    }

    #[test]
    fn test_domain_format() {
        assert!(check_format(Format::Domain, "example.com").is_ok());
        assert!(check_format(Format::Domain, "https://Example.com").is_ok());
        assert!(check_format(Format::Domain, "https://example.com/").is_ok());
        assert!(check_format(Format::Domain, "example.com//").is_err());
        assert!(check_format(Format::Domain, "example.com/path").is_err());
        assert!(check_format(Format::Domain, "exa mple.com").is_err());
    }

    #[test]
    fn test_https_uri_format_matches_published_pattern() {
        let published = Regex::new(HTTPS_URI_PATTERN).unwrap();
        for uri in [
            "https://api.example.com/mcp",
            "HTTPS://api.example.com/mcp",
            "Https://api.example.com/mcp",
            "http://api.example.com/mcp",
            "wss://api.example.com/mcp",
            "https:api.example.com",
        ] {
            assert_eq!(
                check_format(Format::HttpsUri, uri).is_ok(),
                published.is_match(uri) && url::Url::parse(uri).is_ok(),
                "{uri}"
            );
        }
        let err = check_format(Format::HttpsUri, "HTTPS://api.example.com/mcp").unwrap_err();
        assert!(err.contains("lowercase"), "{err}");
    }

    #[test]
    fn test_walk_is_deterministic() {
        let doc = json!({ "b": 1, "a": 2, "tags": "nope" });
        assert_eq!(
            validate_document(&person(), &doc),
            validate_document(&person(), &doc)
        );
    }
}
