//! Version 1 definitions of the JSON artifacts.

use super::*;

/// The only `version` value a v1 document may carry.
pub const VERSION: &str = "1";

pub fn manifest_v1() -> DocumentSchema {
    DocumentSchema {
        title: "AID Manifest v1",
        description: "Agent interface manifest referenced by a k=manifest discovery record",
        root: object(vec![
            required("name", non_empty()),
            optional("description", string()),
            required("version", literal(VERSION)),
            required("capabilities", array(capability())),
            optional("metadata", metadata().into()),
        ])
        .with_extensions(),
    }
}

pub fn config_v1() -> DocumentSchema {
    DocumentSchema {
        title: "AID Config v1",
        description: "Generator input describing a service and the capabilities it publishes",
        root: object(vec![
            required("version", literal(VERSION)),
            required("serviceName", non_empty()),
            required("domain", formatted(Format::Domain)),
            optional("env", string()),
            optional("description", string()),
            optional("metadata", metadata().into()),
            required("capabilities", non_empty_array(capability())),
        ])
        .with_extensions(),
    }
}

fn metadata() -> ObjectNode {
    object(vec![
        optional("contentVersion", string()),
        optional("documentation", formatted(Format::Uri)),
        optional("revocationURL", formatted(Format::Uri)),
    ])
}

/// A capability: a remote endpoint or a locally executed package.
pub fn capability() -> Node {
    tagged(
        "type",
        vec![
            (
                "remote",
                capability_variant(vec![
                    required("uri", formatted(Format::HttpsUri)),
                    optional("certificate", certificate().into()),
                ]),
            ),
            (
                "local",
                capability_variant(vec![
                    required("package", package().into()),
                    required("execution", execution().into()),
                ]),
            ),
        ],
    )
}

fn capability_variant(specific: Vec<Field>) -> ObjectNode {
    let mut fields = vec![
        required("name", non_empty()),
        required("protocol", non_empty()),
        optional("description", string()),
        optional("tags", array(string())),
        optional("status", one_of(&["active", "deprecated"])),
        optional("authentication", authentication()),
        optional("configuration", array(configuration_item().into())),
        optional("requiredPaths", array(required_path().into())),
    ];
    fields.extend(specific);
    object(fields)
}

fn certificate() -> ObjectNode {
    object(vec![
        required("source", one_of(&["file", "enrollment"])),
        optional("enrollmentEndpoint", formatted(Format::Uri)),
    ])
}

fn package() -> ObjectNode {
    object(vec![
        required("manager", non_empty()),
        required("identifier", non_empty()),
        optional("digest", string()),
    ])
}

fn execution() -> ObjectNode {
    object(vec![
        required("command", non_empty()),
        required("args", array(string())),
        optional(
            "platformOverrides",
            map(object(vec![
                required("command", non_empty()),
                optional("args", array(string())),
            ])
            .into()),
        ),
    ])
}

fn configuration_item() -> ObjectNode {
    object(vec![
        required("key", non_empty()),
        optional("description", string()),
        required("type", one_of(&["string", "boolean", "integer"])),
        optional("defaultValue", scalar()),
        optional("secret", boolean()),
    ])
}

fn required_path() -> ObjectNode {
    object(vec![
        required("key", non_empty()),
        optional("description", string()),
        optional("type", one_of(&["file", "directory"])),
    ])
}

/// Authentication schemes, discriminated by `scheme`.
pub fn authentication() -> Node {
    let token = || {
        object(vec![
            required("description", non_empty()),
            optional("tokenUrl", formatted(Format::Uri)),
            optional("credentials", credentials()),
            required("placement", placement().into()),
        ])
    };
    let oauth = |endpoints: Vec<Field>| {
        let mut fields = endpoints;
        fields.push(optional("scopes", array(string())));
        fields.push(optional("clientId", string()));
        object(vec![
            required("description", non_empty()),
            optional("credentials", credentials()),
            optional("placement", placement().into()),
            required("oauth", object(fields).into()),
        ])
    };
    let described = || object(vec![required("description", non_empty())]);

    tagged(
        "scheme",
        vec![
            ("none", object(vec![])),
            ("pat", token()),
            ("apikey", token()),
            (
                "basic",
                object(vec![
                    required("description", non_empty()),
                    optional("credentials", credentials()),
                    required("placement", placement().into()),
                ]),
            ),
            (
                "oauth2_device",
                oauth(vec![
                    required("deviceAuthorizationEndpoint", formatted(Format::Uri)),
                    required("tokenEndpoint", formatted(Format::Uri)),
                ]),
            ),
            (
                "oauth2_code",
                oauth(vec![
                    required("authorizationEndpoint", formatted(Format::Uri)),
                    required("tokenEndpoint", formatted(Format::Uri)),
                ]),
            ),
            (
                "oauth2_service",
                oauth(vec![required("tokenEndpoint", formatted(Format::Uri))]),
            ),
            ("mtls", described()),
            ("custom", described()),
        ],
    )
}

fn credentials() -> Node {
    array(
        object(vec![
            required("key", non_empty()),
            required("description", non_empty()),
        ])
        .into(),
    )
}

fn placement() -> ObjectNode {
    object(vec![
        required("in", one_of(&["header", "query", "cli_arg"])),
        required("key", non_empty()),
        optional("format", string()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::FieldErrorKind;
    use serde_json::json;

    fn kinds(doc: &serde_json::Value) -> Vec<(String, FieldErrorKind)> {
        validate_document(&manifest_v1().root, doc)
            .into_iter()
            .map(|e| (e.path, e.kind))
            .collect()
    }

    #[test]
    fn test_minimal_manifest_is_valid() {
        assert!(kinds(&json!({ "name": "demo", "version": "1", "capabilities": [] })).is_empty());
    }

    #[test]
    fn test_missing_name_and_capabilities() {
        assert_eq!(
            kinds(&json!({ "version": "1" })),
            vec![
                ("name".to_string(), FieldErrorKind::MissingRequired),
                ("capabilities".to_string(), FieldErrorKind::MissingRequired),
            ]
        );
    }

    #[test]
    fn test_version_is_pinned() {
        assert_eq!(
            kinds(&json!({ "name": "demo", "version": "2", "capabilities": [] })),
            vec![("version".to_string(), FieldErrorKind::InvalidValue)]
        );
    }

    #[test]
    fn test_full_remote_capability() {
        let doc = json!({
            "name": "demo",
            "version": "1",
            "capabilities": [{
                "type": "remote",
                "name": "chat",
                "protocol": "mcp",
                "tags": ["beta"],
                "status": "active",
                "uri": "https://api.example.com/mcp",
                "authentication": {
                    "scheme": "pat",
                    "description": "Personal access token",
                    "placement": { "in": "header", "key": "Authorization", "format": "Bearer {token}" }
                },
                "configuration": [{ "key": "region", "type": "string", "defaultValue": "eu" }]
            }],
            "metadata": { "documentation": "https://example.com/docs" },
            "x-vendor": { "anything": true }
        });
        assert!(kinds(&doc).is_empty(), "{:?}", kinds(&doc));
    }

    #[test]
    fn test_local_capability_violations() {
        let doc = json!({
            "name": "demo",
            "version": "1",
            "capabilities": [{
                "type": "local",
                "name": "cli",
                "protocol": "mcp",
                "package": { "manager": "npx", "identifier": "" },
                "execution": { "command": "npx", "args": ["-y"], "platformOverrides": { "windows": { "args": [] } } },
                "uri": "https://nope"
            }]
        });
        assert_eq!(
            kinds(&doc),
            vec![
                ("capabilities[0].package.identifier".to_string(), FieldErrorKind::TooShort),
                (
                    "capabilities[0].execution.platformOverrides.windows.command".to_string(),
                    FieldErrorKind::MissingRequired
                ),
                ("capabilities[0].uri".to_string(), FieldErrorKind::UnknownField),
            ]
        );
    }

    #[test]
    fn test_token_scheme_requires_placement() {
        let doc = json!({
            "name": "demo",
            "version": "1",
            "capabilities": [{
                "type": "remote",
                "name": "chat",
                "protocol": "mcp",
                "uri": "http://api.example.com",
                "authentication": { "scheme": "apikey", "description": "key" }
            }]
        });
        assert_eq!(
            kinds(&doc),
            vec![
                ("capabilities[0].authentication.placement".to_string(), FieldErrorKind::MissingRequired),
                ("capabilities[0].uri".to_string(), FieldErrorKind::InvalidFormat),
            ]
        );
    }

    #[test]
    fn test_config_requires_a_capability() {
        let errors = validate_document(
            &config_v1().root,
            &json!({ "version": "1", "serviceName": "svc", "domain": "example.com", "capabilities": [] }),
        );
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "capabilities");
        assert_eq!(errors[0].kind, FieldErrorKind::TooShort);
    }
}
