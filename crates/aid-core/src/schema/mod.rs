//! Declarative schema definitions.
//!
//! A [`Node`] tree is the single canonical description of a JSON artifact.
//! The same tree drives:
//! - the runtime validator ([`validate_document`]), which walks a document
//!   and collects every violation in declaration order;
//! - the published JSON Schema document ([`render_schema_document`]), which
//!   external tooling consumes and the drift check compares byte-for-byte.
//!
//! The versioned definitions themselves live in [`v1`].

mod render;
pub mod v1;
mod walk;

pub use render::{render_schema_document, schema_document};
pub use walk::validate_document;

/// String format constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Absolute URI.
    Uri,
    /// Absolute URI with the `https` scheme.
    HttpsUri,
    /// Bare domain, optionally prefixed with `http://` or `https://`.
    Domain,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StringNode {
    pub min_len: Option<usize>,
    pub format: Option<Format>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayNode {
    pub items: Box<Node>,
    pub min_items: usize,
}

/// A named member of an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub node: Node,
    pub required: bool,
}

/// A closed object: undeclared keys are violations unless `x-` extensions
/// are allowed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectNode {
    pub fields: Vec<Field>,
    pub allow_extensions: bool,
}

impl ObjectNode {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Accept `x-` prefixed vendor keys.
    pub fn with_extensions(mut self) -> Self {
        self.allow_extensions = true;
        self
    }
}

/// A discriminated union of objects selected by the string value of `tag`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedNode {
    pub tag: &'static str,
    pub variants: Vec<(&'static str, ObjectNode)>,
}

impl TaggedNode {
    pub fn variant(&self, name: &str) -> Option<&ObjectNode> {
        self.variants
            .iter()
            .find(|(v, _)| *v == name)
            .map(|(_, node)| node)
    }

    pub fn variant_names(&self) -> Vec<&'static str> {
        self.variants.iter().map(|(v, _)| *v).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    String(StringNode),
    /// A string that must equal the given literal.
    Const(&'static str),
    /// A string drawn from a closed set.
    Enum(&'static [&'static str]),
    Boolean,
    /// string, boolean or number.
    Scalar,
    Array(ArrayNode),
    Object(ObjectNode),
    /// An object with arbitrary keys whose values share one shape.
    Map(Box<Node>),
    Tagged(TaggedNode),
}

pub fn string() -> Node {
    Node::String(StringNode::default())
}

/// A string of at least one character.
pub fn non_empty() -> Node {
    Node::String(StringNode {
        min_len: Some(1),
        format: None,
    })
}

pub fn formatted(format: Format) -> Node {
    Node::String(StringNode {
        min_len: None,
        format: Some(format),
    })
}

pub fn literal(value: &'static str) -> Node {
    Node::Const(value)
}

pub fn one_of(values: &'static [&'static str]) -> Node {
    Node::Enum(values)
}

pub fn boolean() -> Node {
    Node::Boolean
}

pub fn scalar() -> Node {
    Node::Scalar
}

pub fn array(items: Node) -> Node {
    Node::Array(ArrayNode {
        items: Box::new(items),
        min_items: 0,
    })
}

pub fn non_empty_array(items: Node) -> Node {
    Node::Array(ArrayNode {
        items: Box::new(items),
        min_items: 1,
    })
}

pub fn map(values: Node) -> Node {
    Node::Map(Box::new(values))
}

pub fn object(fields: Vec<Field>) -> ObjectNode {
    ObjectNode {
        fields,
        allow_extensions: false,
    }
}

pub fn tagged(tag: &'static str, variants: Vec<(&'static str, ObjectNode)>) -> Node {
    Node::Tagged(TaggedNode { tag, variants })
}

pub fn required(name: &'static str, node: Node) -> Field {
    Field {
        name,
        node,
        required: true,
    }
}

pub fn optional(name: &'static str, node: Node) -> Field {
    Field {
        name,
        node,
        required: false,
    }
}

impl From<ObjectNode> for Node {
    fn from(node: ObjectNode) -> Self {
        Node::Object(node)
    }
}

/// A published schema: the tree plus the document-level title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSchema {
    pub title: &'static str,
    pub description: &'static str,
    pub root: ObjectNode,
}
