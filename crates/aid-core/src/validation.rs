//! Validation outcomes.
//!
//! A [`ValidationResult`] is the normal return value of validating an
//! artifact: either the whole document conforms and a typed value is
//! produced, or every violation found is listed in a deterministic order.

use serde::{Deserialize, Serialize};

/// Category of a single field-level violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldErrorKind {
    MissingRequired,
    InvalidType,
    InvalidValue,
    TooShort,
    TooLong,
    InvalidFormat,
    InvalidLength,
    UnknownField,
    DuplicateKey,
    InvalidCharset,
}

impl FieldErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldErrorKind::MissingRequired => "MISSING_REQUIRED",
            FieldErrorKind::InvalidType => "INVALID_TYPE",
            FieldErrorKind::InvalidValue => "INVALID_VALUE",
            FieldErrorKind::TooShort => "TOO_SHORT",
            FieldErrorKind::TooLong => "TOO_LONG",
            FieldErrorKind::InvalidFormat => "INVALID_FORMAT",
            FieldErrorKind::InvalidLength => "INVALID_LENGTH",
            FieldErrorKind::UnknownField => "UNKNOWN_FIELD",
            FieldErrorKind::DuplicateKey => "DUPLICATE_KEY",
            FieldErrorKind::InvalidCharset => "INVALID_CHARSET",
        }
    }
}

impl std::fmt::Display for FieldErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One violation, located by a dot/bracket path into the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// `capabilities[0].authentication.placement`; empty for the root.
    pub path: String,
    pub kind: FieldErrorKind,
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, kind: FieldErrorKind, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}: {}", self.kind, self.message)
        } else {
            write!(f, "{} at {}: {}", self.kind, self.path, self.message)
        }
    }
}

/// Outcome of validating a payload against one registry entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult<T> {
    pub ok: bool,
    pub value: Option<T>,
    pub errors: Vec<FieldError>,
}

impl<T> ValidationResult<T> {
    pub fn valid(value: T) -> Self {
        Self {
            ok: true,
            value: Some(value),
            errors: Vec::new(),
        }
    }

    /// An invalid result. `errors` must not be empty.
    pub fn invalid(errors: Vec<FieldError>) -> Self {
        debug_assert!(!errors.is_empty(), "invalid result without errors");
        Self {
            ok: false,
            value: None,
            errors,
        }
    }

    /// Valid when no errors were collected, otherwise invalid.
    pub fn from_parts(value: impl FnOnce() -> T, errors: Vec<FieldError>) -> Self {
        if errors.is_empty() {
            Self::valid(value())
        } else {
            Self::invalid(errors)
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ValidationResult<U> {
        ValidationResult {
            ok: self.ok,
            value: self.value.map(f),
            errors: self.errors,
        }
    }

    /// Whether any error has the given path and kind.
    pub fn has_error(&self, path: &str, kind: FieldErrorKind) -> bool {
        self.errors.iter().any(|e| e.path == path && e.kind == kind)
    }
}

/// Join a child key onto a parent path (`a` + `b` -> `a.b`).
pub(crate) fn child_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

/// Join an array index onto a parent path (`a` + 0 -> `a[0]`).
pub(crate) fn index_path(parent: &str, index: usize) -> String {
    format!("{parent}[{index}]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        assert_eq!(child_path("", "name"), "name");
        assert_eq!(child_path("capabilities[0]", "uri"), "capabilities[0].uri");
        assert_eq!(index_path("capabilities", 2), "capabilities[2]");
        assert_eq!(index_path("", 1), "[1]");
    }

    #[test]
    fn test_from_parts() {
        let ok: ValidationResult<u8> = ValidationResult::from_parts(|| 7, vec![]);
        assert!(ok.ok);
        assert_eq!(ok.value, Some(7));

        let bad: ValidationResult<u8> = ValidationResult::from_parts(
            || unreachable!("value built for invalid result"),
            vec![FieldError::new("name", FieldErrorKind::MissingRequired, "required")],
        );
        assert!(!bad.ok);
        assert!(bad.value.is_none());
        assert!(bad.has_error("name", FieldErrorKind::MissingRequired));
    }

    #[test]
    fn test_field_error_display() {
        let err = FieldError::new("name", FieldErrorKind::MissingRequired, "field is required");
        assert_eq!(err.to_string(), "MISSING_REQUIRED at name: field is required");
        let root = FieldError::new("", FieldErrorKind::InvalidType, "expected object");
        assert_eq!(root.to_string(), "INVALID_TYPE: expected object");
    }

    #[test]
    fn test_serialized_shape() {
        let result: ValidationResult<u8> = ValidationResult::invalid(vec![FieldError::new(
            "capabilities",
            FieldErrorKind::InvalidType,
            "expected array",
        )]);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["ok"], false);
        assert!(json["value"].is_null());
        assert_eq!(json["errors"][0]["kind"], "INVALID_TYPE");
        assert_eq!(json["errors"][0]["path"], "capabilities");
    }
}
