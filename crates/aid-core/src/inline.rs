//! Validators for self-contained payloads (`txt` and `pair` kinds).
//!
//! Both operate on the raw TXT string. Paths are `""` for whole-payload
//! problems, `[i]` for the i-th `;` segment and the key name for
//! per-key problems.

use crate::model::{InlineProfile, PairingRecord, TxtEntry};
use crate::validation::{index_path, FieldError, FieldErrorKind, ValidationResult};

/// Upper bound on an inline payload, in bytes.
pub const MAX_TXT_BYTES: usize = 1024;

/// Length in bytes of a decoded pairing key.
pub const PAIRING_KEY_BYTES: usize = 32;

pub fn validate_txt(raw: &str) -> ValidationResult<InlineProfile> {
    let (entries, errors) = check_txt(raw);
    ValidationResult::from_parts(|| InlineProfile { entries }, errors)
}

pub fn validate_pair(raw: &str) -> ValidationResult<PairingRecord> {
    let (entries, mut errors) = check_txt(raw);
    let profile = InlineProfile { entries };

    let key = match profile.get("p") {
        None => {
            errors.push(FieldError::new(
                "p",
                FieldErrorKind::MissingRequired,
                "pair record requires key p",
            ));
            None
        }
        Some(value) => match hex::decode(value) {
            Err(e) => {
                errors.push(FieldError::new(
                    "p",
                    FieldErrorKind::InvalidFormat,
                    format!("pairing key is not hex: {e}"),
                ));
                None
            }
            Ok(bytes) if bytes.len() != PAIRING_KEY_BYTES => {
                errors.push(FieldError::new(
                    "p",
                    FieldErrorKind::InvalidLength,
                    format!(
                        "pairing key is {} bytes, expected {PAIRING_KEY_BYTES}",
                        bytes.len()
                    ),
                ));
                None
            }
            Ok(bytes) => Some(hex::encode(bytes)),
        },
    };

    let uri = profile.get("u").map(str::to_string);
    ValidationResult::from_parts(
        || PairingRecord {
            pairing_key: key.unwrap_or_default(),
            uri,
        },
        errors,
    )
}

fn check_txt(raw: &str) -> (Vec<TxtEntry>, Vec<FieldError>) {
    let mut errors = Vec::new();

    if let Some((offset, c)) = raw
        .char_indices()
        .find(|(_, c)| !(' '..='~').contains(c))
    {
        errors.push(FieldError::new(
            "",
            FieldErrorKind::InvalidCharset,
            format!("character {c:?} at byte {offset} is not printable ASCII"),
        ));
    }

    if raw.len() > MAX_TXT_BYTES {
        errors.push(FieldError::new(
            "",
            FieldErrorKind::TooLong,
            format!("payload is {} bytes, limit is {MAX_TXT_BYTES}", raw.len()),
        ));
    }

    let mut entries: Vec<TxtEntry> = Vec::new();
    for (index, segment) in raw.split(';').enumerate() {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        match segment.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                let key = key.trim();
                if entries.iter().any(|e| e.key == key) {
                    errors.push(FieldError::new(
                        key,
                        FieldErrorKind::DuplicateKey,
                        format!("key {key:?} appears more than once"),
                    ));
                } else {
                    entries.push(TxtEntry {
                        key: key.to_string(),
                        value: value.trim().to_string(),
                    });
                }
            }
            _ => errors.push(FieldError::new(
                index_path("", index),
                FieldErrorKind::InvalidFormat,
                format!("segment {segment:?} is not key=value"),
            )),
        }
    }

    (entries, errors)
}
