//! Recovery of real-world identifiers from a de-identification
//! placeholder map.
//!
//! The upstream redaction step replaces every identifier in the document
//! text with a numbered placeholder (for example `<EIN_1>` or
//! `<US_SSN_2>`) and hands back the placeholder-to-original map. The K-1
//! layout prints the issuing entity's identifier (Part I) before the
//! recipient's identifier (Part II), so first-occurrence order recovers
//! which is which.

use std::collections::BTreeMap;

/// Matches the issuer identifier shape `NN-NNNNNNN` (EIN).
#[must_use]
pub fn is_issuer_id_shape(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 10
        && bytes[..2].iter().all(u8::is_ascii_digit)
        && bytes[2] == b'-'
        && bytes[3..].iter().all(u8::is_ascii_digit)
}

/// Matches the individual recipient identifier shape `NNN-NN-NNNN` (SSN).
#[must_use]
pub fn is_recipient_id_shape(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 11
        && bytes[..3].iter().all(u8::is_ascii_digit)
        && bytes[3] == b'-'
        && bytes[4..6].iter().all(u8::is_ascii_digit)
        && bytes[6] == b'-'
        && bytes[7..].iter().all(u8::is_ascii_digit)
}

/// The numeric suffix of a placeholder token, e.g. 2 for `<EIN_2>`.
/// Placeholders are numbered in first-occurrence order by the redaction
/// step, so sorting on this suffix recovers document order.
fn placeholder_ordinal(placeholder: &str) -> u32 {
    let Some(underscore) = placeholder.rfind('_') else {
        return 0;
    };
    let digits: String = placeholder[underscore + 1..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().unwrap_or(0)
}

/// Recover `(issuer_id, recipient_id)` from a placeholder map.
///
/// The issuer id is the first issuer-shaped value in document order. The
/// recipient id is the first recipient-shaped value; if the recipient is
/// itself an entity no individual-shaped value exists, and the second
/// issuer-shaped value is used instead. Returns `(None, None)` when no
/// issuer-shaped value exists or both recipient candidates are absent;
/// callers skip ingestion and log, this is not fatal for a batch.
#[must_use]
pub fn resolve_identifiers(
    placeholder_mapping: &BTreeMap<String, String>,
) -> (Option<String>, Option<String>) {
    if placeholder_mapping.is_empty() {
        return (None, None);
    }

    let mut issuer_shaped: Vec<(u32, &str)> = Vec::new();
    let mut recipient_shaped: Vec<(u32, &str)> = Vec::new();

    for (placeholder, original) in placeholder_mapping {
        let original = original.trim();
        if is_issuer_id_shape(original) {
            issuer_shaped.push((placeholder_ordinal(placeholder), original));
        } else if is_recipient_id_shape(original) {
            recipient_shaped.push((placeholder_ordinal(placeholder), original));
        }
    }

    issuer_shaped.sort_by_key(|(ordinal, _)| *ordinal);
    recipient_shaped.sort_by_key(|(ordinal, _)| *ordinal);

    let issuer_id = issuer_shaped.first().map(|(_, value)| (*value).to_string());
    let recipient_id = recipient_shaped
        .first()
        .or_else(|| issuer_shaped.get(1))
        .map(|(_, value)| (*value).to_string());

    match (issuer_id, recipient_id) {
        (Some(issuer), Some(recipient)) => (Some(issuer), Some(recipient)),
        _ => (None, None),
    }
}
