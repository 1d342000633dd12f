//! Deterministic idempotency-key derivation.

use std::fmt::Write as _;

use sha2::{Digest as _, Sha256};

use curator_core::{CollectionId, Selection};

/// Derive a stable idempotency key from a normalized submission.
///
/// The five fields are folded into a canonical JSON document (object keys are
/// emitted in sorted order, so logically-equal payloads serialize
/// identically) and hashed with SHA-256. Equal inputs always produce the same
/// 64-char hex digest; any field change produces a different one. A
/// client-supplied key bypasses this entirely; the caller owns its own
/// dedup domain in that case.
pub fn derive_idempotency_key(
    source_collection_id: CollectionId,
    target_collection_id: CollectionId,
    selection: &Selection,
    actor: &str,
) -> String {
    let payload = serde_json::json!({
        "source": source_collection_id,
        "target": target_collection_id,
        "kind": selection.kind_str(),
        "data": selection_data(selection),
        "user": actor,
    });

    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    let digest = hasher.finalize();

    let mut out = String::with_capacity(64);
    for b in digest {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// The selection payload exactly as submitted, without the kind tag (the
/// kind is a separate field of the digest).
fn selection_data(selection: &Selection) -> serde_json::Value {
    match selection {
        Selection::Explicit { ids } => serde_json::json!({ "ids": ids }),
        Selection::AllMatching {
            filter,
            snapshot_total,
        } => serde_json::json!({
            "filter": filter,
            "total_at_snapshot": snapshot_total,
        }),
    }
}
