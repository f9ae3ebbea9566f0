//! Change detection for forecast batches
//!
//! A batch response is fingerprinted with SHA-256 over a canonical JSON
//! rendering (object keys sorted, array order kept). If the ledger already
//! holds that fingerprint for the batch key, the batch is skipped.

use crate::state::BatchLedger;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Render `value` as compact JSON with object keys in sorted order.
///
/// Does not depend on the key order `serde_json::Map` happens to keep.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Hex SHA-256 of the canonical rendering; always 64 characters
#[must_use]
pub fn digest(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(value).as_bytes());
    hex::encode(hasher.finalize())
}

/// True iff the ledger already holds `new_digest` for `batch_key`
#[must_use]
pub fn should_skip(batch_key: &str, new_digest: &str, ledger: &BatchLedger) -> bool {
    ledger.digest_for(batch_key) == Some(new_digest)
}
