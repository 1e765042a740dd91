use std::fmt;

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Digest of a set of value overlays.
///
/// Computed over canonical JSON (object keys sorted at every level, array
/// order preserved) so logically identical inputs hash the same.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValuesDigest(String);

impl ValuesDigest {
    pub fn from_json(value: &Value) -> Self {
        let canonical = canonicalize(value).to_string();
        let hash = Sha256::digest(canonical.as_bytes());
        // First 16 bytes (128 bits)
        Self(format!("sha256:{}", hex::encode(&hash[..16])))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValuesDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonicalize(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
