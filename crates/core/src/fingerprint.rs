use serde_json::json;
use sha2::{Digest, Sha256};

use crate::domain::OptimizeRequest;

/// Key namespace for optimization results. A shared backing store can hold
/// other key families without collisions.
pub const CACHE_KEY_PREFIX: &str = "optimize:";

/// Derive the deterministic cache key for a request: every input field plus
/// the provider, serialized as canonical JSON (lexicographic key order),
/// hashed with SHA-256, rendered as lowercase hex under the `optimize:`
/// namespace. Two requests collide exactly when every field matches.
pub fn request_fingerprint(request: &OptimizeRequest) -> String {
    // serde_json maps are BTree-backed, so key order is already canonical.
    let canonical = json!({
        "additional_context": request.additional_context,
        "current_adr": request.current_adr,
        "historical_occupancy": request.historical_occupancy,
        "hotel_location": request.hotel_location,
        "hotel_name": request.hotel_name,
        "provider": request.provider.as_str(),
        "target_revpar": request.target_revpar,
    })
    .to_string();

    format!("{CACHE_KEY_PREFIX}{}", sha256_hex(canonical.as_bytes()))
}

fn sha256_hex(payload: &[u8]) -> String {
    let digest = Sha256::digest(payload);
    let mut output = String::with_capacity(digest.len() * 2);
    for byte in digest {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}
