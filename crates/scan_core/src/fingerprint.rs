//! Content fingerprinting for cached artifacts.
//!
//! A fingerprint is the Sha256 hex digest of the canonical JSON form of
//! (template identity, parameter point). `ParameterPoint` is backed by a
//! sorted map, so the serialized key order never depends on how the point
//! was built; identical inputs always digest identically and the
//! fingerprint is the sole cache key.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::params::ParameterPoint;

#[derive(Serialize)]
struct FingerprintInput<'a> {
    template: &'a str,
    parameters: &'a ParameterPoint,
}

/// Canonical JSON used as digest input; also useful for index debugging.
pub fn canonical_input(template: &str, point: &ParameterPoint) -> String {
    serde_json::to_string(&FingerprintInput {
        template,
        parameters: point,
    })
    .expect("serialization of fingerprint input should not fail")
}

/// Deterministic digest of (template identity, parameter point).
pub fn fingerprint(template: &str, point: &ParameterPoint) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_input(template, point));
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_under_entry_reordering_and_repeated_calls() {
        let mut a = ParameterPoint::new();
        a.insert("c_hhh", 1.5);
        a.insert("scale", 2.0);
        let mut b = ParameterPoint::new();
        b.insert("scale", 2.0);
        b.insert("c_hhh", 1.5);

        assert_eq!(fingerprint("vbf", &a), fingerprint("vbf", &b));
        assert_eq!(fingerprint("vbf", &a), fingerprint("vbf", &a));
    }

    #[test]
    fn differs_when_any_single_value_differs() {
        let mut a = ParameterPoint::new();
        a.insert("c_hhh", 1.5);
        a.insert("scale", 1.0);
        let mut b = a.clone();
        b.insert("c_hhh", 1.5000001);

        assert_ne!(fingerprint("vbf", &a), fingerprint("vbf", &b));
    }

    #[test]
    fn differs_across_templates() {
        let mut point = ParameterPoint::new();
        point.insert("c_hhh", 1.0);
        assert_ne!(fingerprint("vbf", &point), fingerprint("ggf", &point));
    }

    #[test]
    fn digest_is_lowercase_hex_sha256() {
        let point = ParameterPoint::new();
        let digest = fingerprint("vbf", &point);
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
