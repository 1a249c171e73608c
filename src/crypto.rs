//! Symmetric authenticator placeholder standing in for real threshold
//! cryptography (spec §4.1, non-goal per spec §1). Grounded on
//! `internal/crypto/crypto.go`.

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use hmac::{Hmac, Mac};
use sha2::{Digest as _, Sha256};

use crate::types::{Digest, Height, NodeId, View};

type HmacSha256 = Hmac<Sha256>;

/// `sign(sk, msg) -> share`: deterministic authenticator over `msg` keyed
/// by `sk`.
pub fn sign(sk: &str, msg: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(sk.as_bytes()).expect("HMAC accepts any key length");
    mac.update(msg);
    B64.encode(mac.finalize().into_bytes())
}

/// `verify(sk, msg, share) -> bool`: constant-shape equality of the
/// recomputed tag and the candidate. HMAC output comparison is delegated to
/// `hmac::Mac::verify_slice`, which is constant-time; the base64 decode of
/// the candidate is not secret-dependent so need not be.
pub fn verify(sk: &str, msg: &[u8], share: &str) -> bool {
    let Ok(candidate) = B64.decode(share) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(sk.as_bytes()).expect("HMAC accepts any key length");
    mac.update(msg);
    mac.verify_slice(&candidate).is_ok()
}

/// `aggregate(shares) -> full`: canonicalize by sorting share strings
/// lexicographically, join with `|`, hash. Stable function of the multiset
/// of shares (spec §4.1, P6).
pub fn aggregate<I, S>(shares: I) -> String
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut sorted: Vec<String> = shares.into_iter().map(Into::into).collect();
    sorted.sort();
    let raw = sorted.join("|");
    B64.encode(sha2::Sha256::digest(raw.as_bytes()))
}

/// `verify_aggregate(shares, full) -> bool`: recompute and compare.
pub fn verify_aggregate<I, S>(shares: I, full: &str) -> bool
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    aggregate(shares) == full
}

/// Canonical message for a vote: the serialization of
/// `{digest, from, height, type, view}` with keys in lexicographic order,
/// values JSON-escaped. A `BTreeMap` is used so `serde_json` emits the keys
/// already sorted, reproducing the Go original's hand-built canonical JSON
/// byte-for-byte.
pub fn vote_message(msg_type: &str, view: View, height: Height, digest: &Digest, from: NodeId) -> Vec<u8> {
    let mut ordered = std::collections::BTreeMap::new();
    ordered.insert("digest", serde_json::Value::String(digest.clone()));
    ordered.insert("from", serde_json::Value::from(from));
    ordered.insert("height", serde_json::Value::from(height));
    ordered.insert("type", serde_json::Value::String(msg_type.to_string()));
    ordered.insert("view", serde_json::Value::from(view));
    serde_json::to_vec(&ordered).expect("BTreeMap<&str, Value> always serializes")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sign_verify_round_trip_r1() {
        let sk = "node-1-secret";
        let msg = vote_message("Prepare", 1, 1, &"abc".to_string(), 1);
        let share = sign(sk, &msg);
        assert!(verify(sk, &msg, &share));
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let msg = vote_message("Prepare", 1, 1, &"abc".to_string(), 3);
        let share = sign("node-3-secret", &msg);
        assert!(!verify("not-node-3-secret", &msg, &share));
    }

    #[test]
    fn verify_rejects_malformed_share() {
        let msg = vote_message("Prepare", 1, 1, &"abc".to_string(), 3);
        assert!(!verify("node-3-secret", &msg, "not-base64!!"));
    }

    #[test]
    fn aggregate_is_permutation_invariant_p6() {
        let shares = vec!["c".to_string(), "a".to_string(), "b".to_string()];
        let permuted = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(aggregate(shares), aggregate(permuted));
    }

    #[test]
    fn aggregate_differs_for_different_multisets() {
        let a = aggregate(vec!["a".to_string(), "b".to_string()]);
        let b = aggregate(vec!["a".to_string(), "c".to_string()]);
        assert_ne!(a, b);
    }

    #[test]
    fn verify_aggregate_round_trip_r2() {
        let shares = vec!["x".to_string(), "y".to_string(), "z".to_string()];
        let full = aggregate(shares.clone());
        assert!(verify_aggregate(shares, &full));
    }

    #[test]
    fn vote_message_keys_are_lexicographically_sorted() {
        let msg = vote_message("Commit", 2, 3, &"digest-value".to_string(), 7);
        let text = String::from_utf8(msg).unwrap();
        assert_eq!(
            text,
            r#"{"digest":"digest-value","from":7,"height":3,"type":"Commit","view":2}"#
        );
    }
}
