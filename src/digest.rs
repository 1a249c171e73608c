//! Content digest binding a proposal to `(view, height, tx)` (spec §4.2).

use sha2::{Digest as _, Sha256};

use crate::types::{Digest, Height, View};

/// `H(view, height, tx)`: hash of `view=V|height=H|tx=T` where `T` is the
/// hex of the hash of the newline-joined transaction lines. An empty `tx`
/// is allowed — the inner hash then is simply the hash of the empty string,
/// grounded in `internal/common/types.go::Digest`.
pub fn digest(view: View, height: Height, tx: &[String]) -> Digest {
    let joined = tx.join("\n");
    let tx_digest = Sha256::digest(joined.as_bytes());
    let raw = format!("view={view}|height={height}|tx={}", hex::encode(tx_digest));
    hex::encode(Sha256::digest(raw.as_bytes()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_tx_is_deterministic() {
        let d1 = digest(1, 1, &[]);
        let d2 = digest(1, 1, &[]);
        assert_eq!(d1, d2);
        assert_eq!(d1.len(), 64);
    }

    #[test]
    fn digest_is_sensitive_to_every_field() {
        let base = digest(1, 1, &["1 2 3".to_string()]);
        assert_ne!(base, digest(2, 1, &["1 2 3".to_string()]));
        assert_ne!(base, digest(1, 2, &["1 2 3".to_string()]));
        assert_ne!(base, digest(1, 1, &["1 2 4".to_string()]));
        assert_ne!(base, digest(1, 1, &[]));
    }

    #[test]
    fn tx_order_matters() {
        let a = digest(1, 1, &["1 2 3".to_string(), "4 5 6".to_string()]);
        let b = digest(1, 1, &["4 5 6".to_string(), "1 2 3".to_string()]);
        assert_ne!(a, b);
    }
}
