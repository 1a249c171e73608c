//! Synthetic proposal workload and the mock execution stub (spec §4.5).
//! Grounded on `internal/nodesvc/service.go::generateTx`/`executeLoad`.

use rand::Rng;

use crate::types::Height;

const ACCOUNT_SPACE: u32 = 1001;

/// `100 * height` lines of the form `A B N`, `A, B ∈ [0, 1000]`, `A != B`,
/// `N ∈ [1, 10]`. Randomness need not be reproducible; the workload exists
/// purely to scale bytes and CPU with height.
pub fn generate_tx(height: Height) -> Vec<String> {
    let size = (height as usize) * 100;
    let mut rng = rand::thread_rng();
    let mut tx = Vec::with_capacity(size);
    for _ in 0..size {
        let a = rng.gen_range(0..ACCOUNT_SPACE);
        let mut b = rng.gen_range(0..ACCOUNT_SPACE);
        while b == a {
            b = rng.gen_range(0..ACCOUNT_SPACE);
        }
        let n = rng.gen_range(1..=10u32);
        tx.push(format!("{a} {b} {n}"));
    }
    tx
}

/// Mock "execution": a local integer vector of length 1001 initialized to
/// `[0, 1, ..., 1000]`, mutated by each well-formed line, then discarded.
/// Exists to impose deterministic work proportional to batch size.
pub fn execute(tx: &[String]) {
    let mut v: Vec<i64> = (0..ACCOUNT_SPACE as i64).collect();
    for line in tx {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 3 {
            continue;
        }
        let (Ok(a), Ok(b), Ok(n)) = (
            parts[0].parse::<i64>(),
            parts[1].parse::<i64>(),
            parts[2].parse::<i64>(),
        ) else {
            continue;
        };
        if a >= 0 && (a as usize) < v.len() && b >= 0 && (b as usize) < v.len() && a != b {
            v[a as usize] += n;
            v[b as usize] -= n;
        }
    }
    std::hint::black_box(v);
}
