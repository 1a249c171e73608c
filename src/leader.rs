//! Leader policy (spec §4.3, §4.4): a pure function of `(alg, view, N)`, no
//! persistent leader state. Grounded on
//! `internal/nodesvc/service.go::isLeader`/`leaderID`.

use crate::types::{Algorithm, NodeId, View};

/// Unique proposer for `view` under `alg`. Fixed to node 1 for three-phase;
/// `((view - 1) mod N) + 1` otherwise (spec §4.3.2).
pub fn leader(alg: Algorithm, view: View, n: u32) -> NodeId {
    match alg {
        Algorithm::ThreePhase => 1,
        _ => (((view.saturating_sub(1)) % n as u64) + 1) as NodeId,
    }
}

pub fn is_leader(alg: Algorithm, view: View, n: u32, self_id: NodeId) -> bool {
    leader(alg, view, n) == self_id
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn three_phase_leader_is_always_node_one() {
        for view in 1..10 {
            assert_eq!(leader(Algorithm::ThreePhase, view, 4), 1);
        }
    }

    #[test]
    fn single_vote_leader_rotates_p5() {
        let n = 4;
        assert_eq!(leader(Algorithm::Chained, 1, n), 1);
        assert_eq!(leader(Algorithm::Chained, 2, n), 2);
        assert_eq!(leader(Algorithm::Chained, 4, n), 4);
        assert_eq!(leader(Algorithm::Chained, 5, n), 1);
    }

    #[test]
    fn is_leader_matches_leader() {
        assert!(is_leader(Algorithm::Chained, 2, 4, 2));
        assert!(!is_leader(Algorithm::Chained, 2, 4, 3));
    }
}
