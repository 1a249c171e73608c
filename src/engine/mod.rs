//! The protocol state machine (spec §4.3–§4.4). One shared frame
//! (`Replica::deliver`) dispatches to a per-family handler; both families
//! share proposal acceptance, vote acceptance, and a single idempotent
//! commit action (spec §4.3's common-frame description).
//!
//! Grounded on `internal/nodesvc/service.go::process`/`processPBFT`/
//! `processOneVote`, restated in the teacher crate's shape of a locked
//! `State` struct with methods (`tvl-labs-overlord/src/state/process.rs`),
//! minus the teacher's generic trait parameters: this system has one
//! concrete message type, not a pluggable one.

mod single_vote;
mod three_phase;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::digest;
use crate::error::ConsensusError;
use crate::leader;
use crate::state::HeightState;
use crate::types::{Algorithm, ConsensusMessage, Height, NodeId, Thresholds, View};
use crate::workload;

/// Outbound capabilities the engine consumes (spec §4.6). Implementations
/// must not block the caller — sends are dispatched to fire-and-forget
/// workers so the replica lock is never held across network I/O (spec §5).
pub trait OutboundSink: Send + Sync {
    fn unicast(&self, to: NodeId, msg: ConsensusMessage);
    fn broadcast(&self, msg: ConsensusMessage);
    fn report_start(&self, height: Height, view: View);
    fn report_end(&self, height: Height, view: View, from: NodeId);
}

/// An effect the handler wants performed once the replica lock is released.
#[derive(Debug)]
enum Action {
    Unicast(NodeId, ConsensusMessage),
    Broadcast(ConsensusMessage),
    ReportEnd(Height, View, NodeId),
    /// Emitted by `advance_height` when this replica becomes leader of the
    /// new view; causes `Replica` to generate and broadcast the next
    /// proposal asynchronously (spec §4.4).
    ScheduleProposal(Height, View),
}

/// Read-only context threaded through the per-family handlers: the
/// replica's fixed identity and the cluster's verification keys. Immutable
/// for the lifetime of the process (spec §3, Replica process state), so it
/// lives outside the mutex.
pub(crate) struct Ctx<'a> {
    pub self_id: NodeId,
    pub alg: Algorithm,
    pub thresholds: Thresholds,
    pub keys: &'a HashMap<NodeId, String>,
}

/// The mutable slice of replica state protected by the single per-replica
/// mutex (spec §5): `(height, view, state-map)`.
struct Locked {
    height: Height,
    view: View,
    heights: HashMap<Height, HeightState>,
}

impl Locked {
    /// Gets or lazily creates the `HeightState` for `height` (spec §3,
    /// Lifecycle).
    fn height_state(&mut self, height: Height) -> &mut HeightState {
        self.heights.entry(height).or_insert_with(HeightState::new)
    }

    /// Commits at `height`, advances `(height, view)`, and prunes state
    /// strictly older than the new `height - 1` (DESIGN.md Open Question
    /// 3). Returns the `ScheduleProposal` action if this replica is now
    /// leader of the new view.
    fn advance(&mut self, ctx: &Ctx, height: Height) -> Option<Action> {
        if height != self.height {
            // A late commit for an already-superseded height; nothing to
            // advance (can't happen via the common frame's height/view
            // gate, kept as a defensive no-op).
            return None;
        }
        self.height += 1;
        self.view = self.height;
        if self.height >= 2 {
            self.heights.retain(|h, _| *h + 1 >= self.height);
        }
        info!(height = self.height, view = self.view, "replica advanced to new height");
        if leader::is_leader(ctx.alg, self.view, ctx.thresholds.n, ctx.self_id) {
            Some(Action::ScheduleProposal(self.height, self.view))
        } else {
            None
        }
    }
}

/// A replica's full consensus engine: process state plus the mutex
/// guarding it (spec §5). Always used behind an `Arc` so outbound actions
/// that must themselves schedule further work (a new proposal after a
/// height advance) can hold a handle back to the engine.
pub struct Replica {
    self_id: NodeId,
    alg: Algorithm,
    thresholds: Thresholds,
    keys: HashMap<NodeId, String>,
    locked: Mutex<Locked>,
    outbound: Arc<dyn OutboundSink>,
}

impl Replica {
    pub fn new(
        self_id: NodeId,
        alg: Algorithm,
        thresholds: Thresholds,
        keys: HashMap<NodeId, String>,
        outbound: Arc<dyn OutboundSink>,
    ) -> Arc<Self> {
        Arc::new(Replica {
            self_id,
            alg,
            thresholds,
            keys,
            locked: Mutex::new(Locked {
                height: 1,
                view: 1,
                heights: HashMap::new(),
            }),
            outbound,
        })
    }

    pub fn self_id(&self) -> NodeId {
        self.self_id
    }

    pub fn alg(&self) -> Algorithm {
        self.alg
    }

    pub fn is_leader_of_view(&self, view: View) -> bool {
        leader::is_leader(self.alg, view, self.thresholds.n, self.self_id)
    }

    /// Current `(height, view)`, for diagnostics/tests only.
    pub fn position(&self) -> (Height, View) {
        let locked = self.locked.lock();
        (locked.height, locked.view)
    }

    fn ctx(&self) -> Ctx<'_> {
        Ctx {
            self_id: self.self_id,
            alg: self.alg,
            thresholds: self.thresholds,
            keys: &self.keys,
        }
    }

    /// Inbound entry point (spec §4.6 `deliver`). Implements the common
    /// frame (spec §4.3): height/view gate, dedup, per-variant dispatch.
    /// All of this executes under the replica lock; only the resulting
    /// `Action`s are dispatched after it is released.
    pub fn deliver(self: &Arc<Self>, msg: ConsensusMessage) {
        let actions = {
            let mut locked = self.locked.lock();
            self.deliver_locked(&mut locked, msg)
        };
        self.run(actions);
    }

    fn deliver_locked(&self, locked: &mut Locked, msg: ConsensusMessage) -> Vec<Action> {
        if msg.height != locked.height || msg.view != locked.view {
            let err = ConsensusError::HeightViewMismatch { height: msg.height, view: msg.view };
            debug!(
                error = %err,
                self_height = locked.height,
                self_view = locked.view,
                "dropping message outside current (height, view)"
            );
            return Vec::new();
        }

        let ctx = self.ctx();
        let hs = locked.height_state(msg.height);
        let fp = msg.fingerprint();
        if !hs.insert_if_new(fp) {
            let err = ConsensusError::Duplicate(msg.height);
            debug!(error = %err, from = msg.from, ty = %msg.ty, "dropping duplicate fingerprint");
            return Vec::new();
        }

        let height = msg.height;
        let from = msg.from;
        let result = if ctx.alg == Algorithm::ThreePhase {
            three_phase::handle(&ctx, locked.height_state(height), msg)
        } else {
            single_vote::handle(&ctx, locked.height_state(height), msg, ctx.alg.vote_tags())
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                warn_rejected(&err, height, from);
                HandlerOutcome::Nothing
            }
        };

        match outcome {
            HandlerOutcome::Nothing => Vec::new(),
            HandlerOutcome::Actions(actions) => actions,
            HandlerOutcome::Commit { actions, height } => {
                let mut all = actions;
                if let Some(schedule) = locked.advance(&ctx, height) {
                    all.push(schedule);
                }
                all
            }
        }
    }

    /// Runs the proposal generator for `(height, view)` and returns the
    /// resulting broadcast + start-notification actions. Grounded on
    /// `nodesvc.go::proposeCurrentHeight`; the leader's own proposal is not
    /// cached locally, it loops back through `deliver` like every other
    /// replica's copy (spec §4.6, fan-out to `1..N` includes self).
    fn build_proposal(&self, height: Height, view: View) -> (ConsensusMessage, Action) {
        let tx = workload::generate_tx(height);
        let d = digest::digest(view, height, &tx);
        let ty = if self.alg == Algorithm::ThreePhase {
            "PrePrepare"
        } else {
            self.alg.vote_tags().proposal
        };
        let msg = ConsensusMessage::new(ty, view, height, self.self_id, d).with_tx(tx);
        (msg.clone(), Action::Broadcast(msg))
    }

    fn propose_now(self: &Arc<Self>, height: Height, view: View) {
        let (_, broadcast) = self.build_proposal(height, view);
        self.outbound.report_start(height, view);
        self.run(vec![broadcast]);
    }

    /// Called once after boot, by the process that determined it is leader
    /// of view 1, after the fixed warm-up delay (spec §4.7).
    pub fn kickoff_if_leader(self: &Arc<Self>) {
        let (height, view) = self.position();
        if self.is_leader_of_view(view) {
            info!(height, view, "leader kickoff: issuing first proposal");
            self.propose_now(height, view);
        }
    }

    fn run(self: &Arc<Self>, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Unicast(to, msg) => self.outbound.unicast(to, msg),
                Action::Broadcast(msg) => self.outbound.broadcast(msg),
                Action::ReportEnd(height, view, from) => self.outbound.report_end(height, view, from),
                Action::ScheduleProposal(height, view) => {
                    let replica = Arc::clone(self);
                    tokio::spawn(async move {
                        replica.propose_now(height, view);
                    });
                }
            }
        }
    }
}

/// What a per-variant handler wants done after mutating `HeightState`.
pub(crate) enum HandlerOutcome {
    Nothing,
    /// Plain effects with no height advance (e.g. broadcasting a `Prepare`).
    Actions(Vec<Action>),
    /// This handler just set `done`; `height` is advanced and, if this
    /// replica is now leader of the new view, a proposal is scheduled.
    Commit { actions: Vec<Action>, height: Height },
}

pub(crate) fn warn_rejected(err: &ConsensusError, height: Height, from: NodeId) {
    warn!(height, from, error = %err, "rejected consensus message");
}
