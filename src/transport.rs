//! Outbound transport: unicast/broadcast to peers, and the latency-sink
//! `start`/`end` notifications (spec §4.6, §6). Send failures are
//! swallowed — consensus liveness depends only on reaching quorum, not on
//! any single send succeeding (spec §4.6). Grounded on
//! `internal/nodesvc/service.go::sendTo`/`broadcast`/`callStart`/
//! `reportEnd`, moved from raw `net/http` + goroutines to `reqwest` +
//! `tokio::spawn`.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::engine::OutboundSink;
use crate::types::{Algorithm, ConsensusMessage, EndRequest, Height, NodeId, StartRequest, View};

/// HTTP-backed transport for one replica: knows every peer's address, the
/// active algorithm's URL path segment, and the latency sink's base URL.
pub struct HttpTransport {
    client: reqwest::Client,
    peer_addrs: HashMap<NodeId, String>,
    alg: Algorithm,
    n: u32,
    client_url: String,
}

impl HttpTransport {
    pub fn new(peer_addrs: HashMap<NodeId, String>, alg: Algorithm, n: u32, client_addr: &str) -> Self {
        HttpTransport {
            client: reqwest::Client::new(),
            peer_addrs,
            alg,
            n,
            client_url: format!("http://{client_addr}"),
        }
    }

    fn message_url(&self, to: NodeId) -> Option<String> {
        self.peer_addrs
            .get(&to)
            .map(|addr| format!("http://{addr}/{}/message", self.alg.path_segment()))
    }

    fn post(&self, url: String, body: impl serde::Serialize + Send + 'static) {
        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(err) = client.post(&url).json(&body).send().await {
                warn!(url, error = %err, "outbound send failed, dropping");
            }
        });
    }
}

fn now_unix_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the epoch")
        .as_nanos() as i64
}

impl OutboundSink for HttpTransport {
    fn unicast(&self, to: NodeId, msg: ConsensusMessage) {
        let Some(url) = self.message_url(to) else {
            warn!(to, "no known address for peer, dropping send");
            return;
        };
        self.post(url, msg);
    }

    fn broadcast(&self, msg: ConsensusMessage) {
        for id in 1..=self.n {
            self.unicast(id, msg.clone());
        }
    }

    fn report_start(&self, height: Height, view: View) {
        let req = StartRequest {
            height,
            start: now_unix_nanos(),
            view: Some(view),
        };
        self.post(format!("{}/start", self.client_url), req);
    }

    fn report_end(&self, height: Height, view: View, from: NodeId) {
        let req = EndRequest {
            height,
            end: Some(now_unix_nanos()),
            from,
            view: Some(view),
        };
        self.post(format!("{}/end", self.client_url), req);
    }
}
