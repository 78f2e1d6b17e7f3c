//! # transport
//!
//! why: the member must talk to peers without knowing how messages travel
//! relations: RaftMember hands every Effect::Send to a Transport
//! what: Transport trait, Envelope, ChannelTransport (crossbeam outbox)

use crossbeam_channel::Sender;
use raft_core::{MemberId, RaftMessage};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Delivers messages to peers; delivery may be delayed, reordered or dropped
pub trait Transport {
    fn send(&mut self, to: MemberId, message: RaftMessage);
}

/// A message in flight between two members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub from: MemberId,
    pub to: MemberId,
    pub message: RaftMessage,
}

/// Puts every outgoing message on one channel, for a router to deliver
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    from: MemberId,
    outbox: Sender<Envelope>,
}

impl ChannelTransport {
    pub fn new(from: MemberId, outbox: Sender<Envelope>) -> Self {
        Self { from, outbox }
    }
}

impl Transport for ChannelTransport {
    fn send(&mut self, to: MemberId, message: RaftMessage) {
        let envelope = Envelope {
            from: self.from,
            to,
            message,
        };
        if self.outbox.send(envelope).is_err() {
            debug!(member = self.from, to, "outbox closed, dropping message");
        }
    }
}
