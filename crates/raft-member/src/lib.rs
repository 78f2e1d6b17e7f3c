//! # raft-member
//!
//! why: turn the i/o-free consensus core into a running cluster member
//! relations: drives raft-core's RaftNode, persists through raft-storage, talks to peers via a Transport
//! what: RaftMember, Application/Transport/TimerService seams, ChannelTransport, TimerTable

pub mod application;
pub mod error;
pub mod member;
pub mod timer;
pub mod transport;

pub use application::Application;
pub use error::{MemberError, Result};
pub use member::{Completion, MemberSetup, RaftMember};
pub use timer::{TimerService, TimerTable};
pub use transport::{ChannelTransport, Envelope, Transport};
