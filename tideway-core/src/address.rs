//! Worker addressing.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::ids::WorkerId;

/// Address of a worker process hosting an actor.
///
/// Two addresses are the same endpoint only when the full
/// (ip, port, worker id) triple matches: a restarted worker on the same
/// ip and port has a fresh [`WorkerId`] and therefore a distinct address.
/// The submitter's client pool and the reconnect no-op rule both key on
/// this triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerAddress {
    /// IP address (IPv4 or IPv6).
    pub ip: IpAddr,
    /// Port number.
    pub port: u16,
    /// Identifier of the worker process listening there.
    pub worker_id: WorkerId,
}

impl WorkerAddress {
    /// Create a new worker address.
    pub fn new(ip: IpAddr, port: u16, worker_id: WorkerId) -> Self {
        Self {
            ip,
            port,
            worker_id,
        }
    }
}

impl std::fmt::Display for WorkerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.ip {
            IpAddr::V4(ip) => write!(f, "{}:{}/{}", ip, self.port, self.worker_id),
            IpAddr::V6(ip) => write!(f, "[{}]:{}/{}", ip, self.port, self.worker_id),
        }
    }
}
