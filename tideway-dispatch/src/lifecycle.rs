//! Actor lifecycle tracking.
//!
//! The coordination service reports connects and disconnects with a
//! generation number (the count of observed restarts), and nothing
//! guarantees they arrive in order. The lifecycle state machine filters the
//! stragglers:
//!
//! ```text
//! PENDING ── connect(g₀) ─────────────────→ RUNNING(g₀)
//! RUNNING(g) ── disconnect(g'>g, restart) ─→ RESTARTING(g')
//! RESTARTING(g) ── connect(g'>g) ─────────→ RUNNING(g')
//! any live state ── disconnect(dead) ─────→ DEAD (terminal)
//! ```
//!
//! A non-death transition is accepted only with a strictly greater
//! generation than the last accepted one; in particular, reconnecting at
//! the current generation is a no-op even if the address changed, and a
//! redundant refresh of the same address must not disturb in-flight
//! tracking. Death is accepted from any live state regardless of
//! generation: the coordination service never revives a dead actor, so a
//! death notice — however late, and whatever generation it carries — still
//! reports the actor's one terminal fact. Only connects and restarts are
//! transient enough for a generation tag to make them stale.

use serde::{Deserialize, Serialize};
use tracing::debug;

use tideway_core::WorkerAddress;

/// Number of observed restarts of an actor; filters stale lifecycle events.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Generation(pub u64);

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gen({})", self.0)
    }
}

/// Why an actor died. Propagated to the bookkeeping layer with every
/// failure caused by the death.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeathCause {
    /// Every reference to the actor went out of scope.
    OutOfScope,
    /// The actor was explicitly killed.
    Killed {
        /// Operator- or application-supplied reason.
        reason: String,
    },
    /// The actor's runtime environment failed to set up.
    RuntimeEnvFailed {
        /// Setup failure detail.
        message: String,
    },
    /// The node hosting the actor went down.
    NodeDied {
        /// Identifier of the lost node.
        node: String,
    },
}

impl std::fmt::Display for DeathCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeathCause::OutOfScope => write!(f, "actor handle out of scope"),
            DeathCause::Killed { reason } => write!(f, "actor killed: {reason}"),
            DeathCause::RuntimeEnvFailed { message } => {
                write!(f, "runtime env setup failed: {message}")
            }
            DeathCause::NodeDied { node } => write!(f, "node died: {node}"),
        }
    }
}

/// Lifecycle states of an actor, as seen by the submitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorLifecycleState {
    /// Created locally; no address known yet.
    Pending,
    /// Reachable at a known address.
    Running,
    /// Between a restart disconnect and the next connect.
    Restarting,
    /// Terminal.
    Dead,
}

impl std::fmt::Display for ActorLifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActorLifecycleState::Pending => "pending",
            ActorLifecycleState::Running => "running",
            ActorLifecycleState::Restarting => "restarting",
            ActorLifecycleState::Dead => "dead",
        };
        f.write_str(s)
    }
}

/// Per-actor lifecycle record: state, generation, address, death cause.
///
/// This type owns only the *acceptance* rules; the submitter applies the
/// effects of an accepted transition (queue flushes and fail sweeps).
#[derive(Debug)]
pub struct ActorLifecycle {
    state: ActorLifecycleState,
    generation: Option<Generation>,
    address: Option<WorkerAddress>,
    death_cause: Option<DeathCause>,
}

impl Default for ActorLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl ActorLifecycle {
    /// A fresh record in PENDING with no generation observed.
    pub fn new() -> Self {
        Self {
            state: ActorLifecycleState::Pending,
            generation: None,
            address: None,
            death_cause: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> ActorLifecycleState {
        self.state
    }

    /// Generation of the last accepted transition.
    pub fn generation(&self) -> Option<Generation> {
        self.generation
    }

    /// Current address, if RUNNING.
    pub fn address(&self) -> Option<&WorkerAddress> {
        self.address.as_ref()
    }

    /// The stored death cause, once DEAD.
    pub fn death_cause(&self) -> Option<&DeathCause> {
        self.death_cause.as_ref()
    }

    /// Whether the actor is RUNNING.
    pub fn is_running(&self) -> bool {
        self.state == ActorLifecycleState::Running
    }

    /// Whether the actor is DEAD.
    pub fn is_dead(&self) -> bool {
        self.state == ActorLifecycleState::Dead
    }

    fn accepts(&self, generation: Generation) -> bool {
        match self.generation {
            None => true,
            Some(current) => generation > current,
        }
    }

    /// Apply a connect. Returns whether the transition was accepted; a
    /// rejected connect (dead, stale, or redundant refresh) changes
    /// nothing.
    pub fn try_connect(&mut self, address: WorkerAddress, generation: Generation) -> bool {
        if self.is_dead() || !self.accepts(generation) {
            debug!(
                state = %self.state,
                generation = %generation,
                "ignoring connect"
            );
            return false;
        }
        self.state = ActorLifecycleState::Running;
        self.generation = Some(generation);
        self.address = Some(address);
        true
    }

    /// Apply a restart disconnect. Returns whether it was accepted.
    pub fn try_restart(&mut self, generation: Generation) -> bool {
        if self.is_dead() || !self.accepts(generation) {
            debug!(
                state = %self.state,
                generation = %generation,
                "ignoring restart disconnect"
            );
            return false;
        }
        self.state = ActorLifecycleState::Restarting;
        self.generation = Some(generation);
        self.address = None;
        true
    }

    /// Apply a death. Accepted from any live state; the generation only
    /// ratchets the record forward, it never gates death. A notice carrying
    /// a generation the record has moved past is a delayed delivery of the
    /// terminal fact, not a stale transient.
    pub fn mark_dead(&mut self, generation: Generation, cause: DeathCause) -> bool {
        if self.is_dead() {
            return false;
        }
        self.state = ActorLifecycleState::Dead;
        self.generation = Some(match self.generation {
            Some(current) => current.max(generation),
            None => generation,
        });
        self.address = None;
        self.death_cause = Some(cause);
        true
    }
}
