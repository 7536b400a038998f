//! 128-bit opaque identifiers.
//!
//! All entities in the pipeline — actors, workers, tasks, and objects — are
//! addressed by 128-bit ids assigned elsewhere (job control, the caller, the
//! object store). This module only defines the value types: two 64-bit
//! halves, random generation, a nil sentinel, and a hex `Display`.
//!
//! Each id is a distinct type so that an `ActorId` can never be handed to an
//! API expecting a `TaskId`; the representation is identical across all four.

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
            Serialize, Deserialize,
        )]
        pub struct $name {
            /// First 64 bits.
            pub first: u64,
            /// Second 64 bits.
            pub second: u64,
        }

        impl $name {
            /// Create an id with explicit halves.
            pub const fn new(first: u64, second: u64) -> Self {
                Self { first, second }
            }

            /// Create a random id.
            pub fn random() -> Self {
                Self {
                    first: rand::random::<u64>(),
                    second: rand::random::<u64>(),
                }
            }

            /// The all-zero nil id.
            pub const fn nil() -> Self {
                Self { first: 0, second: 0 }
            }

            /// Check whether this is the nil id.
            pub const fn is_nil(&self) -> bool {
                self.first == 0 && self.second == 0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:016x}{:016x}", self.first, self.second)
            }
        }
    };
}

define_id!(
    /// Identifier of a named, stateful, addressable remote executor.
    ActorId
);

define_id!(
    /// Identifier of a worker process (one caller or callee instance).
    ///
    /// A reconstructed caller comes back under a fresh `WorkerId`; the
    /// receiver-side filter relies on this to detect reconstruction.
    WorkerId
);

define_id!(
    /// Identifier of a single task invocation.
    ///
    /// Also used as the caller id on the wire: an actor task's caller is
    /// itself a task.
    TaskId
);

define_id!(
    /// Identifier of an object in the local object store.
    ObjectId
);
