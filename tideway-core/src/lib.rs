//! # tideway-core
//!
//! Core types shared by the tideway actor task pipeline.
//!
//! Every identifier, task description, and wire message that crosses a
//! process boundary lives here, so that the machinery crate
//! (`tideway-dispatch`) and any transport implementation agree on exactly
//! one vocabulary.
//!
//! ## Core Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`ActorId`], [`WorkerId`], [`TaskId`], [`ObjectId`] | 128-bit opaque identifiers |
//! | [`WorkerAddress`] | ip + port + worker id of a hosting worker |
//! | [`TaskSpec`], [`TaskArg`] | an immutable actor method invocation |
//! | [`PushTaskRequest`], [`PushTaskReply`] | the actor-task wire exchange |
//! | [`MessageCodec`], [`JsonCodec`] | pluggable wire serialization |
//!
//! Identifiers are plain value types: two random 64-bit halves, hex
//! `Display`, and serde derives. There is no registry behind them — the
//! systems that mint them (job control, callers, the object store) are
//! upstream of this crate.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

mod address;
mod codec;
mod ids;
mod task;
mod wire;

pub use address::WorkerAddress;
pub use codec::{CodecError, JsonCodec, MessageCodec};
pub use ids::{ActorId, ObjectId, TaskId, WorkerId};
pub use task::{TaskArg, TaskSpec};
pub use wire::{NO_ACKED_SEQUENCE, PushTaskReply, PushTaskRequest};
