//! Deterministic simulation harness for threadrelay testing.
//!
//! Seeded implementations of the `Environment` and `Outbound` seams so relay
//! behavior can be replayed exactly, plus a synchronous [`SimRelay`] that
//! drives the real [`RelayDriver`](threadrelay_server::RelayDriver) without
//! sockets.
//!
//! # Model-Based Testing
//!
//! The `model` module provides a reference implementation of room membership
//! and fan-out. Operations are applied to both the model and [`SimRelay`], and
//! their observable states are compared.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod model;
pub mod recording;
pub mod sim_env;
pub mod sim_relay;

pub use model::{
    ClientId, ModelRelay, ModelThreadId, ObservableState, Operation, OperationError,
    OperationResult, model_thread_id, model_user_id,
};
pub use recording::{RecordingOutbound, RecordingPublisher};
pub use sim_env::{SimEnv, SimInstant};
pub use sim_relay::SimRelay;
