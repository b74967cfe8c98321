//! Reference model for model-based testing.
//!
//! A deliberately naive implementation of room membership and fan-out. It
//! keeps everything in plain vectors and sets, so it is easy to convince
//! yourself it is correct. The real relay must agree with it on every
//! operation result and on the final observable state.

mod operation;
mod relay;

pub use operation::{
    ClientId, ModelThreadId, NUM_THREADS, NUM_USERS, Operation, OperationError, OperationResult,
    model_thread_id, model_user_id, thread_owner,
};
pub use relay::{ModelRelay, ObservableState};
