//! # Execution
//!
//! Client side of the skill relay: dispatches each step of a plan as a task,
//! waits for the worker's verdict and applies the retry policy until the run
//! reaches `SUCCESS` or `ABORT`.

mod dispatcher;
mod executor;
pub mod machine;
mod policy;
mod state;
mod watcher;

pub use dispatcher::TaskDispatcher;
pub use executor::{DispatchRecord, PlanExecutor, RunReport};
pub use machine::{
    abort_node, after_send, after_wait, route, route_from, send_step, success_node,
    update_state, wait_step,
};
pub use policy::{ResultRouting, RetryPolicy};
pub use state::{ExecutionState, ExecutorNode, RunOutcome, StepVerdict};
pub use watcher::{ResultVerdict, ResultWatcher};
