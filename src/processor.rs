//! Task processing: queue polling, input staging, the per-task state machine,
//! and the sequential intake loop that ties them together.

pub mod backoff;
pub mod fetcher;
pub mod intake;
pub mod pipeline;
pub mod queue;
