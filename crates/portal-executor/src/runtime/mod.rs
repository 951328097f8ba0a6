pub mod engine;
pub mod job_executor;

mod bindings;
mod conversions;


pub use bindings::SCRIPT_LOG_TARGET;
pub use engine::{Engine, CYCLIC_KIND};
pub use job_executor::JobQueue;
