pub mod deps;
pub mod generation;
pub mod infra;
pub mod jobs;
pub mod pipeline;
pub mod queue;
pub mod reclassify;
pub mod scheduler;
pub mod source;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;
pub mod translation;

pub use deps::PipelineDeps;
pub use jobs::{RetryPolicy, Task};
pub use pipeline::Pipeline;
pub use queue::{LocalQueue, TaskRunner};
