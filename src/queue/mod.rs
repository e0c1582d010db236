//! Continuation job queue and retry backoff

pub mod backoff;
pub mod job;

pub use backoff::RetryPolicy;
pub use job::{ContinuationJob, InMemoryJobQueue, JobQueue, JobStatus};
