//! Asynchronous extraction jobs and their in-memory registry.

pub mod job;
pub mod manager;
pub mod store;

pub use job::{Job, JobStatus};
pub use manager::{DeleteReport, JobManager, SubmitResponse};
pub use store::JobStore;
