mod job_repo;

pub use job_repo::{job_key, JobRepo, QUEUE_KEY};
