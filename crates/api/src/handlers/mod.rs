pub mod jobs;
pub mod patch;
