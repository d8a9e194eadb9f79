pub mod gateway;
pub mod jobs;
