// Background analysis jobs
pub mod queue;

pub use queue::JobQueue;
