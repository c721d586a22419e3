// Data models (structs)
pub mod analysis;
pub mod analysis_job;
pub mod settings;

pub use analysis::*;
pub use analysis_job::*;
pub use settings::*;
