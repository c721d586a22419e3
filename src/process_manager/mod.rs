// External detection process management
pub mod command_builder;
pub mod invoker;

pub use command_builder::{build_analysis_command, AnalysisCommand};
pub use invoker::{run_detection, CapturedOutput, InvokeOptions};
