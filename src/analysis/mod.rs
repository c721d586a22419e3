// Hawk-Eye analysis flow: upload -> command -> invoke -> parse -> organize -> respond
pub mod organizer;
pub mod output_parser;
pub mod pipeline;
pub mod response;
pub mod sweeper;
pub mod upload;

pub use pipeline::{is_valid_analysis_id, new_analysis_id, ActiveAnalyses, HawkEyePipeline, RunHooks};
pub use upload::{receive_video, store_upload, ReceivedVideo, StoredUpload, UploadPolicy};
