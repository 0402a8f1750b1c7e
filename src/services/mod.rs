//! Service layer shared by the pipeline stages
//!
//! Each service owns one concern (finding files, decoding and encoding, pixel
//! layouts, progress) so the pipeline itself only sequences them.

pub mod format;
pub mod io;
pub mod locator;
pub mod progress;

pub use format::OutputFormatHandler;
pub use io::ImageIOService;
pub use locator::{ImageLocator, CACHE_DIR_ENV};
pub use progress::{
    ConsoleProgressReporter, NoOpProgressReporter, PipelineStage, ProgressReporter,
    ProgressTracker, ProgressUpdate,
};
