#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod progress_tracker;
pub mod streak_engine;
pub mod video_library;

pub use watch_core::Clock;

pub use app_services::AppServices;
pub use error::{AppServicesError, ProgressServiceError, StreakServiceError, VideoServiceError};
pub use progress_tracker::{ProgressTracker, VideoWithProgress};
pub use streak_engine::StreakEngine;
pub use video_library::{PlaylistImport, VideoLibrary};
