use thiserror::Error;

use crate::model::{ParseIdError, ProgressError, StreakError, VideoError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Streak(#[from] StreakError),
    #[error(transparent)]
    Video(#[from] VideoError),
    #[error(transparent)]
    Id(#[from] ParseIdError),
}
