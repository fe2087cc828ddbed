use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

use crate::model::ids::{ParseIdError, PlaylistId, UserId, VideoId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum VideoError {
    #[error("video title cannot be empty")]
    EmptyTitle,

    #[error("thumbnail URL cannot be empty")]
    EmptyThumbnail,

    #[error("playlist name cannot be empty")]
    EmptyPlaylistName,

    #[error("duration must be >= 0, got {0}")]
    NegativeDuration(i64),

    #[error(transparent)]
    InvalidId(#[from] ParseIdError),

    #[error("video {0} is already in the library")]
    AlreadyAdded(VideoId),
}

//
// ─── DRAFTS ────────────────────────────────────────────────────────────────────
//

/// Video metadata as supplied by the caller (typically fetched elsewhere).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoDraft {
    pub video_id: String,
    pub title: String,
    pub thumbnail: String,
    pub duration_secs: i64,
}

impl VideoDraft {
    #[must_use]
    pub fn new(
        video_id: impl Into<String>,
        title: impl Into<String>,
        thumbnail: impl Into<String>,
        duration_secs: i64,
    ) -> Self {
        Self {
            video_id: video_id.into(),
            title: title.into(),
            thumbnail: thumbnail.into(),
            duration_secs,
        }
    }

    /// Validate into a library entry owned by `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `VideoError` if the id, title or thumbnail is blank, or the
    /// duration is negative.
    pub fn validate(
        self,
        user_id: UserId,
        playlist: Option<PlaylistRef>,
        order_index: u32,
        now: DateTime<Utc>,
    ) -> Result<Video, VideoError> {
        let video_id = VideoId::new(self.video_id)?;
        let title = self.title.trim();
        if title.is_empty() {
            return Err(VideoError::EmptyTitle);
        }
        let thumbnail = self.thumbnail.trim();
        if thumbnail.is_empty() {
            return Err(VideoError::EmptyThumbnail);
        }
        let duration_secs = u64::try_from(self.duration_secs)
            .map_err(|_| VideoError::NegativeDuration(self.duration_secs))?;

        Ok(Video {
            user_id,
            video_id,
            title: title.to_owned(),
            thumbnail: thumbnail.to_owned(),
            duration_secs,
            playlist,
            order_index,
            added_at: now,
        })
    }
}

/// Playlist a library entry was imported from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistRef {
    pub id: PlaylistId,
    pub name: String,
}

impl PlaylistRef {
    /// # Errors
    ///
    /// Returns `VideoError::EmptyPlaylistName` if the name is blank.
    pub fn new(id: PlaylistId, name: impl Into<String>) -> Result<Self, VideoError> {
        let name = name.into();
        let name = name.trim();
        if name.is_empty() {
            return Err(VideoError::EmptyPlaylistName);
        }
        Ok(Self {
            id,
            name: name.to_owned(),
        })
    }
}

//
// ─── VIDEO ─────────────────────────────────────────────────────────────────────
//

/// One entry of a user's video library. Unique by `(user_id, video_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    user_id: UserId,
    video_id: VideoId,
    title: String,
    thumbnail: String,
    duration_secs: u64,
    playlist: Option<PlaylistRef>,
    order_index: u32,
    added_at: DateTime<Utc>,
}

impl Video {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn from_persisted(
        user_id: UserId,
        video_id: VideoId,
        title: String,
        thumbnail: String,
        duration_secs: u64,
        playlist: Option<PlaylistRef>,
        order_index: u32,
        added_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            video_id,
            title,
            thumbnail,
            duration_secs,
            playlist,
            order_index,
            added_at,
        }
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn video_id(&self) -> &VideoId {
        &self.video_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn thumbnail(&self) -> &str {
        &self.thumbnail
    }

    #[must_use]
    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    #[must_use]
    pub fn playlist(&self) -> Option<&PlaylistRef> {
        self.playlist.as_ref()
    }

    #[must_use]
    pub fn order_index(&self) -> u32 {
        self.order_index
    }

    #[must_use]
    pub fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }

    pub fn set_order_index(&mut self, order_index: u32) {
        self.order_index = order_index;
    }
}

/// Library listing order: `order_index` ascending, newest first within ties.
pub fn sort_for_listing(videos: &mut [Video]) {
    videos.sort_by(|a, b| {
        a.order_index
            .cmp(&b.order_index)
            .then_with(|| b.added_at.cmp(&a.added_at))
    });
}

//
// ─── PLAYLISTS ─────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistSummary {
    pub playlist_id: PlaylistId,
    pub playlist_name: String,
    pub video_count: u32,
    pub thumbnail: String,
    /// Earliest `added_at` among the playlist's videos.
    pub added_at: DateTime<Utc>,
}

/// Group library entries by playlist, most recently added playlist first.
///
/// Name and thumbnail come from the first video of each playlist in `videos`
/// order. Entries without a playlist are skipped.
#[must_use]
pub fn summarize_playlists(videos: &[Video]) -> Vec<PlaylistSummary> {
    let mut index: HashMap<&PlaylistId, usize> = HashMap::new();
    let mut out: Vec<PlaylistSummary> = Vec::new();

    for video in videos {
        let Some(playlist) = video.playlist.as_ref() else {
            continue;
        };
        if let Some(&pos) = index.get(&playlist.id) {
            let summary = &mut out[pos];
            summary.video_count = summary.video_count.saturating_add(1);
            summary.added_at = summary.added_at.min(video.added_at);
            continue;
        }
        index.insert(&playlist.id, out.len());
        out.push(PlaylistSummary {
            playlist_id: playlist.id.clone(),
            playlist_name: playlist.name.clone(),
            video_count: 1,
            thumbnail: video.thumbnail.clone(),
            added_at: video.added_at,
        });
    }

    out.sort_by(|a, b| b.added_at.cmp(&a.added_at));
    out
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
