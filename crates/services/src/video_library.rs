use std::sync::Arc;

use serde::Serialize;
use storage::repository::{StorageError, VideoRepository};
use watch_core::model::{
    PlaylistId, PlaylistRef, PlaylistSummary, UserId, Video, VideoDraft, VideoError, VideoId,
    summarize_playlists,
};

use crate::Clock;
use crate::error::{VideoServiceError, log_storage_error};

/// Result of importing a playlist into the library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistImport {
    pub playlist_id: PlaylistId,
    pub playlist_name: String,
    pub videos_added: u32,
    /// Only the entries that were not already in the library.
    pub videos: Vec<Video>,
}

/// Manages the user's library of tracked videos.
#[derive(Clone)]
pub struct VideoLibrary {
    clock: Clock,
    videos: Arc<dyn VideoRepository>,
}

impl VideoLibrary {
    #[must_use]
    pub fn new(clock: Clock, videos: Arc<dyn VideoRepository>) -> Self {
        Self { clock, videos }
    }

    /// Add a single video outside of any playlist.
    ///
    /// # Errors
    ///
    /// Returns `VideoServiceError::Video` for invalid metadata or if the
    /// video is already in the library.
    /// Returns `VideoServiceError::Storage` if persistence fails.
    pub async fn add_video(
        &self,
        user_id: UserId,
        draft: VideoDraft,
    ) -> Result<Video, VideoServiceError> {
        let video = draft.validate(user_id, None, 0, self.clock.now())?;
        match self.videos.insert_video(&video).await {
            Ok(()) => {
                tracing::debug!(
                    user_id = user_id.value(),
                    video_id = video.video_id().as_str(),
                    "video added"
                );
                Ok(video)
            }
            Err(StorageError::Conflict) => {
                Err(VideoError::AlreadyAdded(video.video_id().clone()).into())
            }
            Err(err) => {
                log_storage_error("insert_video")(&err);
                Err(err.into())
            }
        }
    }

    /// Import a playlist. Videos keep their playlist position as `order_index`;
    /// those already in the library are skipped.
    ///
    /// Every draft is validated before anything is written.
    ///
    /// # Errors
    ///
    /// Returns `VideoServiceError::Video` if the playlist or any draft is invalid.
    /// Returns `VideoServiceError::Storage` if persistence fails.
    pub async fn add_playlist(
        &self,
        user_id: UserId,
        playlist_id: &str,
        playlist_name: &str,
        drafts: Vec<VideoDraft>,
    ) -> Result<PlaylistImport, VideoServiceError> {
        let playlist =
            PlaylistRef::new(PlaylistId::new(playlist_id).map_err(VideoError::from)?, playlist_name)?;
        let now = self.clock.now();

        let candidates = drafts
            .into_iter()
            .enumerate()
            .map(|(pos, draft)| {
                let order_index = u32::try_from(pos).unwrap_or(u32::MAX);
                draft.validate(user_id, Some(playlist.clone()), order_index, now)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut added = Vec::with_capacity(candidates.len());
        for video in candidates {
            match self.videos.insert_video(&video).await {
                Ok(()) => added.push(video),
                Err(StorageError::Conflict) => {
                    tracing::debug!(
                        user_id = user_id.value(),
                        video_id = video.video_id().as_str(),
                        "skipping video already in library"
                    );
                }
                Err(err) => {
                    log_storage_error("insert_video")(&err);
                    return Err(err.into());
                }
            }
        }

        tracing::info!(
            user_id = user_id.value(),
            playlist_id = playlist.id.as_str(),
            videos_added = added.len(),
            "playlist imported"
        );
        Ok(PlaylistImport {
            playlist_id: playlist.id,
            playlist_name: playlist.name,
            videos_added: u32::try_from(added.len()).unwrap_or(u32::MAX),
            videos: added,
        })
    }

    /// Library entries, optionally restricted to one playlist.
    ///
    /// # Errors
    ///
    /// Returns `VideoServiceError::Storage` if repository access fails.
    pub async fn list_videos(
        &self,
        user_id: UserId,
        playlist_id: Option<&PlaylistId>,
    ) -> Result<Vec<Video>, VideoServiceError> {
        Ok(self
            .videos
            .list_videos(user_id, playlist_id)
            .await
            .inspect_err(log_storage_error("list_videos"))?)
    }

    /// # Errors
    ///
    /// Returns `VideoServiceError::Storage` if repository access fails.
    pub async fn list_playlists(
        &self,
        user_id: UserId,
    ) -> Result<Vec<PlaylistSummary>, VideoServiceError> {
        let videos = self.list_videos(user_id, None).await?;
        Ok(summarize_playlists(&videos))
    }

    /// # Errors
    ///
    /// Returns `VideoServiceError::Storage` with `StorageError::NotFound` if
    /// the video is not in the library.
    pub async fn delete_video(
        &self,
        user_id: UserId,
        video_id: &VideoId,
    ) -> Result<(), VideoServiceError> {
        self.videos.delete_video(user_id, video_id).await?;
        tracing::debug!(
            user_id = user_id.value(),
            video_id = video_id.as_str(),
            "video deleted"
        );
        Ok(())
    }

    /// Set each listed video's `order_index` to its position in `video_ids`.
    ///
    /// Ids that are not in the library are ignored. Returns how many entries
    /// were updated.
    ///
    /// # Errors
    ///
    /// Returns `VideoServiceError::Storage` if repository access fails.
    pub async fn reorder_videos(
        &self,
        user_id: UserId,
        video_ids: &[VideoId],
    ) -> Result<u32, VideoServiceError> {
        let mut updated = 0_u32;
        for (pos, video_id) in video_ids.iter().enumerate() {
            let order_index = u32::try_from(pos).unwrap_or(u32::MAX);
            if self
                .videos
                .set_order_index(user_id, video_id, order_index)
                .await
                .inspect_err(log_storage_error("set_order_index"))?
            {
                updated += 1;
            }
        }
        tracing::debug!(user_id = user_id.value(), updated, "videos reordered");
        Ok(updated)
    }
}
