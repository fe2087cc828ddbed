//! Playlist entry files for `add-playlist`.
//!
//! A JSON array of objects:
//!
//! ```json
//! [{ "video": "https://youtu.be/abc", "title": "Intro", "thumbnail": "https://…", "duration": "PT4M2S" }]
//! ```
//!
//! `video` may be a link or a bare id; `duration` may be seconds or ISO-8601.

use serde::Deserialize;
use watch_core::link::{parse_iso8601_duration, parse_video_id};
use watch_core::model::VideoDraft;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DurationField {
    Seconds(i64),
    Iso(String),
}

impl Default for DurationField {
    fn default() -> Self {
        Self::Seconds(0)
    }
}

#[derive(Debug, Deserialize)]
struct PlaylistEntry {
    video: String,
    title: String,
    thumbnail: String,
    #[serde(default)]
    duration: DurationField,
}

impl PlaylistEntry {
    fn into_draft(self) -> VideoDraft {
        let duration_secs = match self.duration {
            DurationField::Seconds(secs) => secs,
            DurationField::Iso(raw) => {
                i64::try_from(parse_iso8601_duration(&raw)).unwrap_or(i64::MAX)
            }
        };
        VideoDraft::new(video_ref(&self.video), self.title, self.thumbnail, duration_secs)
    }
}

/// A link is reduced to its video id; anything else is taken as an id.
pub fn video_ref(raw: &str) -> String {
    parse_video_id(raw).unwrap_or_else(|| raw.trim().to_owned())
}

/// Parse playlist entries into drafts; validation happens in the library.
pub fn parse_entries(json: &str) -> Result<Vec<VideoDraft>, serde_json::Error> {
    let entries: Vec<PlaylistEntry> = serde_json::from_str(json)?;
    Ok(entries.into_iter().map(PlaylistEntry::into_draft).collect())
}
