use std::io::Read;

use serde::Serialize;
use services::{AppServices, Clock};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use watch_core::link::parse_playlist_id;
use watch_core::model::{PlaylistId, ProgressDraft, UserId, VideoDraft, VideoId};

mod args;
mod import;

use args::{Args, ArgsError, Command, print_usage};
use import::{parse_entries, video_ref};

fn video_id(raw: &str) -> Result<VideoId, watch_core::Error> {
    Ok(VideoId::new(video_ref(raw))?)
}

fn playlist_id(raw: &str) -> Result<PlaylistId, watch_core::Error> {
    let id = parse_playlist_id(raw).unwrap_or_else(|| raw.trim().to_owned());
    Ok(PlaylistId::new(id)?)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_entries(
    file: Option<&std::path::Path>,
) -> Result<Vec<VideoDraft>, Box<dyn std::error::Error>> {
    let json = match file {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    Ok(parse_entries(&json)?)
}

async fn execute(
    services: &AppServices,
    user: UserId,
    command: Command,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Help => print_usage(),
        Command::Progress {
            video,
            watched,
            total,
        } => {
            let draft = ProgressDraft {
                watched_seconds: watched,
                total_duration: total,
            };
            let record = services
                .progress_tracker()
                .report_progress(user, &video_id(&video)?, draft)
                .await?;
            print_json(&record)?;
        }
        Command::Resume { video } => {
            let point = services
                .progress_tracker()
                .resume_point(user, &video_id(&video)?)
                .await?;
            print_json(&point)?;
        }
        Command::Stats => {
            let stats = services.progress_tracker().aggregate_stats(user).await?;
            print_json(&serde_json::json!({
                "stats": stats,
                "formattedWatchTime": stats.formatted_watch_time(),
            }))?;
        }
        Command::VideosProgress => {
            let rows = services.progress_tracker().videos_with_progress(user).await?;
            print_json(&rows)?;
        }
        Command::Session { seconds } => {
            let record = services
                .streak_engine()
                .record_watch_time(user, seconds)
                .await?;
            print_json(&record)?;
        }
        Command::Streak => {
            let stats = services.streak_engine().streak_stats(user).await?;
            print_json(&stats)?;
        }
        Command::Weekly { day } => {
            let engine = services.streak_engine();
            let reference = day.unwrap_or_else(|| engine.today());
            let week = engine.weekly_activity(user, reference).await?;
            print_json(&week)?;
        }
        Command::AddVideo {
            video,
            title,
            thumbnail,
            duration_secs,
        } => {
            let draft = VideoDraft::new(video_ref(&video), title, thumbnail, duration_secs);
            let added = services.video_library().add_video(user, draft).await?;
            print_json(&added)?;
        }
        Command::AddPlaylist {
            playlist,
            name,
            file,
        } => {
            let drafts = read_entries(file.as_deref())?;
            let playlist = playlist_id(&playlist)?;
            let import = services
                .video_library()
                .add_playlist(user, playlist.as_str(), &name, drafts)
                .await?;
            print_json(&import)?;
        }
        Command::Videos { playlist } => {
            let playlist = playlist.as_deref().map(playlist_id).transpose()?;
            let videos = services
                .video_library()
                .list_videos(user, playlist.as_ref())
                .await?;
            print_json(&videos)?;
        }
        Command::Playlists => {
            let playlists = services.video_library().list_playlists(user).await?;
            print_json(&playlists)?;
        }
        Command::Delete { video } => {
            let id = video_id(&video)?;
            services.video_library().delete_video(user, &id).await?;
            print_json(&serde_json::json!({ "deleted": id }))?;
        }
        Command::Reorder { videos } => {
            let ids = videos
                .iter()
                .map(String::as_str)
                .map(video_id)
                .collect::<Result<Vec<_>, _>>()?;
            let updated = services.video_library().reorder_videos(user, &ids).await?;
            print_json(&serde_json::json!({ "updated": updated }))?;
        }
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let parsed = Args::parse(std::env::args().skip(1), |key| std::env::var(key).ok()).map_err(
        |e| {
            eprintln!("{e}");
            print_usage();
            e
        },
    )?;

    if matches!(parsed.command, Command::Help) {
        print_usage();
        return Ok(());
    }

    // Open + migrate SQLite at startup.
    prepare_sqlite_file(&parsed.db_url)?;
    let services = AppServices::new_sqlite(&parsed.db_url, Clock::default_clock(), parsed.days)
        .await?;
    tracing::debug!(db_url = %parsed.db_url, user_id = parsed.user_id.value(), "services ready");

    execute(&services, parsed.user_id, parsed.command).await
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" || db_url.starts_with("sqlite:file:") {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "watch=info,services=info,storage=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
