use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDate;
use watch_core::link::parse_iso8601_duration;
use watch_core::model::UserId;
use watch_core::time::DayBoundary;

pub const DEFAULT_DB_URL: &str = "sqlite://watch.sqlite3";

#[derive(Debug, PartialEq, Eq)]
pub enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    MissingCommand,
    UnknownCommand(String),
    MissingArgument { command: &'static str, what: &'static str },
    UnexpectedArgument(String),
    InvalidNumber { what: &'static str, raw: String },
    InvalidDuration { raw: String },
    InvalidDbUrl { raw: String },
    InvalidUser { raw: String },
    InvalidUtcOffset { raw: String },
    InvalidDay { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::MissingCommand => write!(f, "no command given"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown command: {cmd}"),
            ArgsError::MissingArgument { command, what } => {
                write!(f, "{command} requires {what}")
            }
            ArgsError::UnexpectedArgument(arg) => write!(f, "unexpected argument: {arg}"),
            ArgsError::InvalidNumber { what, raw } => write!(f, "invalid {what} value: {raw}"),
            ArgsError::InvalidDuration { raw } => {
                write!(f, "invalid --duration value (seconds or PT#H#M#S): {raw}")
            }
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidUser { raw } => write!(f, "invalid --user value: {raw}"),
            ArgsError::InvalidUtcOffset { raw } => {
                write!(f, "invalid --utc-offset value (minutes east of UTC): {raw}")
            }
            ArgsError::InvalidDay { raw } => {
                write!(f, "invalid --day value (expected YYYY-MM-DD): {raw}")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

pub fn print_usage() {
    eprintln!("Usage: watch [--db <sqlite_url>] [--user <id>] [--utc-offset <minutes>] <command>");
    eprintln!();
    eprintln!("Progress:");
    eprintln!("  progress <video> --watched <secs> --total <secs>");
    eprintln!("  resume <video>");
    eprintln!("  stats");
    eprintln!("  videos-progress");
    eprintln!();
    eprintln!("Streaks:");
    eprintln!("  session <secs>");
    eprintln!("  streak");
    eprintln!("  weekly [--day YYYY-MM-DD]");
    eprintln!();
    eprintln!("Library:");
    eprintln!("  add-video <url|id> --title <t> --thumbnail <url> [--duration <secs|PT#M#S>]");
    eprintln!("  add-playlist <url|id> --name <n> [--file <entries.json>]  # stdin if no --file");
    eprintln!("  videos [--playlist <url|id>]");
    eprintln!("  playlists");
    eprintln!("  delete <url|id>");
    eprintln!("  reorder <url|id>...");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db {DEFAULT_DB_URL}");
    eprintln!("  --user 1");
    eprintln!("  --utc-offset <host local offset>");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  WATCH_DB_URL, WATCH_USER_ID, WATCH_UTC_OFFSET, RUST_LOG");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Progress {
        video: String,
        watched: Option<i64>,
        total: Option<i64>,
    },
    Resume {
        video: String,
    },
    Stats,
    VideosProgress,
    Session {
        seconds: i64,
    },
    Streak,
    Weekly {
        day: Option<NaiveDate>,
    },
    AddVideo {
        video: String,
        title: String,
        thumbnail: String,
        duration_secs: i64,
    },
    AddPlaylist {
        playlist: String,
        name: String,
        file: Option<PathBuf>,
    },
    Videos {
        playlist: Option<String>,
    },
    Playlists,
    Delete {
        video: String,
    },
    Reorder {
        videos: Vec<String>,
    },
    Help,
}

#[derive(Debug)]
pub struct Args {
    pub db_url: String,
    pub user_id: UserId,
    pub days: DayBoundary,
    pub command: Command,
}

/// Command-specific flags, collected before the command is known.
#[derive(Debug, Default)]
struct Flags {
    watched: Option<i64>,
    total: Option<i64>,
    day: Option<NaiveDate>,
    title: Option<String>,
    thumbnail: Option<String>,
    duration_secs: Option<i64>,
    name: Option<String>,
    file: Option<PathBuf>,
    playlist: Option<String>,
}

impl Args {
    /// Parse `argv` (without the program name), falling back to `env` for
    /// connection and user settings.
    pub fn parse(
        argv: impl IntoIterator<Item = String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ArgsError> {
        let mut db_url =
            env("WATCH_DB_URL").map_or_else(|| DEFAULT_DB_URL.into(), normalize_sqlite_url);
        let mut user_id = match env("WATCH_USER_ID") {
            Some(raw) => parse_user(raw)?,
            None => UserId::new(1),
        };
        let mut days = match env("WATCH_UTC_OFFSET") {
            Some(raw) => parse_utc_offset(raw)?,
            None => DayBoundary::local(),
        };

        let mut flags = Flags::default();
        let mut positional: Vec<String> = Vec::new();
        let mut args = argv.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--user" => user_id = parse_user(require_value(&mut args, "--user")?)?,
                "--utc-offset" => {
                    days = parse_utc_offset(require_value(&mut args, "--utc-offset")?)?;
                }
                "--watched" => {
                    let raw = require_value(&mut args, "--watched")?;
                    flags.watched = Some(parse_i64("--watched", raw)?);
                }
                "--total" => {
                    let raw = require_value(&mut args, "--total")?;
                    flags.total = Some(parse_i64("--total", raw)?);
                }
                "--day" => {
                    let raw = require_value(&mut args, "--day")?;
                    let day = raw
                        .parse::<NaiveDate>()
                        .map_err(|_| ArgsError::InvalidDay { raw: raw.clone() })?;
                    flags.day = Some(day);
                }
                "--title" => flags.title = Some(require_value(&mut args, "--title")?),
                "--thumbnail" => flags.thumbnail = Some(require_value(&mut args, "--thumbnail")?),
                "--duration" => {
                    flags.duration_secs =
                        Some(parse_duration(require_value(&mut args, "--duration")?)?);
                }
                "--name" => flags.name = Some(require_value(&mut args, "--name")?),
                "--file" => flags.file = Some(PathBuf::from(require_value(&mut args, "--file")?)),
                "--playlist" => flags.playlist = Some(require_value(&mut args, "--playlist")?),
                "--help" | "-h" => positional.insert(0, "help".into()),
                _ if arg.starts_with("--") => return Err(ArgsError::UnknownArg(arg)),
                _ => positional.push(arg),
            }
        }

        let command = build_command(positional, flags)?;
        Ok(Self {
            db_url,
            user_id,
            days,
            command,
        })
    }
}

fn build_command(positional: Vec<String>, flags: Flags) -> Result<Command, ArgsError> {
    let mut rest = positional.into_iter();
    let Some(name) = rest.next() else {
        return Err(ArgsError::MissingCommand);
    };

    let command = match name.as_str() {
        "help" => return Ok(Command::Help),
        "progress" => Command::Progress {
            video: one(&mut rest, "progress", "a video")?,
            watched: flags.watched,
            total: flags.total,
        },
        "resume" => Command::Resume {
            video: one(&mut rest, "resume", "a video")?,
        },
        "stats" => Command::Stats,
        "videos-progress" => Command::VideosProgress,
        "session" => {
            let raw = one(&mut rest, "session", "a number of seconds")?;
            Command::Session {
                seconds: parse_i64("session seconds", raw)?,
            }
        }
        "streak" => Command::Streak,
        "weekly" => Command::Weekly { day: flags.day },
        "add-video" => Command::AddVideo {
            video: one(&mut rest, "add-video", "a video link or id")?,
            title: flags.title.ok_or(ArgsError::MissingArgument {
                command: "add-video",
                what: "--title",
            })?,
            thumbnail: flags.thumbnail.ok_or(ArgsError::MissingArgument {
                command: "add-video",
                what: "--thumbnail",
            })?,
            duration_secs: flags.duration_secs.unwrap_or(0),
        },
        "add-playlist" => Command::AddPlaylist {
            playlist: one(&mut rest, "add-playlist", "a playlist link or id")?,
            name: flags.name.ok_or(ArgsError::MissingArgument {
                command: "add-playlist",
                what: "--name",
            })?,
            file: flags.file,
        },
        "videos" => Command::Videos {
            playlist: flags.playlist,
        },
        "playlists" => Command::Playlists,
        "delete" => Command::Delete {
            video: one(&mut rest, "delete", "a video")?,
        },
        "reorder" => {
            let videos: Vec<String> = rest.by_ref().collect();
            if videos.is_empty() {
                return Err(ArgsError::MissingArgument {
                    command: "reorder",
                    what: "at least one video",
                });
            }
            Command::Reorder { videos }
        }
        _ => return Err(ArgsError::UnknownCommand(name)),
    };

    match rest.next() {
        Some(extra) => Err(ArgsError::UnexpectedArgument(extra)),
        None => Ok(command),
    }
}

fn one(
    rest: &mut impl Iterator<Item = String>,
    command: &'static str,
    what: &'static str,
) -> Result<String, ArgsError> {
    rest.next()
        .ok_or(ArgsError::MissingArgument { command, what })
}

fn parse_i64(what: &'static str, raw: String) -> Result<i64, ArgsError> {
    raw.trim()
        .parse()
        .map_err(|_| ArgsError::InvalidNumber { what, raw })
}

fn parse_user(raw: String) -> Result<UserId, ArgsError> {
    raw.trim()
        .parse::<UserId>()
        .map_err(|_| ArgsError::InvalidUser { raw })
}

fn parse_utc_offset(raw: String) -> Result<DayBoundary, ArgsError> {
    raw.trim()
        .parse::<i32>()
        .ok()
        .and_then(DayBoundary::from_offset_minutes)
        .ok_or(ArgsError::InvalidUtcOffset { raw })
}

/// Plain seconds, or an ISO-8601 duration such as `PT12M30S`.
pub fn parse_duration(raw: String) -> Result<i64, ArgsError> {
    let trimmed = raw.trim();
    if let Ok(secs) = trimmed.parse::<i64>() {
        return Ok(secs);
    }
    if trimmed.starts_with('P') {
        let secs = parse_iso8601_duration(trimmed);
        if secs > 0 {
            return i64::try_from(secs).map_err(|_| ArgsError::InvalidDuration { raw });
        }
    }
    Err(ArgsError::InvalidDuration { raw })
}

pub fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") || raw.starts_with("sqlite:file:")
    {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, ArgsError> {
        Args::parse(args.iter().map(|s| (*s).to_string()), |_| None)
    }

    #[test]
    fn globals_may_appear_anywhere() {
        let args = parse(&["resume", "abc", "--user", "42", "--utc-offset", "-300"]).unwrap();
        assert_eq!(args.user_id, UserId::new(42));
        assert_eq!(args.days, DayBoundary::from_offset_minutes(-300).unwrap());
        assert_eq!(
            args.command,
            Command::Resume {
                video: "abc".into()
            }
        );
        assert_eq!(args.db_url, DEFAULT_DB_URL);
    }

    #[test]
    fn env_supplies_defaults_and_flags_override() {
        let env = |key: &str| match key {
            "WATCH_DB_URL" => Some("sqlite::memory:".to_string()),
            "WATCH_USER_ID" => Some("9".to_string()),
            "WATCH_UTC_OFFSET" => Some("0".to_string()),
            _ => None,
        };
        let args = Args::parse(["stats".to_string()], env).unwrap();
        assert_eq!(args.db_url, "sqlite::memory:");
        assert_eq!(args.user_id, UserId::new(9));
        assert_eq!(args.days, DayBoundary::utc());

        let args = Args::parse(
            ["--user".to_string(), "3".to_string(), "stats".to_string()],
            env,
        )
        .unwrap();
        assert_eq!(args.user_id, UserId::new(3));
    }

    #[test]
    fn progress_keeps_missing_numbers_missing() {
        let args = parse(&["progress", "abc", "--watched", "30"]).unwrap();
        assert_eq!(
            args.command,
            Command::Progress {
                video: "abc".into(),
                watched: Some(30),
                total: None,
            }
        );
    }

    #[test]
    fn add_video_requires_title_and_accepts_iso_duration() {
        let err = parse(&["add-video", "abc", "--thumbnail", "t"]).unwrap_err();
        assert_eq!(
            err,
            ArgsError::MissingArgument {
                command: "add-video",
                what: "--title"
            }
        );

        let args = parse(&[
            "add-video",
            "https://youtu.be/abc",
            "--title",
            "Intro",
            "--thumbnail",
            "https://img/abc.jpg",
            "--duration",
            "PT1M5S",
        ])
        .unwrap();
        assert!(matches!(
            args.command,
            Command::AddVideo {
                duration_secs: 65,
                ..
            }
        ));
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(parse(&[]).unwrap_err(), ArgsError::MissingCommand);
        assert_eq!(
            parse(&["launch"]).unwrap_err(),
            ArgsError::UnknownCommand("launch".into())
        );
        assert_eq!(
            parse(&["stats", "--verbose"]).unwrap_err(),
            ArgsError::UnknownArg("--verbose".into())
        );
        assert_eq!(
            parse(&["stats", "extra"]).unwrap_err(),
            ArgsError::UnexpectedArgument("extra".into())
        );
        assert!(matches!(
            parse(&["weekly", "--day", "14/11/2023"]).unwrap_err(),
            ArgsError::InvalidDay { .. }
        ));
        assert!(matches!(
            parse(&["stats", "--utc-offset", "99999"]).unwrap_err(),
            ArgsError::InvalidUtcOffset { .. }
        ));
        assert_eq!(
            parse(&["session"]).unwrap_err(),
            ArgsError::MissingArgument {
                command: "session",
                what: "a number of seconds"
            }
        );
    }

    #[test]
    fn negative_session_reaches_the_service() {
        let args = parse(&["session", "-5"]).unwrap();
        assert_eq!(args.command, Command::Session { seconds: -5 });
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("90".into()), Ok(90));
        assert_eq!(parse_duration("PT2H".into()), Ok(7200));
        assert!(parse_duration("soon".into()).is_err());
    }

    #[test]
    fn sqlite_urls_are_normalized() {
        assert_eq!(
            normalize_sqlite_url("sqlite::memory:".into()),
            "sqlite::memory:"
        );
        let abs = normalize_sqlite_url("sqlite:/tmp/w.db".into());
        assert_eq!(abs, "sqlite:///tmp/w.db");
        assert!(normalize_sqlite_url("rel.db".into()).starts_with("sqlite:///"));
    }
}
