//! Parsing of video-platform links and duration strings.

use url::Url;

const WATCH_HOSTS: &[&str] = &["youtube.com", "www.youtube.com", "m.youtube.com"];
const SHORT_HOSTS: &[&str] = &["youtu.be", "www.youtu.be"];

fn parse_link(raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    Url::parse(raw)
        .or_else(|_| Url::parse(&format!("https://{raw}")))
        .ok()
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_owned())
}

/// Extract the video id from a watch, short, embed or `/v/` link.
///
/// ```
/// use watch_core::link::parse_video_id;
///
/// assert_eq!(parse_video_id("https://youtu.be/abc123").as_deref(), Some("abc123"));
/// assert_eq!(parse_video_id("https://example.com/watch?v=abc"), None);
/// ```
#[must_use]
pub fn parse_video_id(link: &str) -> Option<String> {
    let url = parse_link(link)?;
    let host = url.host_str()?;

    if SHORT_HOSTS.contains(&host) {
        return url.path_segments()?.next().and_then(non_empty);
    }
    if !WATCH_HOSTS.contains(&host) {
        return None;
    }

    let mut segments = url.path_segments()?;
    match segments.next()? {
        "watch" => url
            .query_pairs()
            .find(|(k, _)| k == "v")
            .and_then(|(_, v)| non_empty(&v)),
        "embed" | "v" => segments.next().and_then(non_empty),
        _ => None,
    }
}

/// Extract the `list` query parameter of any link.
#[must_use]
pub fn parse_playlist_id(link: &str) -> Option<String> {
    parse_link(link)?
        .query_pairs()
        .find(|(k, _)| k == "list")
        .and_then(|(_, v)| non_empty(&v))
}

/// Convert an ISO-8601 time duration (`PT1H2M3S`) to seconds.
///
/// Components may be omitted but must appear in `H`, `M`, `S` order.
/// Anything that is not of that shape yields `0`.
#[must_use]
pub fn parse_iso8601_duration(raw: &str) -> u64 {
    let Some(start) = raw.find("PT") else {
        return 0;
    };
    let mut rest = &raw[start + 2..];
    let mut total: u64 = 0;

    for (unit, factor) in [('H', 3600_u64), ('M', 60), ('S', 1)] {
        let digits = rest.chars().take_while(char::is_ascii_digit).count();
        if digits == 0 || !rest[digits..].starts_with(unit) {
            continue;
        }
        let Ok(value) = rest[..digits].parse::<u64>() else {
            return 0;
        };
        total = total.saturating_add(value.saturating_mul(factor));
        rest = &rest[digits + 1..];
    }

    total
}
