//! URL utilities: video and playlist ids, query helpers, client nonces

use crate::error::SigtubeError;
use rand::Rng;
use url::Url;

/// Alphabet used for client playback nonces
pub const NONCE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Random string drawn from [`NONCE_ALPHABET`]
pub fn random_string(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| NONCE_ALPHABET[rng.gen_range(0..NONCE_ALPHABET.len())] as char)
        .collect()
}

/// Parse `value` as an absolute URL, or `None`
pub fn url_or_none(value: &str) -> Option<Url> {
    let parsed = Url::parse(value.trim()).ok()?;
    matches!(parsed.scheme(), "http" | "https").then_some(parsed)
}

/// Value of a query parameter
pub fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Extract the video id from watch, short-link and shorts URLs, or accept a bare id
pub fn extract_video_id(input: &str) -> Result<String, SigtubeError> {
    if is_bare_video_id(input) {
        return Ok(input.to_string());
    }

    let parsed = Url::parse(input)?;
    match parsed.host_str() {
        Some("youtu.be") => {
            let path = parsed.path().trim_start_matches('/');
            if path.is_empty() {
                return Err(SigtubeError::InvalidUrl("Missing video ID".to_string()));
            }
            Ok(path.to_string())
        }
        Some("youtube.com") | Some("www.youtube.com") | Some("m.youtube.com") => {
            if parsed.path().starts_with("/watch") {
                query_param(&parsed, "v")
                    .ok_or_else(|| SigtubeError::InvalidUrl("Missing v parameter".to_string()))
            } else if let Some(id) = parsed
                .path()
                .strip_prefix("/shorts/")
                .or_else(|| parsed.path().strip_prefix("/embed/"))
            {
                if id.is_empty() {
                    return Err(SigtubeError::InvalidUrl("Missing video ID in path".to_string()));
                }
                Ok(id.trim_end_matches('/').to_string())
            } else {
                Err(SigtubeError::InvalidUrl(format!(
                    "Unsupported video URL: {}",
                    input
                )))
            }
        }
        _ => Err(SigtubeError::InvalidUrl(format!(
            "Not a supported video URL: {}",
            input
        ))),
    }
}

fn is_bare_video_id(input: &str) -> bool {
    input.len() == 11
        && input
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Extract the playlist id from a `list=` URL, or accept a raw id
pub fn extract_playlist_id(input: &str) -> Result<String, SigtubeError> {
    if input.starts_with("PL") || input.starts_with("UU") || input.starts_with("OLAK5uy_") {
        return Ok(input.to_string());
    }

    let parsed = Url::parse(input)?;
    query_param(&parsed, "list")
        .filter(|id| !id.is_empty())
        .ok_or_else(|| SigtubeError::InvalidUrl("Playlist ID not found".to_string()))
}

/// True for playlist pages, `list=` URLs and raw playlist ids
pub fn is_playlist_url(input: &str) -> bool {
    match Url::parse(input) {
        Ok(parsed) => {
            parsed.path().starts_with("/playlist") || query_param(&parsed, "list").is_some()
        }
        Err(_) => input.starts_with("PL") || input.starts_with("UU") || input.starts_with("OLAK5uy_"),
    }
}
