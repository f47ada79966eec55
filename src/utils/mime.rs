//! MIME type helpers for stream formats

/// Essence of a MIME type, without parameters (`video/mp4; codecs="..."` → `video/mp4`)
pub fn mime_essence(mime_type: &str) -> &str {
    mime_type.split(';').next().unwrap_or_default().trim()
}

/// File extension for a stream MIME type; parameters are ignored
pub fn ext_from_mime(mime_type: &str) -> &'static str {
    match mime_essence(mime_type) {
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/3gpp" => "3gp",
        "video/x-flv" => "flv",
        "video/mp2t" => "ts",
        "video/x-matroska" => "mkv",

        "audio/mp4" => "m4a",
        "audio/webm" => "webm",
        "audio/mpeg" => "mp3",
        "audio/ogg" => "ogg",
        "audio/aac" => "aac",
        "audio/opus" => "opus",

        _ => "bin",
    }
}

/// Codec list from the `codecs` parameter
pub fn codecs(mime_type: &str) -> Vec<String> {
    mime_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.trim().strip_prefix("codecs="))
        .flat_map(|list| list.trim_matches('"').split(','))
        .map(|codec| codec.trim().to_string())
        .filter(|codec| !codec.is_empty())
        .collect()
}
