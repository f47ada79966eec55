//! Output file naming

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Strip characters that are invalid in file names on common platforms
pub fn sanitize_title(title: &str) -> String {
    static INVALID: OnceLock<Regex> = OnceLock::new();
    let invalid = INVALID.get_or_init(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]+"#).expect("static regex"));

    let mut safe = invalid.replace_all(title, "").trim().to_string();
    safe = safe.trim_matches('.').to_string();

    if safe.len() > 200 {
        let mut cut = 200;
        while !safe.is_char_boundary(cut) {
            cut -= 1;
        }
        safe.truncate(cut);
        safe = safe.trim_end().to_string();
    }

    if safe.is_empty() {
        "video".to_string()
    } else {
        safe
    }
}

/// First free path of the form `dir/stem.ext`, `dir/stem_1.ext`, `dir/stem_2.ext`, ...
pub fn unique_path(dir: &Path, stem: &str, extension: &str) -> std::io::Result<PathBuf> {
    let extension = extension.trim_start_matches('.');
    let file_name = |suffix: Option<u32>| match suffix {
        Some(n) => format!("{}_{}.{}", stem, n, extension),
        None => format!("{}.{}", stem, extension),
    };

    let mut candidate = dir.join(file_name(None));
    let mut counter = 1;
    while candidate.exists() {
        candidate = dir.join(file_name(Some(counter)));
        counter += 1;
        if counter > 10_000 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "Too many files with similar names",
            ));
        }
    }
    Ok(candidate)
}
