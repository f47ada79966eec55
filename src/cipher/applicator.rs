//! Cipher applicators: splice transform outputs into stream URLs.

use crate::cipher::StringTransform;
use crate::error::CipherError;
use std::collections::HashMap;
use tracing::{debug, warn};
use url::Url;

/// Query parameter the signature lands in when `sp` is absent
pub const DEFAULT_SIGNATURE_PARAM: &str = "signature";

/// Memo of raw `n` values to transformed ones.
///
/// Scoped to one compiled n-transform; build a new cache per decode pass.
#[derive(Debug, Default, Clone)]
pub struct NsigCache {
    entries: HashMap<String, String>,
}

impl NsigCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, raw: &str) -> Option<&str> {
        self.entries.get(raw).map(String::as_str)
    }

    pub fn insert(&mut self, raw: impl Into<String>, transformed: impl Into<String>) {
        self.entries.insert(raw.into(), transformed.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached value for `raw`, computing and storing it on a miss
    pub fn get_or_compute<T>(&mut self, raw: &str, transform: &mut T) -> Result<String, CipherError>
    where
        T: StringTransform + ?Sized,
    {
        if let Some(hit) = self.entries.get(raw) {
            debug!("n cache hit for {}", raw);
            return Ok(hit.clone());
        }
        let computed = transform.call(raw)?;
        self.entries.insert(raw.to_string(), computed.clone());
        Ok(computed)
    }
}

/// Decoded `signatureCipher` blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureCipher {
    /// Ciphered signature
    pub s: String,
    /// Base URL lacking the signature
    pub url: String,
    /// Target parameter name
    pub sp: Option<String>,
}

impl SignatureCipher {
    /// Parse the query-string encoded cipher; `s` and `url` are mandatory.
    pub fn parse(cipher: &str) -> Result<Self, CipherError> {
        let mut s = None;
        let mut url = None;
        let mut sp = None;
        for (key, value) in url::form_urlencoded::parse(cipher.as_bytes()) {
            match key.as_ref() {
                "s" => s = Some(value.into_owned()),
                "url" => url = Some(value.into_owned()),
                "sp" => sp = Some(value.into_owned()),
                _ => {}
            }
        }

        match (s, url) {
            (Some(s), Some(url)) => Ok(Self { s, url, sp }),
            (None, None) => Err(CipherError::MissingCipherComponents {
                missing: "s and url".to_string(),
            }),
            (None, Some(_)) => Err(CipherError::MissingCipherComponents {
                missing: "s".to_string(),
            }),
            (Some(_), None) => Err(CipherError::MissingCipherComponents {
                missing: "url".to_string(),
            }),
        }
    }

    pub fn target_param(&self) -> &str {
        self.sp
            .as_deref()
            .filter(|sp| !sp.is_empty())
            .unwrap_or(DEFAULT_SIGNATURE_PARAM)
    }

    /// Base URL with the deciphered signature set on the target parameter
    pub fn apply<T>(&self, transform: &mut T) -> Result<String, CipherError>
    where
        T: StringTransform + ?Sized,
    {
        let mut url = Url::parse(&self.url).map_err(|e| CipherError::InvalidUrl(e.to_string()))?;
        let signature = transform.call(&self.s)?;
        set_query_param(&mut url, self.target_param(), &signature);
        Ok(url.to_string())
    }
}

/// Set one query parameter in place; later duplicates are dropped and an
/// absent key is appended
pub fn set_query_param(url: &mut Url, name: &str, value: &str) {
    let mut found = false;
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter_map(|(key, current)| {
            if key != name {
                return Some((key.into_owned(), current.into_owned()));
            }
            if found {
                return None;
            }
            found = true;
            Some((key.into_owned(), value.to_string()))
        })
        .collect();

    let mut serializer = url.query_pairs_mut();
    serializer.clear();
    for (key, current) in &pairs {
        serializer.append_pair(key, current);
    }
    if !found {
        serializer.append_pair(name, value);
    }
}

/// Build the signed URL from a `signatureCipher` value
pub fn decipher_signature_url<T>(cipher: &str, transform: &mut T) -> Result<String, CipherError>
where
    T: StringTransform + ?Sized,
{
    SignatureCipher::parse(cipher)?.apply(transform)
}

/// Rewrite the `n` parameter of `url` through the cache and transform.
///
/// Best effort: without a transform, without an `n` parameter, or when the
/// transform throws, the URL is returned unchanged.
pub fn apply_n_transform<T>(url: &str, transform: Option<&mut T>, cache: &mut NsigCache) -> String
where
    T: StringTransform + ?Sized,
{
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    let Some(raw) = parsed
        .query_pairs()
        .find(|(key, _)| key == "n")
        .map(|(_, value)| value.into_owned())
    else {
        return url.to_string();
    };

    let cached = cache.get(&raw).map(str::to_string);
    let transformed = match (cached, transform) {
        (Some(hit), _) => hit,
        (None, Some(transform)) => match cache.get_or_compute(&raw, transform) {
            Ok(value) => value,
            Err(e) => {
                warn!("n transform failed, keeping original value: {}", e);
                return url.to_string();
            }
        },
        (None, None) => {
            debug!("no n transform available, skipping");
            return url.to_string();
        }
    };

    set_query_param(&mut parsed, "n", &transformed);
    parsed.to_string()
}
