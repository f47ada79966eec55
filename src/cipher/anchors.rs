//! Anchor sets used to find transforms inside the player bundle.
//!
//! Anchors are data: they ship with sensible defaults but can be replaced
//! from a JSON file so that bundle drift can be handled without a rebuild.

use crate::cipher::TransformKind;
use crate::error::SigtubeError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

/// A single search hint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    /// Exact substring
    Literal(String),
    /// Regular expression
    Pattern(AnchorPattern),
}

/// Regex anchor source, compiled on first use
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct AnchorPattern {
    source: String,
    compiled: OnceLock<Option<Regex>>,
}

impl AnchorPattern {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            compiled: OnceLock::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// The compiled regex, `None` when the source is invalid
    pub fn regex(&self) -> Option<&Regex> {
        self.compiled
            .get_or_init(|| Regex::new(&self.source).ok())
            .as_ref()
    }
}

impl PartialEq for AnchorPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for AnchorPattern {}

impl From<String> for AnchorPattern {
    fn from(source: String) -> Self {
        Self::new(source)
    }
}

impl From<AnchorPattern> for String {
    fn from(pattern: AnchorPattern) -> Self {
        pattern.source
    }
}

impl Anchor {
    /// Byte offset of the first match in `haystack`.
    ///
    /// Invalid patterns never match; [`AnchorConfig::validate`] rejects them up front.
    pub fn find(&self, haystack: &str) -> Option<usize> {
        match self {
            Anchor::Literal(literal) => haystack.find(literal.as_str()),
            Anchor::Pattern(pattern) => pattern.regex()?.find(haystack).map(|m| m.start()),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Anchor::Literal(literal) => literal.clone(),
            Anchor::Pattern(pattern) => format!("/{}/", pattern.as_str()),
        }
    }
}

/// Ordered anchors for one transform, tried in priority order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnchorSet {
    anchors: Vec<Anchor>,
}

impl AnchorSet {
    pub fn new(anchors: Vec<Anchor>) -> Self {
        Self { anchors }
    }

    /// Built-in anchors for a transform kind
    pub fn defaults_for(kind: TransformKind) -> Self {
        match kind {
            TransformKind::Signature => Self::new(vec![
                Anchor::Pattern(AnchorPattern::new(r#"=function\(\s*([\w$]+)\s*\)\s*\{\s*[\w$]+\s*=\s*[\w$]+\.split\(\s*""\s*\)"#)),
                Anchor::Pattern(AnchorPattern::new(r#"\.split\(\s*""\s*\)\s*;[^}]*return\s+[\w$]+\.join\(\s*""\s*\)"#)),
            ]),
            TransformKind::NParameter => Self::new(vec![
                Anchor::Literal("enhanced_except".to_string()),
                Anchor::Literal("-_w8_".to_string()),
                Anchor::Literal("1969".to_string()),
            ]),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Anchor> {
        self.anchors.iter()
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn descriptions(&self) -> Vec<String> {
        self.anchors.iter().map(Anchor::describe).collect()
    }
}

/// Anchors for both transforms, as stored in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorConfig {
    #[serde(default = "default_signature_anchors")]
    pub signature: AnchorSet,
    #[serde(default = "default_n_anchors")]
    pub n_parameter: AnchorSet,
}

fn default_signature_anchors() -> AnchorSet {
    AnchorSet::defaults_for(TransformKind::Signature)
}

fn default_n_anchors() -> AnchorSet {
    AnchorSet::defaults_for(TransformKind::NParameter)
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            signature: default_signature_anchors(),
            n_parameter: default_n_anchors(),
        }
    }
}

impl AnchorConfig {
    pub fn for_kind(&self, kind: TransformKind) -> &AnchorSet {
        match kind {
            TransformKind::Signature => &self.signature,
            TransformKind::NParameter => &self.n_parameter,
        }
    }

    /// Load anchors from a JSON file; missing sections fall back to defaults.
    pub fn load(path: &Path) -> Result<Self, SigtubeError> {
        let raw = std::fs::read_to_string(path)?;
        let config: AnchorConfig = serde_json::from_str(&raw)
            .map_err(|e| SigtubeError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject empty anchor sets and patterns that do not compile
    pub fn validate(&self) -> Result<(), SigtubeError> {
        for (kind, set) in [
            (TransformKind::Signature, &self.signature),
            (TransformKind::NParameter, &self.n_parameter),
        ] {
            if set.is_empty() {
                return Err(SigtubeError::Config(format!("no {} anchors configured", kind)));
            }
            for anchor in set.iter() {
                if let Anchor::Pattern(pattern) = anchor {
                    // compiles the pattern into its cache
                    if pattern.regex().is_none() {
                        let reason = Regex::new(pattern.as_str())
                            .err()
                            .map(|e| e.to_string())
                            .unwrap_or_default();
                        return Err(SigtubeError::Config(format!(
                            "invalid {} anchor {:?}: {}",
                            kind,
                            pattern.as_str(),
                            reason
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
