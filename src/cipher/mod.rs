//! Player bundle transform extraction and evaluation.
//!
//! A decode pass runs leaf-first: the locator finds the transform's
//! assignment, the extractor isolates the function literal, the resolver
//! collects the helper definitions it references, and the sandbox compiles
//! the reconstructed snippet into a callable. Applicators then feed stream
//! URLs through the compiled transforms.

pub mod anchors;
pub mod applicator;
pub mod extractor;
pub mod locator;
pub mod registry;
pub mod resolver;
pub mod sandbox;
pub mod session;

pub use anchors::*;
pub use applicator::*;
pub use extractor::*;
pub use locator::*;
pub use registry::*;
pub use resolver::*;
pub use sandbox::*;
pub use session::*;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which of the two bundle transforms is being handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    /// The `s` signature cipher
    Signature,
    /// The `n` throttling parameter
    NParameter,
}

impl TransformKind {
    /// Name of the global the sandbox binds this transform to
    pub fn binding(&self) -> &'static str {
        match self {
            TransformKind::Signature => "__sigtube_signature",
            TransformKind::NParameter => "__sigtube_nparam",
        }
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformKind::Signature => write!(f, "signature"),
            TransformKind::NParameter => write!(f, "n-parameter"),
        }
    }
}

/// Whitespace-normalized player source for one platform version.
///
/// All offsets produced by the locator, extractor and resolver refer to
/// `text`, never to the raw download.
#[derive(Debug, Clone)]
pub struct BundleText {
    version: String,
    text: String,
}

impl BundleText {
    pub fn new(version: impl Into<String>, raw: &str) -> Self {
        Self {
            version: version.into(),
            text: normalize_whitespace(raw),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}
