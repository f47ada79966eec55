//! Transform locator

use crate::cipher::{AnchorSet, TransformKind};
use crate::error::CipherError;
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

/// Token that precedes every transform definition in the bundle
pub const FUNCTION_MARKER: &str = "=function";

/// Collapse runs of whitespace to a single space and trim the ends
pub fn normalize_whitespace(source: &str) -> String {
    static WS: OnceLock<Regex> = OnceLock::new();
    let re = WS.get_or_init(|| Regex::new(r"\s+").expect("static regex"));
    re.replace_all(source, " ").trim().to_string()
}

/// Where a transform was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Description of the anchor that matched
    pub anchor: String,
    /// Offset of the anchor hit
    pub anchor_offset: usize,
    /// Offset of the `function` keyword, just past the marker's `=`
    pub start: usize,
}

/// Find the start of a transform's function literal in normalized text.
///
/// Anchors are tried in order and the first hit wins. From that hit the
/// nearest `=function` starting at or before it is taken; when there is none
/// the search stops with [`CipherError::FunctionBoundaryNotFound`] instead of
/// moving on to the next anchor.
pub fn locate(
    text: &str,
    anchors: &AnchorSet,
    kind: TransformKind,
) -> Result<Location, CipherError> {
    for anchor in anchors.iter() {
        let Some(hit) = anchor.find(text) else {
            debug!("{} anchor {} not present", kind, anchor.describe());
            continue;
        };

        // markers ending within `hit + marker length` start at or before the hit
        let mut window_end = (hit + FUNCTION_MARKER.len()).min(text.len());
        while !text.is_char_boundary(window_end) {
            window_end -= 1;
        }

        return match text[..window_end].rfind(FUNCTION_MARKER) {
            Some(marker) => {
                let location = Location {
                    anchor: anchor.describe(),
                    anchor_offset: hit,
                    start: marker + 1,
                };
                debug!(
                    "{} anchor {} matched at {}, function starts at {}",
                    kind, location.anchor, hit, location.start
                );
                Ok(location)
            }
            None => Err(CipherError::FunctionBoundaryNotFound {
                kind,
                anchor: anchor.describe(),
                offset: hit,
            }),
        };
    }

    Err(CipherError::AnchorNotFound {
        kind,
        anchors_tried: anchors.descriptions(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::Anchor;

    fn literal_set(anchors: &[&str]) -> AnchorSet {
        AnchorSet::new(
            anchors
                .iter()
                .map(|a| Anchor::Literal(a.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a\n\n b\t\tc  "), "a b c");
        assert_eq!(normalize_whitespace(""), "");
    }

    #[test]
    fn test_locate_picks_nearest_preceding_marker() {
        let text = r#"x=function(){};y=function(a){var b="1969";return b}"#;
        let location = locate(text, &literal_set(&["1969"]), TransformKind::NParameter).unwrap();
        assert_eq!(location.anchor, "1969");
        assert_eq!(&text[location.start..location.start + 8], "function");
        assert_eq!(location.start, text.find("y=function").unwrap() + 2);
    }

    #[test]
    fn test_locate_falls_back_across_anchors() {
        let text = r#"q=function(a){return a+"-_w8_"}"#;
        let location = locate(
            text,
            &literal_set(&["enhanced_except", "-_w8_", "1969"]),
            TransformKind::NParameter,
        )
        .unwrap();
        assert_eq!(location.anchor, "-_w8_");
        assert_eq!(location.start, 2);
    }

    #[test]
    fn test_no_anchor_matched() {
        let err = locate("var a=1;", &literal_set(&["zzz", "yyy"]), TransformKind::NParameter)
            .unwrap_err();
        assert_eq!(
            err,
            CipherError::AnchorNotFound {
                kind: TransformKind::NParameter,
                anchors_tried: vec!["zzz".to_string(), "yyy".to_string()],
            }
        );
    }

    #[test]
    fn test_anchor_without_boundary_does_not_fall_back() {
        // The first anchor hits before any marker; the second would succeed
        // but must not be tried.
        let text = r#"var s="1969";f=function(a){return "-_w8_"}"#;
        let err = locate(text, &literal_set(&["1969", "-_w8_"]), TransformKind::NParameter)
            .unwrap_err();
        assert_eq!(
            err,
            CipherError::FunctionBoundaryNotFound {
                kind: TransformKind::NParameter,
                anchor: "1969".to_string(),
                offset: 7,
            }
        );
    }

    #[test]
    fn test_multibyte_text_after_anchor_does_not_widen_search() {
        let text = r#"var s="1969éééé";f=function(a){return a}"#;
        let err = locate(text, &literal_set(&["1969"]), TransformKind::NParameter).unwrap_err();
        assert_eq!(
            err,
            CipherError::FunctionBoundaryNotFound {
                kind: TransformKind::NParameter,
                anchor: "1969".to_string(),
                offset: 7,
            }
        );

        let text = r#"g=function(a){var t="ü";return a+"1969é"};f=function(b){return b}"#;
        let location = locate(text, &literal_set(&["1969"]), TransformKind::NParameter).unwrap();
        assert_eq!(location.start, 2);
    }

    #[test]
    fn test_marker_at_anchor_offset_is_found() {
        let text = r#"var q=1;Bz=function(a){a=a.split("");return a.join("")};"#;
        let set = AnchorSet::defaults_for(TransformKind::Signature);
        let location = locate(text, &set, TransformKind::Signature).unwrap();
        assert_eq!(location.anchor_offset, text.find("=function").unwrap());
        assert_eq!(location.start, location.anchor_offset + 1);
    }
}
