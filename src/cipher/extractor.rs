//! Balanced-block extraction over minified source.
//!
//! The scanner is string and escape aware: inside a `"`, `'` or backtick
//! literal a backslash skips the following byte unconditionally and no
//! bracket is counted. Template interpolation (`${...}`) is not tracked;
//! braces inside an interpolation are treated as part of the literal, which
//! holds for the bundle shapes seen so far. Regex literals are not
//! recognised either.

use crate::error::CipherError;

/// Which bracket pairs contribute to nesting depth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Brackets {
    /// `{` / `}` only
    Braces,
    /// `{` / `}` and `[` / `]`
    BracesAndSquare,
}

impl Brackets {
    fn opens(self, b: u8) -> bool {
        b == b'{' || (self == Brackets::BracesAndSquare && b == b'[')
    }

    fn closes(self, b: u8) -> bool {
        b == b'}' || (self == Brackets::BracesAndSquare && b == b']')
    }
}

/// Tracks whether the scan position is inside a quoted literal
#[derive(Debug, Default)]
pub(crate) struct QuoteState {
    quote: Option<u8>,
    escaped: bool,
}

impl QuoteState {
    /// Feed one byte; returns true when the byte is code rather than literal content.
    pub(crate) fn step(&mut self, b: u8) -> bool {
        match self.quote {
            Some(q) => {
                if self.escaped {
                    self.escaped = false;
                } else if b == b'\\' {
                    self.escaped = true;
                } else if b == q {
                    self.quote = None;
                }
                false
            }
            None => {
                if matches!(b, b'"' | b'\'' | b'`') {
                    self.quote = Some(b);
                    false
                } else {
                    true
                }
            }
        }
    }
}

/// Inclusive offset of the bracket that closes the first block opened at or after `start`.
pub fn find_block_end(text: &str, start: usize, brackets: Brackets) -> Result<usize, CipherError> {
    let bytes = text.as_bytes();
    if start >= bytes.len() {
        return Err(CipherError::UnterminatedBlock { offset: start });
    }

    let mut state = QuoteState::default();
    let mut depth = 0usize;
    let mut opened = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if !state.step(b) {
            continue;
        }
        if brackets.opens(b) {
            depth += 1;
            opened = true;
        } else if brackets.closes(b) && opened {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return Ok(i);
            }
        }
    }

    Err(CipherError::UnterminatedBlock { offset: start })
}

/// The function literal beginning at `start`, through its closing brace
pub fn extract_function(text: &str, start: usize) -> Result<&str, CipherError> {
    let end = find_block_end(text, start, Brackets::Braces)?;
    text.get(start..=end)
        .ok_or(CipherError::UnterminatedBlock { offset: start })
}

/// The value expression beginning at `start`.
///
/// Object and array literals are balanced over `{}`/`[]`, function literals
/// over `{}`; anything else runs to the next `;` or `,` outside brackets and
/// strings (or the end of an enclosing block).
pub fn extract_value(text: &str, start: usize) -> Result<&str, CipherError> {
    let rest = text.get(start..).unwrap_or_default();
    let end = if rest.starts_with('{') || rest.starts_with('[') {
        find_block_end(text, start, Brackets::BracesAndSquare)?
    } else if rest.starts_with("function") {
        find_block_end(text, start, Brackets::Braces)?
    } else {
        scalar_end(text, start)?
    };
    text.get(start..=end)
        .map(str::trim_end)
        .ok_or(CipherError::UnterminatedBlock { offset: start })
}

/// Inclusive end of an expression that stops at the next top-level `;` or `,`
pub(crate) fn scalar_end(text: &str, start: usize) -> Result<usize, CipherError> {
    let bytes = text.as_bytes();
    let mut state = QuoteState::default();
    let mut depth = 0usize;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if !state.step(b) {
            continue;
        }
        match b {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' if depth > 0 => depth -= 1,
            b';' | b',' | b')' | b']' | b'}' if depth == 0 => {
                return if i > start {
                    Ok(i - 1)
                } else {
                    Err(CipherError::UnterminatedBlock { offset: start })
                };
            }
            _ => {}
        }
    }

    if bytes.len() > start {
        Ok(bytes.len() - 1)
    } else {
        Err(CipherError::UnterminatedBlock { offset: start })
    }
}

/// Per-byte flag: true where the byte is code, false inside string literals
pub(crate) fn code_mask(text: &str) -> Vec<bool> {
    let mut state = QuoteState::default();
    text.bytes().map(|b| state.step(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::{locate, Anchor, AnchorSet, TransformKind};

    #[test]
    fn test_simple_function() {
        let text = "function(a){return a}x";
        assert_eq!(extract_function(text, 0).unwrap(), "function(a){return a}");
    }

    #[test]
    fn test_nested_blocks_stop_at_first_return_to_zero() {
        let text = "function(a){if(a){a=1}else{a=2}return a};g=function(){}";
        assert_eq!(
            extract_function(text, 0).unwrap(),
            "function(a){if(a){a=1}else{a=2}return a}"
        );
    }

    #[test]
    fn test_braces_inside_strings_ignored() {
        let body = r#"function(a){var b="}}{",c='{',d=`}`;return a+b+c+d}"#;
        let text = format!("{};tail}}", body);
        assert_eq!(extract_function(&text, 0).unwrap(), body);
    }

    #[test]
    fn test_escaped_quotes_do_not_end_strings() {
        let body = r#"function(a){var b="\"}",c='\'{\\';return a}"#;
        let text = format!("{}}}}}", body);
        assert_eq!(extract_function(&text, 0).unwrap(), body);
    }

    #[test]
    fn test_unterminated() {
        let err = extract_function("function(a){if(a){return 1}", 0).unwrap_err();
        assert_eq!(err, CipherError::UnterminatedBlock { offset: 0 });
        assert!(extract_function("abc", 10).is_err());
    }

    #[test]
    fn test_locate_and_extract_exact_span() {
        let function = concat!(
            r#"function(a){var b=a.split(""),c=[a,"}{",'{',`}}`,"\"{"];"#,
            r#"if(typeof Qx==="undefined")return a;"#,
            r#"try{c[1]="enhanced_except_"+b.length}catch(d){return a}"#,
            r#"return b.reverse().join("")}"#
        );
        let bundle = format!(
            r#"var Qx=5;var other=function(x){{return x}};Wn={};Yq=[1,2];"#,
            function
        );
        let set = AnchorSet::new(vec![Anchor::Literal("enhanced_except".to_string())]);

        let location = locate(&bundle, &set, TransformKind::NParameter).unwrap();
        let extracted = extract_function(&bundle, location.start).unwrap();
        assert_eq!(extracted, function);
    }

    #[test]
    fn test_extract_object_value() {
        let text = r#"Xy={AB:function(a,b){a.splice(0,b)},CD:function(a){a.reverse()},EF:[1,"]",{}]};next"#;
        let start = text.find('{').unwrap();
        assert_eq!(
            extract_value(text, start).unwrap(),
            r#"{AB:function(a,b){a.splice(0,b)},CD:function(a){a.reverse()},EF:[1,"]",{}]}"#
        );
    }

    #[test]
    fn test_extract_array_value() {
        let text = r#"Ab=[function(a){return a},"x[",[2,3]],q=1"#;
        assert_eq!(
            extract_value(text, 3).unwrap(),
            r#"[function(a){return a},"x[",[2,3]]"#
        );
    }

    #[test]
    fn test_extract_scalar_value() {
        assert_eq!(extract_value("Qx=5;var y", 3).unwrap(), "5");
        assert_eq!(extract_value("Qx=f(1,2),y=3", 3).unwrap(), "f(1,2)");
        assert_eq!(extract_value(r#"Qx="a;b";"#, 3).unwrap(), r#""a;b""#);
        assert_eq!(extract_value("{var Qx=7}", 8).unwrap(), "7");
        assert!(extract_value("Qx=;", 3).is_err());
    }
}
