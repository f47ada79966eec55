//! Dependency resolution for extracted transforms.
//!
//! A transform usually calls into one helper object (`Xy.AB(a,3)`) and the
//! n-transform guards on a bundle-level variable
//! (`typeof Qx === "undefined"`). Both must be declared next to the function
//! for it to run standalone. Identifiers that are parameters or locals of the
//! function, language keywords and built-in globals are never treated as
//! dependencies.

use crate::cipher::extractor::{code_mask, extract_value, scalar_end};
use crate::error::CipherError;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::debug;

/// A helper definition required by a transform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    /// Value source text, e.g. `{AB:function(a){a.reverse()}}`
    pub definition: String,
}

impl Dependency {
    /// Declaration statement for the sandbox program
    pub fn declaration(&self) -> String {
        format!("var {}={};", self.name, self.definition)
    }
}

const RESERVED: &[&str] = &[
    // keywords
    "arguments", "break", "case", "catch", "const", "continue", "delete", "do", "else", "false",
    "finally", "for", "function", "if", "in", "instanceof", "let", "new", "null", "return",
    "switch", "this", "throw", "true", "try", "typeof", "var", "void", "while",
    // built-in globals
    "Array", "Boolean", "Date", "Error", "Infinity", "JSON", "Math", "NaN", "Number", "Object",
    "Promise", "RegExp", "String", "Symbol", "TypeError", "decodeURIComponent",
    "encodeURIComponent", "escape", "globalThis", "isFinite", "isNaN", "parseFloat", "parseInt",
    "undefined", "unescape",
];

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$'
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

fn ident_at(bytes: &[u8], start: usize) -> usize {
    let mut end = start;
    while end < bytes.len() && is_ident_char(bytes[end]) {
        end += 1;
    }
    end
}

/// Identifiers used as `name.member` outside string literals, first-seen order
pub fn member_references(source: &str) -> Vec<String> {
    let bytes = source.as_bytes();
    let mask = code_mask(source);
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    let mut prev_code: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if !mask[i] {
            prev_code = None;
            i += 1;
            continue;
        }
        if is_ident_start(b) {
            let end = ident_at(bytes, i);
            let is_member_name = prev_code == Some(b'.');
            let followed_by_member = end + 1 < bytes.len()
                && bytes[end] == b'.'
                && mask[end]
                && is_ident_start(bytes[end + 1]);
            if followed_by_member && !is_member_name {
                let name = &source[i..end];
                if seen.insert(name) {
                    names.push(name.to_string());
                }
            }
            prev_code = Some(bytes[end - 1]);
            i = end;
            continue;
        }
        if b.is_ascii_digit() {
            // numeric literals such as `1.5` or `0x1f`
            let end = ident_at(bytes, i);
            prev_code = Some(bytes[end - 1]);
            i = end;
            continue;
        }
        if b != b' ' {
            prev_code = Some(b);
        }
        i += 1;
    }

    names
}

/// Parameters of every function literal in `source`, outermost first
pub fn function_parameters(source: &str) -> Vec<String> {
    static PARAMS: OnceLock<Regex> = OnceLock::new();
    static ARROW: OnceLock<Regex> = OnceLock::new();
    let params = PARAMS.get_or_init(|| {
        Regex::new(r"function\s*[\w$]*\s*\(([^)]*)\)").expect("static regex")
    });
    let arrow = ARROW.get_or_init(|| {
        Regex::new(r"(?:\(([^()]*)\)|([\w$]+))\s*=>").expect("static regex")
    });

    let mut names = Vec::new();
    for caps in params.captures_iter(source).chain(arrow.captures_iter(source)) {
        let list = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
        for param in list.split(',') {
            let param = param.trim().trim_start_matches("...");
            let param = param.split('=').next().unwrap_or_default().trim();
            if !param.is_empty() && !names.iter().any(|n| n == param) {
                names.push(param.to_string());
            }
        }
    }
    names
}

/// Names declared inside `source` with `var`/`let`/`const`, `function name` or `catch (name)`
pub fn local_declarations(source: &str) -> HashSet<String> {
    static DECL: OnceLock<Regex> = OnceLock::new();
    static NAMED: OnceLock<Regex> = OnceLock::new();
    let decl = DECL.get_or_init(|| {
        Regex::new(r"(?:^|[^\w$.])(?:var|let|const)\s+").expect("static regex")
    });
    let named = NAMED.get_or_init(|| {
        Regex::new(r"(?:function\s+|catch\s*\(\s*)([\w$]+)").expect("static regex")
    });

    let bytes = source.as_bytes();
    let mask = code_mask(source);
    let mut names = HashSet::new();

    for m in decl.find_iter(source) {
        if !mask[m.end() - 1] {
            continue;
        }
        let mut pos = m.end();
        loop {
            while pos < bytes.len() && bytes[pos] == b' ' {
                pos += 1;
            }
            let end = ident_at(bytes, pos);
            if end == pos {
                break;
            }
            names.insert(source[pos..end].to_string());
            pos = end;
            while pos < bytes.len() && bytes[pos] == b' ' {
                pos += 1;
            }
            if pos < bytes.len() && bytes[pos] == b'=' {
                match scalar_end(source, pos + 1) {
                    Ok(value_end) => pos = value_end + 1,
                    Err(_) => break,
                }
            }
            if pos < bytes.len() && bytes[pos] == b',' {
                pos += 1;
            } else {
                break;
            }
        }
    }

    for caps in named.captures_iter(source) {
        if let Some(name) = caps.get(1) {
            if mask[name.start()] {
                names.insert(name.as_str().to_string());
            }
        }
    }

    names
}

/// Variables checked with `typeof name === "undefined"`
pub fn typeof_guards(source: &str) -> Vec<String> {
    static GUARD: OnceLock<Regex> = OnceLock::new();
    let guard = GUARD.get_or_init(|| {
        Regex::new(r#"typeof\s+([\w$]+)\s*[!=]==?\s*["']undefined["']"#).expect("static regex")
    });
    let mut names: Vec<String> = Vec::new();
    for caps in guard.captures_iter(source) {
        let name = &caps[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Free identifiers of `source` that must be supplied from the bundle
pub fn dependency_names(source: &str) -> Vec<String> {
    let params = function_parameters(source);
    let locals = local_declarations(source);
    let mut names: Vec<String> = Vec::new();

    for name in member_references(source)
        .into_iter()
        .chain(typeof_guards(source))
    {
        let excluded = RESERVED.contains(&name.as_str())
            || params.contains(&name)
            || locals.contains(&name)
            || names.contains(&name);
        if !excluded {
            names.push(name);
        }
    }
    names
}

/// Locate the value assigned to `name` in the bundle.
///
/// `var`/`let`/`const` declarations are preferred over bare assignments.
pub fn find_definition(bundle: &str, name: &str) -> Option<String> {
    let escaped = regex::escape(name);
    let declared = Regex::new(&format!(r"(?:^|[^\w$.])(?:var|let|const)\s+{}\s*=\s*", escaped)).ok()?;
    let assigned = Regex::new(&format!(r"(?:^|[^\w$.]){}\s*=\s*", escaped)).ok()?;

    for re in [&declared, &assigned] {
        for m in re.find_iter(bundle) {
            let value_start = m.end();
            let next = bundle.as_bytes().get(value_start).copied();
            if matches!(next, None | Some(b'=') | Some(b'>')) {
                continue;
            }
            if let Ok(value) = extract_value(bundle, value_start) {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Resolve every dependency of `function_source` against the bundle.
///
/// A single missing definition fails the whole resolution.
pub fn resolve_dependencies(
    bundle: &str,
    function_source: &str,
) -> Result<Vec<Dependency>, CipherError> {
    dependency_names(function_source)
        .into_iter()
        .map(|name| match find_definition(bundle, &name) {
            Some(definition) => {
                debug!("resolved dependency {} ({} bytes)", name, definition.len());
                Ok(Dependency { name, definition })
            }
            None => {
                debug!("dependency {} has no definition in bundle", name);
                Err(CipherError::DependencyNotFound { name })
            }
        })
        .collect()
}
