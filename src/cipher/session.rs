//! Decode passes: from bundle text to resolved stream URLs.

use crate::cipher::{
    apply_n_transform, extract_function, locate, resolve_dependencies, set_query_param,
    AnchorConfig, AnchorSet, BundleText, NsigCache, Sandbox, SignatureCipher, StringTransform,
    TransformKind, TransformProgram,
};
use crate::core::Format;
use crate::error::CipherError;
use crate::platform::innertube::client_version;
use crate::utils::{query_param, random_string};
use tracing::{debug, info, warn};
use url::Url;

/// Length of the client playback nonce added to every stream URL
pub const CPN_LENGTH: usize = 16;

/// Locate, extract and resolve one transform
pub fn extract_program(
    bundle: &BundleText,
    anchors: &AnchorSet,
    kind: TransformKind,
) -> Result<TransformProgram, CipherError> {
    let text = bundle.text();
    let location = locate(text, anchors, kind)?;
    let function_source = extract_function(text, location.start)?;
    let dependencies = resolve_dependencies(text, function_source)?;

    debug!(
        "extracted {} transform from {} via {} ({} bytes, {} dependencies)",
        kind,
        bundle.version(),
        location.anchor,
        function_source.len(),
        dependencies.len()
    );
    Ok(TransformProgram {
        kind,
        function_source: function_source.to_string(),
        dependencies,
    })
}

/// Both transform programs of one bundle version.
///
/// Failures are kept rather than raised: a missing n transform only
/// degrades downloads, and formats with direct URLs never need the
/// signature transform.
#[derive(Debug, Clone)]
pub struct TransformPrograms {
    pub version: String,
    pub signature: Result<TransformProgram, CipherError>,
    pub n_parameter: Result<TransformProgram, CipherError>,
}

impl TransformPrograms {
    pub fn extract(bundle: &BundleText, anchors: &AnchorConfig) -> Self {
        let extract = |kind| {
            extract_program(bundle, anchors.for_kind(kind), kind).map_err(|e| {
                warn!("{} extraction failed for {}: {}", kind, bundle.version(), e);
                e
            })
        };

        Self {
            version: bundle.version().to_string(),
            signature: extract(TransformKind::Signature),
            n_parameter: extract(TransformKind::NParameter),
        }
    }
}

/// A compiled transform, or why there is none
pub type TransformSlot = Result<Box<dyn StringTransform>, CipherError>;

/// Compiled transforms plus the n cache of one decode pass.
///
/// Holds a V8 isolate, so it is neither `Send` nor `Sync`: build it on the
/// thread that uses it and drop it when the pass ends.
pub struct DecodeSession {
    version: String,
    signature: TransformSlot,
    n_parameter: TransformSlot,
    nsig_cache: NsigCache,
}

impl DecodeSession {
    /// Compile both programs into one shared sandbox
    pub fn compile(programs: &TransformPrograms) -> Self {
        let sandbox = Sandbox::new();
        let compile = |program: &Result<TransformProgram, CipherError>| -> TransformSlot {
            let program = program.as_ref().map_err(Clone::clone)?;
            let compiled = sandbox.compile(program).map_err(|e| {
                warn!("{} compilation failed for {}: {}", program.kind, programs.version, e);
                e
            })?;
            Ok(Box::new(compiled))
        };

        let signature = compile(&programs.signature);
        let n_parameter = compile(&programs.n_parameter);
        info!(
            "decode session for {} ready (signature: {}, n: {})",
            programs.version,
            if signature.is_ok() { "ok" } else { "unavailable" },
            if n_parameter.is_ok() { "ok" } else { "unavailable" }
        );

        Self::from_transforms(programs.version.clone(), signature, n_parameter)
    }

    /// Session over arbitrary transforms
    pub fn from_transforms(
        version: impl Into<String>,
        signature: TransformSlot,
        n_parameter: TransformSlot,
    ) -> Self {
        Self {
            version: version.into(),
            signature,
            n_parameter,
            nsig_cache: NsigCache::new(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn nsig_cache(&self) -> &NsigCache {
        &self.nsig_cache
    }

    /// Final download URL for a format.
    ///
    /// A direct URL is used as is; otherwise the signature cipher is
    /// decoded, which fails hard. The n step never fails.
    pub fn resolve_download_url(&mut self, format: &Format) -> Result<String, CipherError> {
        let base = match (format.url.as_deref(), format.signature_cipher.as_deref()) {
            (Some(url), _) if !url.is_empty() => url.to_string(),
            (_, Some(cipher)) => {
                let cipher = SignatureCipher::parse(cipher)?;
                match self.signature.as_mut() {
                    Ok(transform) => cipher.apply(&mut **transform)?,
                    Err(e) => {
                        warn!("itag {} needs a signature but none is available", format.itag);
                        return Err(e.clone());
                    }
                }
            }
            _ => return Err(CipherError::NoDownloadUrl { itag: format.itag }),
        };

        let n_transform = self.n_parameter.as_mut().ok().map(|t| &mut **t);
        let url = apply_n_transform(&base, n_transform, &mut self.nsig_cache);
        finalize_stream_url(&url, format)
    }
}

/// Add the playback parameters a stream request expects: `pot` when the
/// format carries a token and is not SABR, `cver` for known clients, and a
/// fresh `cpn`.
pub fn finalize_stream_url(url: &str, format: &Format) -> Result<String, CipherError> {
    let mut parsed = Url::parse(url).map_err(|e| CipherError::InvalidUrl(e.to_string()))?;

    if let Some(token) = format.po_token.as_deref().filter(|t| !t.is_empty()) {
        if !format.sabr {
            set_query_param(&mut parsed, "pot", token);
        }
    }
    if let Some(version) = query_param(&parsed, "c").and_then(|c| client_version(&c)) {
        set_query_param(&mut parsed, "cver", version);
    }
    set_query_param(&mut parsed, "cpn", &random_string(CPN_LENGTH));

    Ok(parsed.to_string())
}
