//! Sandboxed evaluation of extracted transforms.
//!
//! Only the reconstructed snippet (helper declarations plus the function
//! literal) ever runs, inside a bare V8 isolate with no extensions. The
//! snippet is wrapped in an IIFE so its declarations stay private; the only
//! global it publishes is the transform's reserved binding.

use crate::cipher::{Dependency, TransformKind};
use crate::error::CipherError;
use deno_core::{v8, FastString, JsRuntime, RuntimeOptions};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

/// A string-in, string-out transform
pub trait StringTransform {
    fn call(&mut self, input: &str) -> Result<String, CipherError>;
}

impl<F> StringTransform for F
where
    F: FnMut(&str) -> String,
{
    fn call(&mut self, input: &str) -> Result<String, CipherError> {
        Ok(self(input))
    }
}

/// Extracted transform source, ready to be compiled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformProgram {
    pub kind: TransformKind,
    /// The function literal, from `function` through its closing brace
    pub function_source: String,
    pub dependencies: Vec<Dependency>,
}

impl TransformProgram {
    /// The script that binds the transform to its reserved global
    pub fn script(&self) -> String {
        let mut script = format!("globalThis.{} = (function () {{\n", self.kind.binding());
        for dependency in &self.dependencies {
            script.push_str(&dependency.declaration());
            script.push('\n');
        }
        script.push_str("return ");
        script.push_str(&self.function_source);
        script.push_str(";\n})();");
        script
    }
}

/// One isolated V8 runtime, shared by the transforms compiled into it.
///
/// `JsRuntime` is neither `Send` nor `Sync`; a sandbox lives and dies on
/// the thread that created it.
pub struct Sandbox {
    runtime: Rc<RefCell<JsRuntime>>,
}

impl Sandbox {
    pub fn new() -> Self {
        Self {
            runtime: Rc::new(RefCell::new(JsRuntime::new(RuntimeOptions::default()))),
        }
    }

    /// Evaluate a program and capture its bound function
    pub fn compile(&self, program: &TransformProgram) -> Result<CompiledTransform, CipherError> {
        let binding = program.kind.binding();
        let mut runtime = self.runtime.borrow_mut();

        runtime
            .execute_script("<transform>", FastString::from(program.script()))
            .map_err(|e| CipherError::CompilationFailed(format!("{:#}", e)))?;

        let bound = evaluate_to_string(&mut runtime, format!("typeof globalThis.{}", binding))
            .map_err(|e| CipherError::CompilationFailed(format!("{:#}", e)))?;
        if bound != "function" {
            return Err(CipherError::CompilationFailed(format!(
                "{} evaluated to {} instead of a function",
                program.kind, bound
            )));
        }

        debug!(
            "compiled {} transform with {} dependencies",
            program.kind,
            program.dependencies.len()
        );
        Ok(CompiledTransform {
            runtime: Rc::clone(&self.runtime),
            kind: program.kind,
        })
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Callable form of a transform, valid only for the bundle version it came from
pub struct CompiledTransform {
    runtime: Rc<RefCell<JsRuntime>>,
    kind: TransformKind,
}

impl CompiledTransform {
    /// Compile into a fresh sandbox of its own
    pub fn compile(program: &TransformProgram) -> Result<Self, CipherError> {
        Sandbox::new().compile(program)
    }

    pub fn kind(&self) -> TransformKind {
        self.kind
    }
}

impl StringTransform for CompiledTransform {
    fn call(&mut self, input: &str) -> Result<String, CipherError> {
        let literal = serde_json::to_string(input)
            .map_err(|e| CipherError::InvocationFailed(e.to_string()))?;
        let code = format!("String(globalThis.{}({}))", self.kind.binding(), literal);
        let mut runtime = self.runtime.borrow_mut();
        evaluate_to_string(&mut runtime, code)
            .map_err(|e| CipherError::InvocationFailed(format!("{:#}", e)))
    }
}

fn evaluate_to_string(runtime: &mut JsRuntime, code: String) -> Result<String, anyhow::Error> {
    let value = runtime.execute_script("<call>", FastString::from(code))?;
    let scope = &mut runtime.handle_scope();
    let local = v8::Local::new(scope, value);
    Ok(local.to_rust_string_lossy(scope))
}
