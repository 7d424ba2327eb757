//! Diagnostic emission backend.
//!
//! Handles outputting diagnostics to stderr, logs, or custom sinks.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use super::kind::{Diagnostic, DiagnosticKind};
use crate::sync::mutex::Mutex;

/// Global flag to suppress diagnostic output (for testing).
static DIAGNOSTICS_SUPPRESSED: AtomicBool = AtomicBool::new(false);

/// Global flag to enable verbose diagnostics.
static VERBOSE_DIAGNOSTICS: AtomicBool = AtomicBool::new(false);

/// Suppress all diagnostic output.
pub fn suppress_diagnostics(suppress: bool) {
    DIAGNOSTICS_SUPPRESSED.store(suppress, Ordering::Relaxed);
}

/// Enable verbose diagnostic output.
pub fn set_verbose(verbose: bool) {
    VERBOSE_DIAGNOSTICS.store(verbose, Ordering::Relaxed);
}

/// Check if notes and help are printed for every diagnostic.
pub fn is_verbose() -> bool {
    VERBOSE_DIAGNOSTICS.load(Ordering::Relaxed)
}

/// Check if diagnostics are suppressed.
pub fn is_suppressed() -> bool {
    DIAGNOSTICS_SUPPRESSED.load(Ordering::Relaxed)
}

/// Emit a diagnostic.
///
/// Writes to stderr in debug builds or with the `diagnostics` feature, and to
/// the `log` facade with the `log` feature. A no-op while suppressed.
pub fn emit(diag: &Diagnostic) {
    if is_suppressed() {
        return;
    }

    #[cfg(any(debug_assertions, feature = "diagnostics"))]
    {
        emit_to_stderr(diag, None);
    }

    #[cfg(feature = "log")]
    {
        emit_to_log(diag, None);
    }
}

/// Emit a diagnostic with additional runtime context.
pub fn emit_with_context(diag: &Diagnostic, context: &str) {
    if is_suppressed() {
        return;
    }

    #[cfg(any(debug_assertions, feature = "diagnostics"))]
    {
        emit_to_stderr(diag, Some(context));
    }

    #[cfg(feature = "log")]
    {
        emit_to_log(diag, Some(context));
    }

    #[cfg(not(any(debug_assertions, feature = "diagnostics", feature = "log")))]
    {
        let _ = context;
    }
}

#[cfg(any(debug_assertions, feature = "diagnostics"))]
fn emit_to_stderr(diag: &Diagnostic, context: Option<&str>) {
    let mut stderr = std::io::stderr().lock();
    let verbose = is_verbose();

    let _ = writeln!(
        stderr,
        "[framesync][{}] {}: {}",
        diag.code,
        diag.kind.prefix(),
        diag.message
    );

    if let Some(context) = context {
        let _ = writeln!(stderr, "  context: {}", context);
    }

    // Notes and help are only worth the noise in verbose mode or for errors.
    if verbose || diag.kind == DiagnosticKind::Error {
        if let Some(note) = diag.note {
            let _ = writeln!(stderr, "  note: {}", note);
        }
        if let Some(help) = diag.help {
            let _ = writeln!(stderr, "  help: {}", help);
        }
    }

    let _ = writeln!(stderr);
}

/// Forward a diagnostic to the `log` facade.
#[cfg(feature = "log")]
pub fn emit_to_log(diag: &Diagnostic, context: Option<&str>) {
    let context = context.unwrap_or("");
    match diag.kind {
        DiagnosticKind::Error => log::error!("[{}] {} {}", diag.code, diag.message, context),
        DiagnosticKind::Warning => log::warn!("[{}] {} {}", diag.code, diag.message, context),
        DiagnosticKind::Note | DiagnosticKind::Help => {
            log::info!("[{}] {} {}", diag.code, diag.message, context)
        }
    }

    if let Some(note) = diag.note {
        log::debug!("  note: {}", note);
    }
    if let Some(help) = diag.help {
        log::debug!("  help: {}", help);
    }
}

/// A diagnostic sink for custom output.
///
/// Attach one to a scheduler with `FrameScheduler::with_sink` to observe every
/// diagnostic that scheduler raises, independent of suppression.
pub trait DiagnosticSink: Send + Sync {
    /// Handle a diagnostic.
    fn emit(&self, diag: &Diagnostic, context: Option<&str>);
}

/// A sink that collects diagnostics.
#[derive(Default)]
pub struct CollectingSink {
    diagnostics: Mutex<Vec<(Diagnostic, Option<String>)>>,
}

impl CollectingSink {
    /// Create a new collecting sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All collected diagnostics.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.lock().iter().map(|(d, _)| d.clone()).collect()
    }

    /// All collected diagnostics with their runtime context.
    pub fn entries(&self) -> Vec<(Diagnostic, Option<String>)> {
        self.diagnostics.lock().clone()
    }

    /// Codes of the collected diagnostics, in emission order.
    pub fn codes(&self) -> Vec<&'static str> {
        self.diagnostics.lock().iter().map(|(d, _)| d.code).collect()
    }

    /// Clear collected diagnostics.
    pub fn clear(&self) {
        self.diagnostics.lock().clear();
    }

    /// Check if any errors were collected.
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .lock()
            .iter()
            .any(|(d, _)| d.kind == DiagnosticKind::Error)
    }
}

impl DiagnosticSink for CollectingSink {
    fn emit(&self, diag: &Diagnostic, context: Option<&str>) {
        self.diagnostics
            .lock()
            .push((diag.clone(), context.map(str::to_owned)));
    }
}

impl std::fmt::Debug for CollectingSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectingSink")
            .field("count", &self.diagnostics.lock().len())
            .finish()
    }
}
