//! Diagnostic kinds and the predefined catalogue.

/// The severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Something is definitely wrong.
    Error,
    /// Something is probably wrong or suboptimal.
    Warning,
    /// Additional context about another diagnostic.
    Note,
    /// Actionable suggestion.
    Help,
}

impl DiagnosticKind {
    /// Display prefix for this kind.
    pub fn prefix(&self) -> &'static str {
        match self {
            DiagnosticKind::Error => "error",
            DiagnosticKind::Warning => "warning",
            DiagnosticKind::Note => "note",
            DiagnosticKind::Help => "help",
        }
    }
}

/// A diagnostic message with code, message, and optional context.
///
/// Codes follow the pattern:
/// - `FS0xx` - Configuration issues
/// - `FS1xx` - Frame recycling issues
/// - `FS2xx` - Kernel replacement issues
/// - `FS9xx` - Internal errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity level.
    pub kind: DiagnosticKind,
    /// Diagnostic code (e.g., "FS001").
    pub code: &'static str,
    /// Primary message.
    pub message: &'static str,
    /// Optional additional context.
    pub note: Option<&'static str>,
    /// Optional fix suggestion.
    pub help: Option<&'static str>,
}

impl Diagnostic {
    /// Create an error diagnostic.
    pub const fn error(code: &'static str, message: &'static str) -> Self {
        Self {
            kind: DiagnosticKind::Error,
            code,
            message,
            note: None,
            help: None,
        }
    }

    /// Create a warning diagnostic.
    pub const fn warning(code: &'static str, message: &'static str) -> Self {
        Self {
            kind: DiagnosticKind::Warning,
            code,
            message,
            note: None,
            help: None,
        }
    }

    /// Create an informational diagnostic.
    pub const fn note(code: &'static str, message: &'static str) -> Self {
        Self {
            kind: DiagnosticKind::Note,
            code,
            message,
            note: None,
            help: None,
        }
    }

    /// Add a note.
    pub const fn with_note(mut self, note: &'static str) -> Self {
        self.note = Some(note);
        self
    }

    /// Add a help message.
    pub const fn with_help(mut self, help: &'static str) -> Self {
        self.help = Some(help);
        self
    }
}

// =============================================================================
// Predefined diagnostics (FS0xx - Configuration)
// =============================================================================

/// FS001: Requested batch size outside `[1, max_batch_size]`.
pub const FS001: Diagnostic = Diagnostic::warning(
    "FS001",
    "requested batch size is out of range and was clamped"
).with_note("a batch holds between 1 and max_batch_size jobs")
 .with_help("pass a batch size within [1, max_batch_size], or raise max_batch_size in SchedConfig");

/// FS002: Job grid cell count clamped.
pub const FS002: Diagnostic = Diagnostic::warning(
    "FS002",
    "job grid cell count clamped to [0, 1024] per axis"
).with_note("reported once per process")
 .with_help("use a smaller bounding box or a coarser cell count");

/// FS003: Dedicated compute queue missing.
pub const FS003: Diagnostic = Diagnostic::error(
    "FS003",
    "dual-queue mode requested but the device has no dedicated compute queue"
).with_note("producer work needs a compute queue from a different family than graphics")
 .with_help("use QueueMode::SingleQueue on this device");

/// FS004: Single-queue spacing violated.
pub const FS004: Diagnostic = Diagnostic::error(
    "FS004",
    "single-queue mode needs 2 * batch_size <= pool_capacity"
).with_note("without semaphores, consecutive batches must not share a resource slot")
 .with_help("lower the batch size or enlarge the resource pool");

// =============================================================================
// Predefined diagnostics (FS1xx - Frame recycling)
// =============================================================================

/// FS101: Host blocked on a frame slot that was still in flight.
pub const FS101: Diagnostic = Diagnostic::note(
    "FS101",
    "host waited for the device before reusing a frame slot"
).with_note("the device is more than one frame behind the host")
 .with_help("this is expected under load; persistent waits mean the device is the bottleneck");

/// FS102: Frame slot wait failed.
pub const FS102: Diagnostic = Diagnostic::error(
    "FS102",
    "waiting for a frame slot failed"
).with_note("the device timed out or was lost while finishing an earlier frame")
 .with_help("check the device error; the scheduler does not retry");

/// FS103: Frame abandoned after a recording or submission error.
pub const FS103: Diagnostic = Diagnostic::warning(
    "FS103",
    "frame abandoned after an error"
).with_note("batches already submitted stay in flight and are waited for before their frame slot is reused")
 .with_help("the same frame can be run again once the cause is fixed");

// =============================================================================
// Predefined diagnostics (FS2xx - Kernel replacement)
// =============================================================================

/// FS201: Kernel replacement failed, previous kernel kept.
pub const FS201: Diagnostic = Diagnostic::warning(
    "FS201",
    "kernel replacement failed, keeping the previous kernel"
).with_note("the compiler rejected the new expression")
 .with_help("fix the expression and replace the kernel again; kernel_failed() stays set until then");

/// FS202: Device drained for reconfiguration.
pub const FS202: Diagnostic = Diagnostic::note(
    "FS202",
    "device drained before reconfiguration"
).with_note("mode switches and kernel replacements wait for the device to go idle");

// =============================================================================
// Predefined diagnostics (FS9xx - Internal)
// =============================================================================

/// FS901: Internal scheduler error.
pub const FS901: Diagnostic = Diagnostic::error(
    "FS901",
    "internal scheduler error"
).with_note("this indicates a bug in framesync")
 .with_help("please report this issue at the framesync repository");
