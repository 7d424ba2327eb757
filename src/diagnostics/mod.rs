//! Coded runtime diagnostics.
//!
//! The scheduler never logs free-form text. Every notable event (a clamped
//! batch size, a failed kernel replacement, a slow frame-slot wait) maps to a
//! predefined [`Diagnostic`] with a stable code, written to stderr in debug
//! builds, to the `log` facade with the `log` feature, and to any
//! [`DiagnosticSink`] attached to a scheduler.
//!
//! ## Diagnostic Codes
//!
//! | Code  | Meaning                        |
//! |-------|--------------------------------|
//! | FS0xx | Configuration issues           |
//! | FS1xx | Frame recycling issues         |
//! | FS2xx | Kernel replacement issues      |
//! | FS9xx | Internal errors                |
//!
//! ## Usage
//!
//! ```rust,ignore
//! use framesync::fs_emit;
//!
//! fs_emit!(FS201);
//! fs_emit!(FS001, "requested {}, using {}", 9, 6);
//! ```

pub mod emit;
pub mod kind;
pub mod macros;

pub use emit::{
    emit, emit_with_context, is_suppressed, is_verbose, set_verbose, suppress_diagnostics, CollectingSink,
    DiagnosticSink,
};
pub use kind::{Diagnostic, DiagnosticKind};

pub use kind::{FS001, FS002, FS003, FS004, FS101, FS102, FS103, FS201, FS202, FS901};
