//! Diagnostic macros.

/// Emit a predefined diagnostic by code, optionally with formatted context.
///
/// # Example
///
/// ```rust,ignore
/// fs_emit!(FS201);
/// fs_emit!(FS001, "requested {}, using {}", requested, used);
/// ```
#[macro_export]
macro_rules! fs_emit {
    ($code:ident) => {{
        $crate::diagnostics::emit::emit(&$crate::diagnostics::$code);
    }};
    ($code:ident, $($ctx:tt)+) => {{
        $crate::diagnostics::emit::emit_with_context(
            &$crate::diagnostics::$code,
            &format!($($ctx)+),
        );
    }};
}

pub use crate::fs_emit;
