//! Error taxonomy and the single last-error slot (spec §3, §4.H, §7).
//!
//! Every fallible call in the workspace returns a typed `Result<T, WdError>`.
//! The sandbox host-call boundary (`wallpaperd-sandbox::hostapi`) cannot
//! propagate a typed error across a `wasmtime` trap, so it additionally
//! writes the message into [`ErrorSlot`] before raising the trap; the frame
//! loop prefers that message over the trap's own generic diagnostic.

use std::cell::RefCell;

/// Maximum length of a message kept in the last-error slot, matching the
/// 1024-byte bound from spec §3.
pub const ERROR_SLOT_CAPACITY: usize = 1024;

/// Error taxonomy, one variant per kind named in spec §7.
#[derive(thiserror::Error, Debug, Clone)]
pub enum WdError {
    #[error("arg-parse: {0}")]
    ArgParse(String),

    #[error("archive-open: {0}")]
    ArchiveOpen(String),
    #[error("archive-missing-entry: {0}")]
    ArchiveMissingEntry(String),
    #[error("archive-io: {0}")]
    ArchiveIo(String),

    #[error("sandbox-runtime-init: {0}")]
    SandboxRuntimeInit(String),
    #[error("module-load: {0}")]
    ModuleLoad(String),
    #[error("module-instantiate: {0}")]
    ModuleInstantiate(String),
    #[error("scene-trap: {0}")]
    SceneTrap(String),

    #[error("pass-protocol-violation: {0}")]
    PassProtocolViolation(String),
    #[error("invalid-handle: {0}")]
    InvalidHandle(String),
    #[error("wrong-handle-type: {0}")]
    WrongHandleType(String),
    #[error("invalid-enum: {0}")]
    InvalidEnum(String),

    #[error("gpu-create-failed: {0}")]
    GpuCreateFailed(String),
    #[error("shader-compile-failed: {0}")]
    ShaderCompileFailed(String),
    #[error("gpu-submit-failed: {0}")]
    GpuSubmitFailed(String),

    #[error("surface-init-failed: {0}")]
    SurfaceInitFailed(String),
    #[error("surface-configure-failed: {0}")]
    SurfaceConfigureFailed(String),

    #[error("object-manager-exhausted: {0}")]
    ObjectManagerExhausted(String),

    /// Non-fatal: the AOT cache caller is expected to catch this and fall
    /// back to loading the original module bytes (spec §4.B, §7).
    #[error("aot-compile-failed: {0}")]
    AotCompileFailed(String),
}

impl WdError {
    /// The kind name as used on the wire / in log lines, e.g. `"pass-protocol-violation"`.
    pub fn kind(&self) -> &'static str {
        match self {
            WdError::ArgParse(_) => "arg-parse",
            WdError::ArchiveOpen(_) => "archive-open",
            WdError::ArchiveMissingEntry(_) => "archive-missing-entry",
            WdError::ArchiveIo(_) => "archive-io",
            WdError::SandboxRuntimeInit(_) => "sandbox-runtime-init",
            WdError::ModuleLoad(_) => "module-load",
            WdError::ModuleInstantiate(_) => "module-instantiate",
            WdError::SceneTrap(_) => "scene-trap",
            WdError::PassProtocolViolation(_) => "pass-protocol-violation",
            WdError::InvalidHandle(_) => "invalid-handle",
            WdError::WrongHandleType(_) => "wrong-handle-type",
            WdError::InvalidEnum(_) => "invalid-enum",
            WdError::GpuCreateFailed(_) => "gpu-create-failed",
            WdError::ShaderCompileFailed(_) => "shader-compile-failed",
            WdError::GpuSubmitFailed(_) => "gpu-submit-failed",
            WdError::SurfaceInitFailed(_) => "surface-init-failed",
            WdError::SurfaceConfigureFailed(_) => "surface-configure-failed",
            WdError::ObjectManagerExhausted(_) => "object-manager-exhausted",
            WdError::AotCompileFailed(_) => "aot-compile-failed",
        }
    }

    /// `true` for the one kind spec §7 says is non-fatal to the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, WdError::AotCompileFailed(_))
    }
}

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// The single bounded last-error buffer described in spec §3 / §4.H.
///
/// Modeled as a thread-local rather than a single global: the daemon is
/// single-threaded cooperative (spec §5), so within a run this behaves
/// exactly like the C original's static buffer, while still letting tests
/// run concurrently without clobbering each other's error state.
pub struct ErrorSlot;

impl ErrorSlot {
    /// Write a message into the slot, truncating at [`ERROR_SLOT_CAPACITY`] bytes.
    pub fn set(message: impl AsRef<str>) {
        let message = message.as_ref();
        let truncated = if message.len() > ERROR_SLOT_CAPACITY {
            // Truncate on a char boundary so we never split a UTF-8 sequence.
            let mut end = ERROR_SLOT_CAPACITY;
            while !message.is_char_boundary(end) {
                end -= 1;
            }
            &message[..end]
        } else {
            message
        };
        LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(truncated.to_string()));
    }

    /// Write `err`'s display message into the slot and return `err` unchanged,
    /// for use as `.map_err(ErrorSlot::record)` at component boundaries.
    pub fn record(err: WdError) -> WdError {
        Self::set(err.to_string());
        err
    }

    pub fn is_set() -> bool {
        LAST_ERROR.with(|slot| slot.borrow().is_some())
    }

    pub fn get() -> Option<String> {
        LAST_ERROR.with(|slot| slot.borrow().clone())
    }

    /// Clear the slot. Called implicitly at the start of every top-level
    /// `init`/`update` call so a stale message from a prior, unrelated
    /// failure is never misreported (spec §3 Error Slot).
    pub fn clear() {
        LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_roundtrip() {
        ErrorSlot::clear();
        assert!(!ErrorSlot::is_set());
        ErrorSlot::set("called ow_update_buffer when no copy pass is active");
        assert!(ErrorSlot::is_set());
        assert_eq!(
            ErrorSlot::get().as_deref(),
            Some("called ow_update_buffer when no copy pass is active")
        );
    }

    #[test]
    fn truncates_to_capacity() {
        ErrorSlot::clear();
        ErrorSlot::set("x".repeat(ERROR_SLOT_CAPACITY + 200));
        let stored = ErrorSlot::get().unwrap();
        assert_eq!(stored.len(), ERROR_SLOT_CAPACITY);
    }

    #[test]
    fn clear_resets_is_set() {
        ErrorSlot::set("boom");
        ErrorSlot::clear();
        assert!(!ErrorSlot::is_set());
        assert_eq!(ErrorSlot::get(), None);
    }

    #[test]
    fn kind_names_match_wire_taxonomy() {
        assert_eq!(
            WdError::PassProtocolViolation("x".into()).kind(),
            "pass-protocol-violation"
        );
        assert!(WdError::AotCompileFailed("x".into()).is_recoverable());
        assert!(!WdError::ModuleLoad("x".into()).is_recoverable());
    }
}
