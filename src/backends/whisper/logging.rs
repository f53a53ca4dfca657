use std::ffi::CStr;
use std::os::raw::{c_char, c_void};
use std::sync::Once;
use std::sync::atomic::{AtomicI32, Ordering};

/// Verbosity requested through `Engine::set_log_level`; silent until set.
static ENGINE_LOG_LEVEL: AtomicI32 = AtomicI32::new(i32::MIN);

// ggml_log_level
const GGML_LOG_LEVEL_INFO: u32 = 2;
const GGML_LOG_LEVEL_WARN: u32 = 3;
const GGML_LOG_LEVEL_ERROR: u32 = 4;
const GGML_LOG_LEVEL_CONT: u32 = 5;

pub(super) fn set_whisper_log_level(level: i32) {
    ENGINE_LOG_LEVEL.store(level, Ordering::Relaxed);
}

/// `< 0` silent, `0` warnings and errors, `1` adds info, `>= 2` everything.
fn should_emit(engine_level: i32, ggml_level: u32) -> bool {
    match ggml_level {
        GGML_LOG_LEVEL_ERROR | GGML_LOG_LEVEL_WARN => engine_level >= 0,
        GGML_LOG_LEVEL_INFO | GGML_LOG_LEVEL_CONT => engine_level >= 1,
        _ => engine_level >= 2,
    }
}

/// Forwards whisper.cpp log lines into `tracing` when the configured level allows it.
unsafe extern "C" fn whisper_log_callback(
    level: u32,
    c_msg: *const c_char,
    _user_data: *mut c_void,
) {
    if c_msg.is_null() || !should_emit(ENGINE_LOG_LEVEL.load(Ordering::Relaxed), level) {
        return;
    }

    let msg = unsafe { CStr::from_ptr(c_msg) }.to_string_lossy();
    let msg = msg.trim_end();
    if msg.is_empty() {
        return;
    }

    match level {
        GGML_LOG_LEVEL_ERROR => tracing::error!(target: "whisper", "{msg}"),
        GGML_LOG_LEVEL_WARN => tracing::warn!(target: "whisper", "{msg}"),
        GGML_LOG_LEVEL_INFO | GGML_LOG_LEVEL_CONT => tracing::info!(target: "whisper", "{msg}"),
        _ => tracing::debug!(target: "whisper", "{msg}"),
    }
}

/// Ensure whisper logging is routed exactly once for the lifetime of the process.
pub fn init_whisper_logging() {
    static INIT: Once = Once::new();

    INIT.call_once(|| unsafe {
        whisper_rs::set_log_callback(Some(whisper_log_callback), std::ptr::null_mut());
    });
}
