//! FFI bindings for Handsel
//!
//! This module provides C-compatible functions for embedding the engine
//! under other languages and runtimes. All functions use C strings
//! (null-terminated) and return allocated memory that must be freed by the
//! caller using `handsel_free_string`.
//!
//! Landmarks cross the boundary as a flat `f32` buffer of 21 points × 3
//! coordinates; timestamps are milliseconds since the Unix epoch (any
//! consistent millisecond clock works, the engine only compares them).

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::config::EngineConfig;
use crate::engine::GestureEngine;
use crate::error::EngineError;
use crate::sink::MemorySink;
use crate::types::{HandLandmarks, Landmark, LANDMARK_COUNT};
use chrono::{DateTime, Duration, Utc};

/// Expected length of the flat landmark buffer (21 points × x, y, z)
pub const LANDMARK_BUFFER_LEN: usize = LANDMARK_COUNT * 3;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn time_from_ms(t_ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + Duration::milliseconds(t_ms)
}

/// Opaque handle to a GestureEngine and its event buffer
pub struct GestureEngineHandle {
    engine: GestureEngine,
    sink: MemorySink,
}

impl GestureEngineHandle {
    fn drain_events_json(&mut self) -> *mut c_char {
        let events = self.sink.drain();
        match serde_json::to_string(&events) {
            Ok(json) => string_to_cstr(&json),
            Err(e) => {
                set_last_error(&e.to_string());
                ptr::null_mut()
            }
        }
    }
}

/// Create a new engine from a JSON configuration.
///
/// # Safety
/// - `config_json` must be a valid null-terminated C string, or NULL for
///   the default configuration. Partial documents are allowed.
/// - Returns a pointer that must be freed with `handsel_engine_free`.
/// - Returns NULL on error; call `handsel_last_error` for the message.
#[no_mangle]
pub unsafe extern "C" fn handsel_engine_new(
    config_json: *const c_char,
) -> *mut GestureEngineHandle {
    clear_last_error();

    let config = if config_json.is_null() {
        Ok(EngineConfig::default())
    } else {
        match cstr_to_string(config_json) {
            Some(s) => EngineConfig::from_json(&s),
            None => {
                set_last_error("Invalid configuration string pointer");
                return ptr::null_mut();
            }
        }
    };

    let config = match config {
        Ok(c) => c,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    match GestureEngine::new(config) {
        Ok(engine) => Box::into_raw(Box::new(GestureEngineHandle {
            engine,
            sink: MemorySink::new(),
        })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free an engine.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `handsel_engine_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn handsel_engine_free(engine: *mut GestureEngineHandle) {
    if !engine.is_null() {
        drop(Box::from_raw(engine));
    }
}

/// Feed one frame.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `handsel_engine_new`.
/// - `landmarks` must be NULL (no hand detected in the frame) or point to
///   `len` readable floats, where `len` is 63 (21 points × x, y, z).
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn handsel_engine_observe(
    engine: *mut GestureEngineHandle,
    landmarks: *const f32,
    len: usize,
    t_ms: i64,
) -> i32 {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }
    let handle = &mut *engine;

    if landmarks.is_null() {
        handle.engine.observe(None, time_from_ms(t_ms));
        return 0;
    }

    if len != LANDMARK_BUFFER_LEN {
        let e = EngineError::LandmarkError(format!(
            "{} floats, expected {}",
            len, LANDMARK_BUFFER_LEN
        ));
        set_last_error(&e.to_string());
        return -1;
    }

    let flat = std::slice::from_raw_parts(landmarks, len);
    let mut hand: HandLandmarks = [Landmark::new(0.0, 0.0); LANDMARK_COUNT];
    for (i, chunk) in flat.chunks_exact(3).enumerate() {
        hand[i] = Landmark {
            x: chunk[0],
            y: chunk[1],
            z: chunk[2],
        };
    }
    handle.engine.observe(Some(&hand), time_from_ms(t_ms));
    0
}

/// Advance the state machine one tick.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `handsel_engine_new`.
/// - Returns a newly allocated JSON array of the tick's events (possibly
///   empty) that must be freed with `handsel_free_string`.
/// - Returns NULL on error; call `handsel_last_error` for the message.
#[no_mangle]
pub unsafe extern "C" fn handsel_engine_tick(
    engine: *mut GestureEngineHandle,
    t_ms: i64,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }
    let handle = &mut *engine;

    let now = time_from_ms(t_ms);
    handle.engine.tick(now, &mut handle.sink);
    handle.drain_events_json()
}

/// Return the machine to idle, clearing selection and timers.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `handsel_engine_new`.
/// - Returns a newly allocated JSON array of the reset's events that must
///   be freed with `handsel_free_string`.
/// - Returns NULL on error; call `handsel_last_error` for the message.
#[no_mangle]
pub unsafe extern "C" fn handsel_engine_reset(engine: *mut GestureEngineHandle) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }
    let handle = &mut *engine;

    handle.engine.reset(&mut handle.sink);
    handle.drain_events_json()
}

/// Drop all detection state after the frame source stops.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `handsel_engine_new`.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn handsel_engine_halt(engine: *mut GestureEngineHandle) -> i32 {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }
    (*engine).engine.halt();
    0
}

/// Set the upstream gesture-validity flag (nonzero = valid).
///
/// # Safety
/// - `engine` must be a valid pointer returned by `handsel_engine_new`.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn handsel_engine_set_gesture_valid(
    engine: *mut GestureEngineHandle,
    valid: i32,
) -> i32 {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }
    (*engine).engine.set_gesture_valid(valid != 0);
    0
}

/// Take a status snapshot as JSON.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `handsel_engine_new`.
/// - Returns a newly allocated string that must be freed with
///   `handsel_free_string`.
/// - Returns NULL on error; call `handsel_last_error` for the message.
#[no_mangle]
pub unsafe extern "C" fn handsel_engine_status(
    engine: *mut GestureEngineHandle,
    t_ms: i64,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }
    let handle = &*engine;

    let status = handle.engine.status(time_from_ms(t_ms));
    match serde_json::to_string(&status) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a string returned by Handsel functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Handsel function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn handsel_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next Handsel call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn handsel_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the Handsel library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn handsel_version() -> *const c_char {
    // Use a static CString to avoid allocation
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
