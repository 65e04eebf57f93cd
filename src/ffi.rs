//! FFI bindings for Synheart Rhythm
//!
//! This module provides C-compatible functions for calling Rhythm from other languages.
//! All functions use C strings (null-terminated) and return allocated memory that
//! must be freed by the caller using `rhythm_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use chrono::{TimeZone, Utc};

use crate::config::{RhythmConfig, SegmenterConfig};
use crate::pipeline::{compute_summary_json, RhythmProcessor};
use crate::schema::SampleAdapter;
use crate::segmenter::SleepSegmenter;
use crate::types::{Chronotype, SleepAnchors, TimeOfDay};

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

// ============================================================================
// Stateless API
// ============================================================================

/// Compute a summary payload from a JSON request.
///
/// The request carries `sessions`, and optionally `anchors`, `chronotype`,
/// `now` and `config`.
///
/// # Safety
/// - `request_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `rhythm_free_string`.
/// - Returns NULL on error; call `rhythm_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn rhythm_compute_summary(request_json: *const c_char) -> *mut c_char {
    clear_last_error();

    let request = match cstr_to_string(request_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid request string pointer");
            return ptr::null_mut();
        }
    };

    match compute_summary_json(&request) {
        Ok(payload) => string_to_cstr(&payload),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Segment a JSON array of activity samples into a JSON array of sessions.
///
/// # Safety
/// - `samples_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `rhythm_free_string`.
/// - Returns NULL on error; call `rhythm_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn rhythm_segment_samples(
    samples_json: *const c_char,
    utc_offset_minutes: i32,
) -> *mut c_char {
    clear_last_error();

    let json_str = match cstr_to_string(samples_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid samples string pointer");
            return ptr::null_mut();
        }
    };

    let config = SegmenterConfig {
        utc_offset_minutes,
        ..Default::default()
    };
    if let Err(e) = config.validate() {
        set_last_error(&e.to_string());
        return ptr::null_mut();
    }

    let raw = match SampleAdapter::parse_array(&json_str) {
        Ok(raw) => raw,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };
    let sanitized = SampleAdapter::sanitize(&raw);
    let sessions = SleepSegmenter::new(config).segment(&sanitized.samples);

    match serde_json::to_string(&sessions) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateful Processor API
// ============================================================================

/// Opaque handle to a RhythmProcessor
pub struct RhythmProcessorHandle {
    processor: RhythmProcessor,
}

/// Create a new RhythmProcessor.
///
/// # Safety
/// - `config_json` may be NULL for the default configuration.
/// - Returns a pointer to a newly allocated RhythmProcessor.
/// - Must be freed with `rhythm_processor_free`.
/// - Returns NULL on error.
#[no_mangle]
pub unsafe extern "C" fn rhythm_processor_new(
    config_json: *const c_char,
) -> *mut RhythmProcessorHandle {
    clear_last_error();

    let config = if config_json.is_null() {
        RhythmConfig::default()
    } else {
        let json_str = match cstr_to_string(config_json) {
            Some(s) => s,
            None => {
                set_last_error("Invalid config string pointer");
                return ptr::null_mut();
            }
        };
        match RhythmConfig::from_json(&json_str) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    let handle = Box::new(RhythmProcessorHandle {
        processor: RhythmProcessor::new(config),
    });
    Box::into_raw(handle)
}

/// Free a RhythmProcessor.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `rhythm_processor_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn rhythm_processor_free(processor: *mut RhythmProcessorHandle) {
    if !processor.is_null() {
        drop(Box::from_raw(processor));
    }
}

/// Set the habitual wake and sleep times used by later recomputations.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `rhythm_processor_new`.
/// - `wake` and `sleep` must be valid null-terminated `HH:MM` strings.
/// - Returns 0 on success, non-zero on error; the anchors are unchanged on error.
#[no_mangle]
pub unsafe extern "C" fn rhythm_processor_set_anchors(
    processor: *mut RhythmProcessorHandle,
    wake: *const c_char,
    sleep: *const c_char,
) -> i32 {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return -1;
    }

    let handle = &mut *processor;

    let (wake, sleep) = match (cstr_to_string(wake), cstr_to_string(sleep)) {
        (Some(wake), Some(sleep)) => (wake, sleep),
        _ => {
            set_last_error("Invalid anchor string pointer");
            return -1;
        }
    };

    match (wake.parse::<TimeOfDay>(), sleep.parse::<TimeOfDay>()) {
        (Ok(wake), Ok(sleep)) => {
            handle.processor.set_anchors(SleepAnchors { wake, sleep });
            0
        }
        (Err(e), _) | (_, Err(e)) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Set the chronotype (`morning`, `evening` or `balanced`) used by later
/// recomputations.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `rhythm_processor_new`.
/// - `chronotype` must be a valid null-terminated C string.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn rhythm_processor_set_chronotype(
    processor: *mut RhythmProcessorHandle,
    chronotype: *const c_char,
) -> i32 {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return -1;
    }

    let handle = &mut *processor;

    let Some(name) = cstr_to_string(chronotype) else {
        set_last_error("Invalid chronotype string pointer");
        return -1;
    };

    match serde_json::from_value::<Chronotype>(serde_json::Value::String(name)) {
        Ok(chronotype) => {
            handle.processor.set_chronotype(chronotype);
            0
        }
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Ingest activity samples (JSON array or NDJSON) into the session history.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `rhythm_processor_new`.
/// - `samples_json` must be a valid null-terminated C string.
/// - Returns the ingestion report as a newly allocated string that must be
///   freed with `rhythm_free_string`.
/// - Returns NULL on error; call `rhythm_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn rhythm_processor_ingest_samples(
    processor: *mut RhythmProcessorHandle,
    samples_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }

    let handle = &mut *processor;

    let json_str = match cstr_to_string(samples_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid samples string pointer");
            return ptr::null_mut();
        }
    };

    let report = match handle.processor.ingest_samples(&json_str) {
        Ok(report) => report,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    match serde_json::to_string(&report) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Recompute the profile and return the summary payload.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `rhythm_processor_new`.
/// - `now_epoch_seconds` is the computation time; zero or negative means now.
/// - Returns a newly allocated string that must be freed with `rhythm_free_string`.
/// - Returns NULL on error; call `rhythm_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn rhythm_processor_recompute(
    processor: *mut RhythmProcessorHandle,
    now_epoch_seconds: i64,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }

    let handle = &mut *processor;

    let now = if now_epoch_seconds <= 0 {
        Utc::now()
    } else {
        match Utc.timestamp_opt(now_epoch_seconds, 0).single() {
            Some(now) => now,
            None => {
                set_last_error("Timestamp out of range");
                return ptr::null_mut();
            }
        }
    };

    match handle.processor.recompute_to_json(now) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Save processor state (profile and session history) to JSON.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `rhythm_processor_new`.
/// - Returns a newly allocated string that must be freed with `rhythm_free_string`.
/// - Returns NULL on error; call `rhythm_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn rhythm_processor_save_state(
    processor: *mut RhythmProcessorHandle,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }

    let handle = &*processor;

    match handle.processor.save_state() {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Load processor state from JSON.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `rhythm_processor_new`.
/// - `json` must be a valid null-terminated C string.
/// - Returns 0 on success, non-zero on error.
/// - On error, call `rhythm_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn rhythm_processor_load_state(
    processor: *mut RhythmProcessorHandle,
    json: *const c_char,
) -> i32 {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return -1;
    }

    let handle = &mut *processor;

    let json_str = match cstr_to_string(json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return -1;
        }
    };

    match handle.processor.load_state(&json_str) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Rhythm functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Rhythm function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn rhythm_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next Rhythm function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn rhythm_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the Rhythm library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn rhythm_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    /// Two nights of 5-minute samples, asleep 23:00-07:00 UTC.
    fn two_nights_json() -> CString {
        let mut samples = Vec::new();
        let start = Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap();
        for i in 0..(48 * 12) {
            let t = start + chrono::Duration::minutes(i * 5);
            let hour = chrono::Timelike::hour(&t);
            let count = if hour >= 23 || hour < 7 { 0 } else { 30 };
            samples.push(format!(
                r#"{{"timestamp":"{}","activity_count":{}}}"#,
                t.to_rfc3339(),
                count
            ));
        }
        CString::new(format!("[{}]", samples.join(","))).unwrap()
    }

    #[test]
    fn test_ffi_segment_samples() {
        let json = two_nights_json();

        unsafe {
            let result = rhythm_segment_samples(json.as_ptr(), 0);
            assert!(!result.is_null());

            let result_str = CStr::from_ptr(result).to_str().unwrap();
            let sessions: serde_json::Value = serde_json::from_str(result_str).unwrap();
            assert_eq!(sessions.as_array().unwrap().len(), 2);
            assert_eq!(sessions[0]["duration_minutes"], 480);
            assert_eq!(sessions[0]["source"], "sensor-inferred");

            rhythm_free_string(result);
        }
    }

    #[test]
    fn test_ffi_compute_summary() {
        let request = CString::new(r#"{"sessions": [], "now": "2024-01-10T12:00:00Z"}"#).unwrap();

        unsafe {
            let result = rhythm_compute_summary(request.as_ptr());
            assert!(!result.is_null());

            let result_str = CStr::from_ptr(result).to_str().unwrap();
            assert!(result_str.contains("rhythm_version"));
            assert!(result_str.contains("\"sleep_need_minutes\": 480"));

            rhythm_free_string(result);
        }
    }

    #[test]
    fn test_ffi_processor_lifecycle() {
        unsafe {
            let processor = rhythm_processor_new(ptr::null());
            assert!(!processor.is_null());

            let json = two_nights_json();
            let report = rhythm_processor_ingest_samples(processor, json.as_ptr());
            assert!(!report.is_null());
            let report_str = CStr::from_ptr(report).to_str().unwrap();
            assert!(report_str.contains("\"added\":2"));
            rhythm_free_string(report);

            let payload = rhythm_processor_recompute(processor, 1_704_974_400);
            assert!(!payload.is_null());
            rhythm_free_string(payload);

            let state = rhythm_processor_save_state(processor);
            assert!(!state.is_null());

            let processor2 = rhythm_processor_new(ptr::null());
            let load_result = rhythm_processor_load_state(processor2, state);
            assert_eq!(load_result, 0);
            assert_eq!((*processor2).processor.history().len(), 2);

            rhythm_free_string(state);
            rhythm_processor_free(processor);
            rhythm_processor_free(processor2);
        }
    }

    #[test]
    fn test_ffi_processor_anchors_and_chronotype() {
        unsafe {
            let processor = rhythm_processor_new(ptr::null());
            let json = two_nights_json();
            rhythm_free_string(rhythm_processor_ingest_samples(processor, json.as_ptr()));

            let default_payload = rhythm_processor_recompute(processor, 1_704_974_400);
            let default_curve: serde_json::Value =
                serde_json::from_str(CStr::from_ptr(default_payload).to_str().unwrap()).unwrap();
            rhythm_free_string(default_payload);

            let wake = CString::new("06:00").unwrap();
            let sleep = CString::new("22:00").unwrap();
            assert_eq!(rhythm_processor_set_anchors(processor, wake.as_ptr(), sleep.as_ptr()), 0);
            let morning = CString::new("morning").unwrap();
            assert_eq!(rhythm_processor_set_chronotype(processor, morning.as_ptr()), 0);

            let handle = &*processor;
            assert_eq!(handle.processor.anchors().wake.to_string(), "06:00");
            assert_eq!(handle.processor.anchors().sleep.to_string(), "22:00");
            assert_eq!(handle.processor.chronotype(), Chronotype::Morning);

            let payload = rhythm_processor_recompute(processor, 1_704_974_400);
            let adjusted: serde_json::Value =
                serde_json::from_str(CStr::from_ptr(payload).to_str().unwrap()).unwrap();
            rhythm_free_string(payload);
            assert_ne!(adjusted["summary"]["curve"], default_curve["summary"]["curve"]);

            let bad_time = CString::new("25:00").unwrap();
            assert_eq!(rhythm_processor_set_anchors(processor, bad_time.as_ptr(), sleep.as_ptr()), -1);
            assert!(!rhythm_last_error().is_null());
            assert_eq!((*processor).processor.anchors().wake.to_string(), "06:00");

            let bad_chronotype = CString::new("owl").unwrap();
            assert_eq!(rhythm_processor_set_chronotype(processor, bad_chronotype.as_ptr()), -1);
            assert_eq!((*processor).processor.chronotype(), Chronotype::Morning);

            rhythm_processor_free(processor);
        }
    }

    #[test]
    fn test_ffi_oversized_debt_window_is_an_error() {
        let request = CString::new(
            r#"{"sessions": [{"sleep_start": "2024-01-01T23:00:00Z", "sleep_end": "2024-01-02T07:00:00Z", "source": "sensor"}],
                "config": {"debt": {"window_days": 4000000000}}}"#,
        )
        .unwrap();
        unsafe {
            assert!(rhythm_compute_summary(request.as_ptr()).is_null());
            assert!(!rhythm_last_error().is_null());
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        unsafe {
            let invalid_json = CString::new("not json").unwrap();
            let result = rhythm_segment_samples(invalid_json.as_ptr(), 0);
            assert!(result.is_null());

            let error = rhythm_last_error();
            assert!(!error.is_null());
            let error_str = CStr::from_ptr(error).to_str().unwrap();
            assert!(!error_str.is_empty());

            let bad_config = CString::new(r#"{"need": {"min_minutes": 700}}"#).unwrap();
            assert!(rhythm_processor_new(bad_config.as_ptr()).is_null());

            let json = two_nights_json();
            assert!(rhythm_segment_samples(json.as_ptr(), 24 * 60).is_null());
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = rhythm_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert!(!version_str.is_empty());
        }
    }
}
