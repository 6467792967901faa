//! Host ABI tests against WAT guests.
//!
//! Each guest's `process` export calls one or more host functions with fixed
//! arguments and returns a status code, so the status the host handed back is
//! observable as the session's return value.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;

use ingest_wasm_common::{EngineConfig, ExecutionConfig, Host, Status, Value};
use ingest_wasm_core::{CompiledModule, Session, WasmEngine};
use ingest_wasm_host::create_session_factory;

type Fields = BTreeMap<String, Value>;

const NOW: i64 = 1_700_000_000_123_456_789;

struct FixedClock;

impl Host for FixedClock {
    fn current_time_nanos(&self) -> i64 {
        NOW
    }
}

const PRELUDE: &str = r#"
(module
  (import "elastic" "elastic_get_field" (func $get (param i32 i32 i32 i32) (result i32)))
  (import "elastic" "elastic_put_field" (func $put (param i32 i32 i32 i32) (result i32)))
  (import "elastic" "elastic_log" (func $log (param i32 i32 i32) (result i32)))
  (import "elastic" "elastic_get_current_time_nanoseconds" (func $now (param i32) (result i32)))
  (memory (export "memory") 1)
"#;

/// Bump allocator starting at 4096.
const BUMP_MALLOC: &str = r#"
  (global $heap (mut i32) (i32.const 4096))
  (func (export "malloc") (param $size i32) (result i32)
    (local $ptr i32)
    (local.set $ptr (global.get $heap))
    (global.set $heap (i32.add (global.get $heap) (local.get $size)))
    (local.get $ptr))
"#;

/// Allocator that traps if the host ever calls it.
const TRAPPING_MALLOC: &str = r#"
  (func (export "malloc") (param i32) (result i32) (unreachable))
"#;

fn session(body: &str) -> Session<Fields> {
    let wat = [PRELUDE, body, ")"].concat();
    let engine = WasmEngine::new(&EngineConfig::default()).unwrap();
    let module = CompiledModule::from_wat(engine.inner(), &wat).unwrap();
    let factory = create_session_factory(
        engine,
        module,
        Arc::new(FixedClock),
        ExecutionConfig::default(),
    )
    .unwrap();
    factory.create().unwrap()
}

fn fields(value: serde_json::Value) -> Fields {
    match Value::from(value) {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other:?}"),
    }
}

fn status(code: i32) -> Status {
    Status::from_code(code).unwrap()
}

// ============================================================================
// get_field
// ============================================================================

#[test]
fn test_get_field_copies_value_through_guest_memory() {
    // Read "user", then write the returned bytes back as "copy"
    let mut session = session(
        &[
            BUMP_MALLOC,
            r#"
  (data (i32.const 0) "user")
  (data (i32.const 16) "copy")
  (func (export "process") (result i32)
    (local $status i32)
    (local.set $status (call $get (i32.const 0) (i32.const 4) (i32.const 100) (i32.const 104)))
    (if (i32.ne (local.get $status) (i32.const 0))
      (then (return (local.get $status))))
    (call $put
      (i32.const 16) (i32.const 4)
      (i32.load (i32.const 100)) (i32.load (i32.const 104))))
"#,
        ]
        .concat(),
    );
    let mut event = fields(json!({
        "user": {"name": "ada", "roles": ["admin", "ops"], "age": 36, "active": true, "manager": null}
    }));

    let code = session.guest_process(&mut event).unwrap();

    assert_eq!(status(code), Status::Ok);
    assert_eq!(event["copy"], event["user"]);
}

#[test]
fn test_get_field_missing_does_not_allocate() {
    let mut session = session(
        &[
            TRAPPING_MALLOC,
            r#"
  (data (i32.const 0) "absent")
  (func (export "process") (result i32)
    (call $get (i32.const 0) (i32.const 6) (i32.const 100) (i32.const 104)))
"#,
        ]
        .concat(),
    );
    let mut event = fields(json!({"present": 1}));

    let code = session.guest_process(&mut event).unwrap();

    assert_eq!(status(code), Status::NotFound);
}

#[test]
fn test_get_field_key_out_of_bounds() {
    let mut session = session(
        &[
            TRAPPING_MALLOC,
            r#"
  (func (export "process") (result i32)
    (call $get (i32.const 65530) (i32.const 10) (i32.const 100) (i32.const 104)))
"#,
        ]
        .concat(),
    );
    let mut event = Fields::new();

    let code = session.guest_process(&mut event).unwrap();

    assert_eq!(status(code), Status::InvalidArgument);
}

#[test]
fn test_get_field_bad_out_pointer_checked_before_malloc() {
    // A trapping allocator would turn the result into InternalFailure
    let mut session = session(
        &[
            TRAPPING_MALLOC,
            r#"
  (data (i32.const 0) "user")
  (func (export "process") (result i32)
    (call $get (i32.const 0) (i32.const 4) (i32.const 100) (i32.const 65534)))
"#,
        ]
        .concat(),
    );
    let mut event = fields(json!({"user": "ada"}));

    let code = session.guest_process(&mut event).unwrap();

    assert_eq!(status(code), Status::InvalidArgument);
}

#[test]
fn test_get_field_allocator_out_of_bounds_is_internal_failure() {
    let mut session = session(
        r#"
  (data (i32.const 0) "user")
  (func (export "malloc") (param i32) (result i32) (i32.const 70000))
  (func (export "process") (result i32)
    (call $get (i32.const 0) (i32.const 4) (i32.const 100) (i32.const 104)))
"#,
    );
    let mut event = fields(json!({"user": "ada"}));

    let code = session.guest_process(&mut event).unwrap();

    assert_eq!(status(code), Status::InternalFailure);
}

#[test]
fn test_get_field_invalid_utf8_key() {
    let mut session = session(
        &[
            TRAPPING_MALLOC,
            r#"
  (data (i32.const 0) "\ff\fe")
  (func (export "process") (result i32)
    (call $get (i32.const 0) (i32.const 2) (i32.const 100) (i32.const 104)))
"#,
        ]
        .concat(),
    );
    let mut event = Fields::new();

    let code = session.guest_process(&mut event).unwrap();

    assert_eq!(status(code), Status::InvalidArgument);
}

// ============================================================================
// put_field
// ============================================================================

#[test]
fn test_put_field_decodes_json() {
    let mut session = session(
        &[
            TRAPPING_MALLOC,
            r#"
  (data (i32.const 0) "tags")
  (data (i32.const 16) "[\"a\",1,2.5,false,null,{\"k\":\"v\"}]")
  (func (export "process") (result i32)
    (call $put (i32.const 0) (i32.const 4) (i32.const 16) (i32.const 32)))
"#,
        ]
        .concat(),
    );
    let mut event = Fields::new();

    let code = session.guest_process(&mut event).unwrap();

    assert_eq!(status(code), Status::Ok);
    assert_eq!(
        event["tags"],
        Value::from(json!(["a", 1, 2.5, false, null, {"k": "v"}]))
    );
}

#[test]
fn test_put_field_replaces_existing_value() {
    let mut session = session(
        &[
            TRAPPING_MALLOC,
            r#"
  (data (i32.const 0) "count")
  (data (i32.const 16) "42")
  (func (export "process") (result i32)
    (call $put (i32.const 0) (i32.const 5) (i32.const 16) (i32.const 2)))
"#,
        ]
        .concat(),
    );
    let mut event = fields(json!({"count": "old", "other": true}));

    session.guest_process(&mut event).unwrap();

    assert_eq!(event, fields(json!({"count": 42, "other": true})));
}

#[test]
fn test_put_field_invalid_json_leaves_event_unchanged() {
    let mut session = session(
        &[
            TRAPPING_MALLOC,
            r#"
  (data (i32.const 0) "key")
  (data (i32.const 16) "{not json")
  (func (export "process") (result i32)
    (call $put (i32.const 0) (i32.const 3) (i32.const 16) (i32.const 9)))
"#,
        ]
        .concat(),
    );
    let mut event = fields(json!({"key": 1}));

    let code = session.guest_process(&mut event).unwrap();

    assert_eq!(status(code), Status::InvalidArgument);
    assert_eq!(event, fields(json!({"key": 1})));
}

#[test]
fn test_put_field_out_of_bounds() {
    let mut session = session(
        &[
            TRAPPING_MALLOC,
            r#"
  (data (i32.const 0) "key")
  (func (export "process") (result i32)
    (i32.or
      ;; value range runs past the end of memory
      (i32.ne (call $put (i32.const 0) (i32.const 3) (i32.const 65535) (i32.const 2)) (i32.const 2))
      ;; length -1 is 0xffffffff as an unsigned wasm32 length
      (i32.ne (call $put (i32.const 0) (i32.const -1) (i32.const 16) (i32.const 1)) (i32.const 2))))
"#,
        ]
        .concat(),
    );
    let mut event = Fields::new();

    let code = session.guest_process(&mut event).unwrap();

    assert_eq!(code, 0, "both calls must return InvalidArgument");
    assert!(event.is_empty());
}

#[test]
fn test_put_then_get_sees_bound_event() {
    let mut session = session(
        &[
            BUMP_MALLOC,
            r#"
  (data (i32.const 0) "x")
  (data (i32.const 16) "7")
  (func (export "process") (result i32)
    (drop (call $put (i32.const 0) (i32.const 1) (i32.const 16) (i32.const 1)))
    (call $get (i32.const 0) (i32.const 1) (i32.const 100) (i32.const 104)))
"#,
        ]
        .concat(),
    );
    let mut event = Fields::new();

    let code = session.guest_process(&mut event).unwrap();

    assert_eq!(status(code), Status::Ok);
    assert_eq!(event["x"], Value::from(7_i64));
}

// ============================================================================
// log
// ============================================================================

#[test]
fn test_log_always_ok() {
    let mut session = session(
        &[
            TRAPPING_MALLOC,
            r#"
  (data (i32.const 0) "hello from guest")
  (data (i32.const 32) "\ff\fe")
  (func (export "process") (result i32)
    (i32.or
      (i32.or
        (call $log (i32.const 2) (i32.const 0) (i32.const 16))
        ;; invalid UTF-8 is decoded lossily
        (call $log (i32.const 4) (i32.const 32) (i32.const 2)))
      (i32.or
        ;; out of bounds
        (call $log (i32.const 0) (i32.const 65530) (i32.const 100))
        ;; unknown level
        (call $log (i32.const 42) (i32.const 0) (i32.const 5)))))
"#,
        ]
        .concat(),
    );
    let mut event = Fields::new();

    let code = session.guest_process(&mut event).unwrap();

    assert_eq!(status(code), Status::Ok);
}

// ============================================================================
// get_current_time_nanoseconds
// ============================================================================

#[test]
fn test_time_comes_from_host_clock() {
    let mut session = session(
        &[
            TRAPPING_MALLOC,
            r#"
  (func (export "process") (result i32)
    (local $status i32)
    (local.set $status (call $now (i32.const 200)))
    (if (i32.ne (local.get $status) (i32.const 0))
      (then (return (local.get $status))))
    (if (i64.ne (i64.load (i32.const 200)) (i64.const 1700000000123456789))
      (then (return (i32.const 99))))
    (i32.const 0))
"#,
        ]
        .concat(),
    );
    let mut event = Fields::new();

    let code = session.guest_process(&mut event).unwrap();

    assert_eq!(code, 0);
}

#[test]
fn test_time_out_of_bounds() {
    let mut session = session(
        &[
            TRAPPING_MALLOC,
            r#"
  (func (export "process") (result i32)
    (call $now (i32.const 65532)))
"#,
        ]
        .concat(),
    );
    let mut event = Fields::new();

    let code = session.guest_process(&mut event).unwrap();

    assert_eq!(status(code), Status::InvalidArgument);
}

// ============================================================================
// Outside of process
// ============================================================================

#[test]
fn test_field_access_during_instantiation_is_internal_failure() {
    // The start function runs before exports are resolved and before any
    // event is bound; it traps unless the host reported InternalFailure
    let mut session = session(
        &[
            TRAPPING_MALLOC,
            r#"
  (data (i32.const 0) "user")
  (func $init
    (if (i32.ne (call $get (i32.const 0) (i32.const 4) (i32.const 100) (i32.const 104)) (i32.const 1))
      (then (unreachable))))
  (start $init)
  (func (export "process") (result i32) (i32.const 0))
"#,
        ]
        .concat(),
    );
    let mut event = Fields::new();

    assert_eq!(session.guest_process(&mut event).unwrap(), 0);
}
