//! Integration tests for ingest-wasm-core.
//!
//! These tests verify the session lifecycle:
//! - WAT compilation to module
//! - Session creation with host functions registered
//! - Event binding around guest calls
//! - Fuel accounting and trap handling
//! - Pooling of real sessions

use std::collections::BTreeMap;
use std::sync::Arc;

use ingest_wasm_common::{EngineConfig, ExecutionConfig, ProcessorError, SystemHost, Value};
use ingest_wasm_core::{CompiledModule, Session, SessionFactory, SessionPool, WasmEngine};
use ingest_wasm_host::create_session_factory;

type Fields = BTreeMap<String, Value>;

const GUEST: &str = r#"
(module
  (import "elastic" "elastic_put_field" (func $put (param i32 i32 i32 i32) (result i32)))
  (import "elastic" "elastic_log" (func $log (param i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "touched")
  (data (i32.const 16) "true")
  (data (i32.const 32) "processing event")
  (global $calls (mut i32) (i32.const 0))
  (func (export "malloc") (param i32) (result i32) (i32.const 1024))
  (func (export "process") (result i32)
    (global.set $calls (i32.add (global.get $calls) (i32.const 1)))
    (drop (call $log (i32.const 1) (i32.const 32) (i32.const 16)))
    ;; every third call traps
    (if (i32.eqz (i32.rem_u (global.get $calls) (i32.const 3)))
      (then (unreachable)))
    (call $put (i32.const 0) (i32.const 7) (i32.const 16) (i32.const 4)))
)
"#;

fn factory(engine_config: &EngineConfig, execution: ExecutionConfig) -> SessionFactory<Fields> {
    let engine = WasmEngine::new(engine_config).unwrap();
    let module = CompiledModule::from_wat(engine.inner(), GUEST).unwrap();
    create_session_factory(engine, module, Arc::new(SystemHost), execution).unwrap()
}

fn default_factory() -> SessionFactory<Fields> {
    factory(&EngineConfig::default(), ExecutionConfig::default())
}

// ============================================================================
// Test: Basic Execution
// ============================================================================

#[test]
fn test_guest_process_mutates_event() {
    let mut session = default_factory().create().unwrap();
    let mut event = Fields::new();
    event.insert("id".into(), Value::from(7_i64));

    let code = session.guest_process(&mut event).unwrap();

    assert_eq!(code, 0);
    assert_eq!(event.get("touched"), Some(&Value::from(true)));
    assert_eq!(event.get("id"), Some(&Value::from(7_i64)));
}

#[test]
fn test_event_unbound_after_call() {
    let mut session = default_factory().create().unwrap();
    assert!(!session.context().has_event());

    session.guest_process(&mut Fields::new()).unwrap();

    assert!(!session.context().has_event());
}

#[test]
fn test_session_ids_are_unique() {
    let factory = default_factory();
    let first = factory.create().unwrap();
    let second = factory.create().unwrap();

    assert_ne!(first.id(), second.id());
    assert_eq!(first.id(), first.context().session_id());
}

// ============================================================================
// Test: Fuel Consumption
// ============================================================================

#[test]
fn test_fuel_is_reset_per_call() {
    let execution = ExecutionConfig {
        max_fuel: 50_000,
        ..Default::default()
    };
    let mut session = factory(&EngineConfig::default(), execution).create().unwrap();

    session.guest_process(&mut Fields::new()).unwrap();
    let after_first = session.remaining_fuel().unwrap();
    session.guest_process(&mut Fields::new()).unwrap();
    let after_second = session.remaining_fuel().unwrap();

    assert!(after_first < 50_000);
    assert_eq!(after_first, after_second);
}

#[test]
fn test_fuel_disabled() {
    let engine_config = EngineConfig {
        fuel_metering: false,
        ..Default::default()
    };
    let mut session = factory(&engine_config, ExecutionConfig::default())
        .create()
        .unwrap();

    session.guest_process(&mut Fields::new()).unwrap();

    assert!(session.remaining_fuel().is_none());
}

// ============================================================================
// Test: Trap Handling
// ============================================================================

#[test]
fn test_trap_restores_event() {
    let mut session = default_factory().create().unwrap();
    session.guest_process(&mut Fields::new()).unwrap();
    session.guest_process(&mut Fields::new()).unwrap();

    let mut event = Fields::new();
    event.insert("kept".into(), Value::from("yes"));
    let result = session.guest_process(&mut event);

    match result {
        Err(ProcessorError::InvocationFault { code, .. }) => {
            assert_eq!(code.as_deref(), Some("UnreachableCodeReached"));
        }
        other => panic!("expected invocation fault, got {other:?}"),
    }
    assert_eq!(event.get("kept"), Some(&Value::from("yes")));
    assert!(!session.context().has_event());

    // The session keeps working after a trap
    assert_eq!(session.guest_process(&mut Fields::new()).unwrap(), 0);
}

// ============================================================================
// Test: Pooling Real Sessions
// ============================================================================

#[test]
fn test_pool_reuses_session_instance() {
    let factory = Arc::new(default_factory());
    let seed = factory.create().unwrap();
    let seed_id = seed.id().to_string();
    let pool: SessionPool<Session<Fields>> = {
        let factory = Arc::clone(&factory);
        SessionPool::with_seed(seed, 2, move || factory.create())
    };

    for _ in 0..2 {
        let mut session = pool.acquire().unwrap();
        assert_eq!(session.id(), seed_id);
        session.guest_process(&mut Fields::new()).unwrap();
    }

    assert_eq!(pool.created_count(), 0);
    assert_eq!(pool.idle_count(), 1);
}
