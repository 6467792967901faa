//! Event processing throughput benchmarks.
//!
//! Run with: cargo bench -p ingest-wasm-processor --bench process
//!
//! The guest copies one field to another through the host ABI, so each
//! iteration pays for a session checkout, two host calls, and a JSON
//! round trip. The parallel group drives a pool sized to the number of
//! available cores from that many threads.

use std::collections::BTreeMap;
use std::hint::black_box;
use std::sync::Arc;
use std::time::Instant;

use criterion::{Criterion, criterion_group, criterion_main};

use ingest_wasm_processor::{Processor, ProcessorConfig, SystemHost, Value};

type Fields = BTreeMap<String, Value>;

const COPY_GUEST: &str = r#"
(module
  (import "elastic" "elastic_get_field" (func $get (param i32 i32 i32 i32) (result i32)))
  (import "elastic" "elastic_put_field" (func $put (param i32 i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "message")
  (data (i32.const 16) "copy")
  ;; Each call reuses the same scratch region
  (func (export "malloc") (param i32) (result i32) (i32.const 1024))
  (func (export "process") (result i32)
    (local $status i32)
    (local.set $status
      (call $get (i32.const 0) (i32.const 7) (i32.const 100) (i32.const 104)))
    (if (i32.ne (local.get $status) (i32.const 0))
      (then (return (local.get $status))))
    (call $put
      (i32.const 16) (i32.const 4)
      (i32.load (i32.const 100)) (i32.load (i32.const 104))))
)
"#;

fn parallelism() -> usize {
    std::thread::available_parallelism().map_or(1, usize::from)
}

fn processor(max_cached_sessions: usize) -> Processor<Fields> {
    let config = ProcessorConfig::default().with_max_cached_sessions(max_cached_sessions);
    Processor::from_wat(Arc::new(SystemHost), COPY_GUEST, config).unwrap()
}

fn event() -> Fields {
    let mut event = Fields::new();
    event.insert(
        "message".into(),
        Value::from("GET /index.html HTTP/1.1 200 1043"),
    );
    event
}

/// One caller, one cached session reused for every event.
fn bench_process_serial(c: &mut Criterion) {
    let mut group = c.benchmark_group("process_serial");
    let processor = processor(parallelism());

    group.bench_function("copy_field", |b| {
        b.iter(|| {
            let mut event = event();
            processor.process(black_box(&mut event)).unwrap();
            event
        });
    });

    group.finish();
}

/// One caller per core sharing a pool sized to the core count.
fn bench_process_parallel(c: &mut Criterion) {
    let mut group = c.benchmark_group("process_parallel");
    let threads = parallelism();
    let processor = processor(threads);

    group.bench_function(format!("copy_field_{threads}_threads"), |b| {
        b.iter_custom(|iters| {
            let per_thread = iters.div_ceil(threads as u64);
            let start = Instant::now();
            std::thread::scope(|scope| {
                for _ in 0..threads {
                    scope.spawn(|| {
                        for _ in 0..per_thread {
                            let mut event = event();
                            processor.process(black_box(&mut event)).unwrap();
                        }
                    });
                }
            });
            // Wall time for all `iters` events, so the reported figure is
            // per-event cost under contention
            start.elapsed()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_process_serial, bench_process_parallel);
criterion_main!(benches);
