use criterion::{black_box, criterion_group, criterion_main, Criterion};
use hostresolver::base::priority::RequestPriority;
use hostresolver::dns::{Admission, Limits, PrioritizedDispatcher};

/// Benchmark admission and drain of a saturated dispatcher.
/// Pure in-memory bookkeeping; no jobs actually run.
fn benchmark_dispatcher(c: &mut Criterion) {
    c.bench_function("dispatcher_fill_and_drain", |b| {
        b.iter(|| {
            let mut dispatcher = PrioritizedDispatcher::new(Limits::new(6));
            for i in 0..600u32 {
                let priority = RequestPriority::ALL[i as usize % RequestPriority::ALL.len()];
                black_box(dispatcher.add(i, priority));
            }
            while let Some(job) = dispatcher.on_job_finished() {
                black_box(job);
            }
        })
    });

    // Reprioritizing a queued job keeps its age; measure the re-insert.
    c.bench_function("dispatcher_change_priority", |b| {
        let mut dispatcher = PrioritizedDispatcher::new(Limits::new(1));
        dispatcher.add(0u32, RequestPriority::Medium);
        for i in 1..200 {
            dispatcher.add(i, RequestPriority::Low);
        }
        let Admission::Queued(mut handle) = dispatcher.add(200, RequestPriority::Low) else {
            panic!("dispatcher should be full");
        };
        b.iter(|| {
            let target = if handle.priority() == RequestPriority::Low {
                RequestPriority::Highest
            } else {
                RequestPriority::Low
            };
            if let Admission::Queued(moved) = dispatcher.change_priority(handle, target) {
                handle = moved;
            }
        })
    });
}

criterion_group!(benches, benchmark_dispatcher);
criterion_main!(benches);
