use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::{Arc, Barrier};
use std::thread;

use agritrain_core::{EntryId, EntryKind, KnowledgeEntry};
use agritrain_infra::knowledge::InMemoryKnowledgeBase;
use agritrain_infra::processor::QueueProcessor;
use agritrain_infra::registry::InMemoryModelRegistry;
use agritrain_infra::tasks::{InMemoryTaskStore, TaskStatus, TaskStore, TrainingTask, Transition};
use agritrain_training::{ScriptedTrainingJob, TrainingOutcome};

fn subject() -> EntryId {
    EntryId::new("bench-entry").unwrap()
}

fn store_with_pending(n: usize) -> Arc<InMemoryTaskStore> {
    let store = InMemoryTaskStore::arc();
    for _ in 0..n {
        store.insert(TrainingTask::new(subject())).unwrap();
    }
    store
}

/// Oldest-pending lookup followed by the conditional claim.
fn bench_claim_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("claim_latency");

    for queue_depth in [10usize, 1_000, 10_000] {
        group.bench_with_input(
            BenchmarkId::from_parameter(queue_depth),
            &queue_depth,
            |b, &depth| {
                b.iter_batched(
                    || store_with_pending(depth),
                    |store| {
                        let task = store.oldest_pending().unwrap().unwrap();
                        black_box(
                            store
                                .compare_and_transition(task.id, TaskStatus::Pending, Transition::claim())
                                .unwrap(),
                        );
                    },
                    BatchSize::LargeInput,
                );
            },
        );
    }

    group.finish();
}

/// N threads racing to claim the same task; exactly one wins per round.
fn bench_contended_claims(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_claims");
    group.sample_size(50);

    for claimers in [2usize, 8] {
        group.throughput(Throughput::Elements(claimers as u64));
        group.bench_with_input(BenchmarkId::from_parameter(claimers), &claimers, |b, &n| {
            b.iter_batched(
                || store_with_pending(1),
                |store| {
                    let id = store.oldest_pending().unwrap().unwrap().id;
                    let barrier = Arc::new(Barrier::new(n));
                    let handles: Vec<_> = (0..n)
                        .map(|_| {
                            let store = store.clone();
                            let barrier = barrier.clone();
                            thread::spawn(move || {
                                barrier.wait();
                                store
                                    .compare_and_transition(id, TaskStatus::Pending, Transition::claim())
                                    .is_ok()
                            })
                        })
                        .collect();
                    let winners = handles
                        .into_iter()
                        .map(|h| h.join().unwrap())
                        .filter(|won| *won)
                        .count();
                    assert_eq!(winners, 1);
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

/// Full processor run (claim, validate, scripted training, finalize, registry).
fn bench_processor_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("processor_run");

    let knowledge = Arc::new(InMemoryKnowledgeBase::new());
    for e in 0..4 {
        let refs: Vec<String> = (0..8).map(|i| format!("e{e}/{i}.jpg")).collect();
        knowledge
            .upsert(
                KnowledgeEntry::new(
                    EntryId::new(format!("entry-{e}")).unwrap(),
                    EntryKind::Variety,
                    format!("label-{e}"),
                )
                .with_images(refs),
            )
            .unwrap();
    }
    let job = Arc::new(ScriptedTrainingJob::succeeding(TrainingOutcome {
        artifact_locator: "mem://bench".to_string(),
        final_loss: 0.1,
        final_accuracy: 0.9,
        images_used: 32,
        images_missing: 0,
    }));

    group.bench_function("complete_one_task", |b| {
        b.iter_batched(
            || {
                QueueProcessor::new(
                    store_with_pending(1),
                    knowledge.clone(),
                    job.clone(),
                    InMemoryModelRegistry::new(),
                )
            },
            |processor| black_box(processor.run_once()),
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_claim_latency,
    bench_contended_claims,
    bench_processor_run
);
criterion_main!(benches);
