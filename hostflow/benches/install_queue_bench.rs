//! Benchmarks for the install queue and frame loop.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use hostflow::install::{EditorLoop, InstallQueue, SetupPhases, SetupSequence, InstallReport};
use hostflow::testing::ScriptedPackageClient;

struct NoPhases;

impl SetupPhases for NoPhases {
    fn configure(&mut self, _installs: &InstallReport) -> Result<(), String> {
        Ok(())
    }

    fn setup_scene(&mut self) -> Result<(), String> {
        Ok(())
    }
}

fn packages(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("com.example.package{i}@1.0.{i}")).collect()
}

fn install_queue_benchmark(c: &mut Criterion) {
    c.bench_function("queue_drain_64", |b| {
        b.iter(|| {
            let mut client = ScriptedPackageClient::new().with_polls_until_done(4);
            let mut queue = InstallQueue::new(packages(64));
            queue.start(&mut client);
            while !queue.is_drained() {
                queue.tick(&mut client);
            }
            black_box(queue.report())
        });
    });

    c.bench_function("setup_sequence_16", |b| {
        b.iter(|| {
            let mut editor = EditorLoop::new();
            SetupSequence::schedule(
                &mut editor,
                InstallQueue::new(packages(16)),
                Box::new(ScriptedPackageClient::new().with_polls_until_done(2)),
                Box::new(NoPhases),
            );
            black_box(editor.run_until_exit(10_000))
        });
    });
}

criterion_group!(benches, install_queue_benchmark);
criterion_main!(benches);
