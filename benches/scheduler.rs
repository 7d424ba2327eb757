//! Benchmarks for framesync
//!
//! Host-side cost of the scheduling protocol on the simulated device.
//! Run with: cargo bench

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use framesync::{
    partition, BatchContext, CommandBuffer, CommandRecorder, DeviceError, FrameScheduler, JobGrid,
    KernelHandle, QueueMode, ResourcePool, SchedConfig, SimDevice,
};

/// Records nothing; isolates the scheduler's own overhead.
struct NoopRecorder;

impl CommandRecorder for NoopRecorder {
    fn record_frame_start(&mut self, _cmd: CommandBuffer) -> Result<(), DeviceError> {
        Ok(())
    }

    fn record_producer(
        &mut self,
        _cmd: CommandBuffer,
        _kernel: &KernelHandle,
        batch: &BatchContext<'_>,
    ) -> Result<(), DeviceError> {
        black_box(batch.slots);
        Ok(())
    }

    fn record_consumer(
        &mut self,
        _cmd: CommandBuffer,
        batch: &BatchContext<'_>,
    ) -> Result<(), DeviceError> {
        black_box(batch.jobs);
        Ok(())
    }

    fn record_frame_end(&mut self, _cmd: CommandBuffer) -> Result<(), DeviceError> {
        Ok(())
    }
}

fn bench_run_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("run_frame");
    let jobs = JobGrid::default();
    group.throughput(Throughput::Elements(64));

    for mode in [QueueMode::DualQueue, QueueMode::SingleQueue] {
        group.bench_with_input(BenchmarkId::new("mode", mode.name()), &mode, |b, &mode| {
            let device = Arc::new(SimDevice::new());
            let config = SchedConfig::default().with_mode(mode);
            let mut scheduler =
                FrameScheduler::new(device.clone(), config, KernelHandle::new(0, "sphere"))
                    .unwrap();
            let mut recorder = NoopRecorder;
            b.iter(|| {
                let report = scheduler.run_frame(&jobs, &mut recorder).unwrap();
                // Keep the simulator's log from growing across iterations.
                device.clear_submissions();
                black_box(report)
            });
        });
    }

    group.finish();
}

fn bench_batch_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_size");
    let jobs = JobGrid::default();

    for size in [1usize, 2, 6, 12] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let device = Arc::new(SimDevice::new());
            let config = SchedConfig::default().with_batch_size(size);
            let mut scheduler =
                FrameScheduler::new(device.clone(), config, KernelHandle::new(0, "sphere"))
                    .unwrap();
            let mut recorder = NoopRecorder;
            b.iter(|| {
                black_box(scheduler.run_frame(&jobs, &mut recorder).unwrap());
                device.clear_submissions();
            });
        });
    }

    group.finish();
}

fn bench_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition");

    for jobs in [64usize, 4096, 65536] {
        group.throughput(Throughput::Elements(jobs as u64));
        group.bench_with_input(BenchmarkId::from_parameter(jobs), &jobs, |b, &jobs| {
            b.iter(|| partition(black_box(jobs), 6).map(|r| r.len()).sum::<usize>());
        });
    }

    group.finish();
}

fn bench_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool");

    group.bench_function("acquire_and_mark_12", |b| {
        let mut pool = ResourcePool::new(12);
        let mut value = 0;
        b.iter(|| {
            let slots = pool.acquire_batch(6);
            let threshold = pool.wait_threshold(&slots);
            value += 1;
            pool.mark_ready(&slots, value);
            black_box(threshold)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_run_frame, bench_batch_sizes, bench_partition, bench_pool);
criterion_main!(benches);
