//! The frame scheduler.
//!
//! Owns everything the scheduling protocol mutates (resource pool, logical
//! clock, active submission strategy, active kernel) and is called once per
//! frame. There is no global state: two schedulers on two devices are fully
//! independent.

use std::sync::Arc;

use crate::api::config::{check_spacing, clamp_batch_size, SchedConfig};
use crate::api::error::SchedError;
use crate::api::stats::{FrameReport, SchedStats};
use crate::core::batch::partition;
use crate::core::clock::{LogicalClock, TimelineValue};
use crate::core::pool::ResourcePool;
use crate::device::{Device, DeviceError};
use crate::diagnostics::{self, Diagnostic, DiagnosticSink};
use crate::sched::{
    BatchWork, DualQueueScheduler, QueueMode, SingleQueueScheduler, SubmitStrategy,
};
use crate::work::debug_view::batch_colors;
use crate::work::{
    CommandRecorder, DebugViewMode, JobDescriptor, JobSource, KernelCompiler, KernelError,
    KernelHandle,
};

/// Per-frame batch scheduler.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use framesync::{FrameScheduler, JobGrid, KernelHandle, SchedConfig, SimDevice};
/// # fn recorder() -> Box<dyn framesync::CommandRecorder> { unimplemented!() }
///
/// let device = Arc::new(SimDevice::new());
/// let mut scheduler =
///     FrameScheduler::new(device, SchedConfig::default(), KernelHandle::new(0, "sphere"))?;
/// let mut recorder = recorder();
///
/// let report = scheduler.run_frame(&JobGrid::default(), recorder.as_mut())?;
/// assert_eq!(report.batches, 11);
/// # Ok::<(), framesync::SchedError>(())
/// ```
pub struct FrameScheduler {
    device: Arc<dyn Device>,
    config: SchedConfig,
    /// Effective batch size, already clamped
    batch_size: usize,
    pool: ResourcePool,
    clock: LogicalClock,
    strategy: Box<dyn SubmitStrategy>,
    kernel: KernelHandle,
    kernel_failed: bool,
    frame_index: u64,
    stats: SchedStats,
    sink: Option<Arc<dyn DiagnosticSink>>,
}

impl FrameScheduler {
    /// Create a scheduler for `device`.
    ///
    /// Fails if the configuration is invalid or the device cannot run the
    /// requested mode.
    pub fn new(
        device: Arc<dyn Device>,
        config: SchedConfig,
        kernel: KernelHandle,
    ) -> Result<Self, SchedError> {
        config.validate()?;
        let batch_size = config.effective_batch_size();
        check_capabilities(device.as_ref(), config.mode)?;
        let strategy = make_strategy(device.clone(), &config)?;

        Ok(Self {
            pool: ResourcePool::new(config.pool_capacity),
            clock: LogicalClock::new(),
            device,
            config,
            batch_size,
            strategy,
            kernel,
            kernel_failed: false,
            frame_index: 0,
            stats: SchedStats::new(),
            sink: None,
        })
    }

    /// Forward every diagnostic this scheduler raises to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Schedule one frame.
    ///
    /// Waits for the frame slot used two frames ago, then partitions the
    /// source's jobs into batches, assigns slots and submits each batch
    /// through the active strategy.
    ///
    /// If a batch fails, the frame is closed so that everything already
    /// submitted is covered by the frame slot's marker, FS103 is reported and
    /// the error returned. The frame index does not move, so the next call
    /// runs the same frame again. Slots and clock values spent by the failed
    /// frame stay spent.
    pub fn run_frame(
        &mut self,
        source: &dyn JobSource,
        recorder: &mut dyn CommandRecorder,
    ) -> Result<FrameReport, SchedError> {
        let jobs = source.jobs();
        let frame_index = self.frame_index;
        let allocated_before = self.strategy.command_buffers_allocated();

        let waited = match self.strategy.begin_frame(frame_index) {
            Ok(waited) => waited,
            Err(err) => {
                self.report(&diagnostics::FS102, format!("frame {}: {}", frame_index, err));
                return Err(err.into());
            }
        };
        if waited {
            self.stats.frame_slot_waits += 1;
            self.notify(&diagnostics::FS101, format!("frame {}", frame_index));
        }

        let first = self.pool.cursor();
        let (batches, signals) = match self.submit_batches(&jobs, recorder) {
            Ok(done) => done,
            Err(err) => {
                let mut context = format!("frame {}: {}", frame_index, err);
                if let Err(abort) = self.strategy.abort_frame() {
                    context.push_str(&format!("; closing the frame failed: {}", abort));
                }
                self.stats.frames_abandoned += 1;
                self.stats.command_buffers_allocated +=
                    self.strategy.command_buffers_allocated() - allocated_before;
                self.report(&diagnostics::FS103, context);
                return Err(err.into());
            }
        };

        self.stats.frames += 1;
        self.stats.jobs += jobs.len() as u64;
        self.stats.command_buffers_allocated +=
            self.strategy.command_buffers_allocated() - allocated_before;
        self.frame_index += 1;

        Ok(FrameReport {
            frame_index,
            batches,
            jobs: jobs.len(),
            first_slot: (!jobs.is_empty()).then_some(first),
            signals,
            waited,
        })
    }

    /// Partition `jobs` and submit every batch, then close the frame.
    ///
    /// Returns the batch count and the first and last `ConsumerDone` values.
    fn submit_batches(
        &mut self,
        jobs: &[JobDescriptor],
        recorder: &mut dyn CommandRecorder,
    ) -> Result<(usize, Option<(TimelineValue, TimelineValue)>), DeviceError> {
        let first = self.pool.cursor();
        let capacity = self.pool.capacity();
        let mut signals: Option<(TimelineValue, TimelineValue)> = None;
        let mut batches = 0;
        for range in partition(jobs.len(), self.batch_size) {
            let slots = self.pool.acquire_batch(range.len());
            let colors = batch_colors(self.config.debug_view, range.index, &slots, first, capacity);
            let work = BatchWork {
                range: &range,
                jobs: &jobs[range.jobs.clone()],
                slots: &slots,
                debug_colors: &colors,
                kernel: &self.kernel,
            };
            let timeline =
                self.strategy
                    .submit_batch(&mut self.pool, &mut self.clock, &work, recorder)?;

            if let Some(t) = timeline {
                let first_signal = signals.map_or(t.consumer_signal, |(first, _)| first);
                signals = Some((first_signal, t.consumer_signal));
            }
            batches += 1;
            self.stats.batches += 1;
            self.stats.slots_acquired += slots.len() as u64;
        }
        self.strategy.end_frame(batches)?;
        Ok((batches, signals))
    }

    /// Switch between dual-queue and single-queue submission.
    ///
    /// Drains the device first. Switching to single-queue mode checks the
    /// `2 * batch_size <= pool_capacity` rule; switching to dual-queue mode
    /// needs a dedicated compute queue and timeline semaphores. On error the
    /// current mode stays active.
    pub fn set_mode(&mut self, mode: QueueMode) -> Result<(), SchedError> {
        if mode == self.strategy.mode() {
            return Ok(());
        }
        check_spacing(mode, self.batch_size, self.pool.capacity())?;
        check_capabilities(self.device.as_ref(), mode)?;

        self.drain(mode.name())?;
        let config = SchedConfig {
            mode,
            ..self.config.clone()
        };
        self.strategy = make_strategy(self.device.clone(), &config)?;
        self.config = config;
        self.stats.mode_switches += 1;
        Ok(())
    }

    /// Change the batch size, clamped to `[1, max_batch_size]`.
    ///
    /// Takes effect with the next frame. Returns the size actually used.
    pub fn set_batch_size(&mut self, requested: usize) -> Result<usize, SchedError> {
        let batch_size = clamp_batch_size(requested, self.config.max_batch_size);
        if batch_size != requested {
            self.report(
                &diagnostics::FS001,
                format!("requested {}, using {}", requested, batch_size),
            );
        }
        check_spacing(self.strategy.mode(), batch_size, self.pool.capacity())?;
        self.batch_size = batch_size;
        self.config.batch_size = batch_size;
        Ok(batch_size)
    }

    /// Change the debug coloring handed to the consumer recorder.
    pub fn set_debug_view(&mut self, mode: DebugViewMode) {
        self.config.debug_view = mode;
    }

    /// Replace the producer kernel.
    ///
    /// Drains the device, then compiles `expression`. If compilation fails the
    /// previous kernel stays active, [`kernel_failed`](Self::kernel_failed)
    /// becomes true and `Ok(false)` is returned. A device failure during
    /// compilation is returned as an error. Slots and clock are never touched.
    pub fn replace_kernel(
        &mut self,
        compiler: &mut dyn KernelCompiler,
        expression: &str,
    ) -> Result<bool, SchedError> {
        self.drain("kernel replacement")?;
        match compiler.compile(expression) {
            Ok(kernel) => {
                self.kernel = kernel;
                self.kernel_failed = false;
                self.stats.kernel_replacements += 1;
                Ok(true)
            }
            Err(err) => {
                self.kernel_failed = true;
                self.stats.kernel_failures += 1;
                self.report(&diagnostics::FS201, format!("`{}`: {}", expression, err));
                match err {
                    KernelError::Device(err) => Err(SchedError::Device(err)),
                    KernelError::Syntax(_) | KernelError::Compile(_) => Ok(false),
                }
            }
        }
    }

    fn drain(&self, reason: &str) -> Result<(), SchedError> {
        self.device.wait_idle()?;
        self.notify(&diagnostics::FS202, format!("for {}", reason));
        Ok(())
    }

    /// Emit globally and to the attached sink.
    fn report(&self, diag: &Diagnostic, context: String) {
        diagnostics::emit_with_context(diag, &context);
        self.notify(diag, context);
    }

    /// Attached sink only, for events too frequent for stderr.
    fn notify(&self, diag: &Diagnostic, context: String) {
        if let Some(sink) = &self.sink {
            sink.emit(diag, Some(&context));
        }
    }

    /// Resource pool.
    pub fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    /// Logical clock.
    pub fn clock(&self) -> &LogicalClock {
        &self.clock
    }

    /// Number of frames run so far (the index of the next frame).
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Active queue mode.
    pub fn mode(&self) -> QueueMode {
        self.strategy.mode()
    }

    /// Effective batch size.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Active configuration.
    pub fn config(&self) -> &SchedConfig {
        &self.config
    }

    /// Statistics.
    pub fn stats(&self) -> &SchedStats {
        &self.stats
    }

    /// Kernel the producer stage runs.
    pub fn active_kernel(&self) -> &KernelHandle {
        &self.kernel
    }

    /// Whether the last kernel replacement failed.
    pub fn kernel_failed(&self) -> bool {
        self.kernel_failed
    }

    /// The device.
    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }
}

impl std::fmt::Debug for FrameScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameScheduler")
            .field("mode", &self.strategy.mode())
            .field("batch_size", &self.batch_size)
            .field("frame_index", &self.frame_index)
            .field("upcoming", &self.clock.upcoming())
            .field("kernel", &self.kernel)
            .field("kernel_failed", &self.kernel_failed)
            .finish_non_exhaustive()
    }
}

fn check_capabilities(device: &dyn Device, mode: QueueMode) -> Result<(), SchedError> {
    if mode != QueueMode::DualQueue {
        return Ok(());
    }
    let caps = device.capabilities();
    if !caps.timeline_semaphores {
        return Err(SchedError::MissingCapability("timeline semaphores"));
    }
    if !caps.dedicated_compute_queue {
        diagnostics::emit(&diagnostics::FS003);
        return Err(SchedError::MissingCapability("a dedicated compute queue"));
    }
    Ok(())
}

fn make_strategy(
    device: Arc<dyn Device>,
    config: &SchedConfig,
) -> Result<Box<dyn SubmitStrategy>, SchedError> {
    Ok(match config.mode {
        QueueMode::DualQueue => Box::new(DualQueueScheduler::new(device, config.wait_timeout)?),
        QueueMode::SingleQueue => {
            Box::new(SingleQueueScheduler::new(device, config.wait_timeout)?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{CommandBuffer, DeviceError, SimDevice};
    use crate::diagnostics::CollectingSink;
    use crate::work::{BatchContext, JobDescriptor};

    struct NullRecorder;

    impl CommandRecorder for NullRecorder {
        fn record_frame_start(&mut self, _: CommandBuffer) -> Result<(), DeviceError> {
            Ok(())
        }
        fn record_producer(
            &mut self,
            _: CommandBuffer,
            _: &KernelHandle,
            _: &BatchContext<'_>,
        ) -> Result<(), DeviceError> {
            Ok(())
        }
        fn record_consumer(&mut self, _: CommandBuffer, _: &BatchContext<'_>) -> Result<(), DeviceError> {
            Ok(())
        }
        fn record_frame_end(&mut self, _: CommandBuffer) -> Result<(), DeviceError> {
            Ok(())
        }
    }

    /// Accepts expressions without a `!`.
    struct PickyCompiler {
        next_id: u64,
    }

    impl KernelCompiler for PickyCompiler {
        fn compile(&mut self, expression: &str) -> Result<KernelHandle, KernelError> {
            if expression.contains('!') {
                return Err(KernelError::Syntax("unexpected `!`".to_string()));
            }
            self.next_id += 1;
            Ok(KernelHandle::new(self.next_id, expression))
        }
    }

    fn jobs(n: usize) -> Vec<JobDescriptor> {
        vec![JobDescriptor::new([0.0; 3], [1.0; 3], 0.0); n]
    }

    fn scheduler(config: SchedConfig) -> FrameScheduler {
        let device = Arc::new(SimDevice::new());
        FrameScheduler::new(device, config, KernelHandle::new(0, "sphere")).unwrap()
    }

    #[test]
    fn test_frame_report() {
        let mut sched = scheduler(SchedConfig::default());
        let report = sched.run_frame(&jobs(64), &mut NullRecorder).unwrap();
        assert_eq!(report.frame_index, 0);
        assert_eq!(report.batches, 11);
        assert_eq!(report.jobs, 64);
        assert_eq!(report.first_slot.map(|s| s.index()), Some(0));
        assert_eq!(report.signals, Some((1, 11)));
        assert!(!report.waited);

        let report = sched.run_frame(&jobs(64), &mut NullRecorder).unwrap();
        // 64 jobs leave the cursor at slot 4.
        assert_eq!(report.first_slot.map(|s| s.index()), Some(4));
        assert_eq!(report.signals, Some((12, 22)));
        assert_eq!(sched.stats().frames, 2);
        assert_eq!(sched.stats().slots_acquired, 128);
    }

    #[test]
    fn test_empty_frame() {
        let mut sched = scheduler(SchedConfig::default());
        let report = sched.run_frame(&jobs(0), &mut NullRecorder).unwrap();
        assert_eq!(report.batches, 0);
        assert_eq!(report.first_slot, None);
        assert_eq!(report.signals, None);
        assert_eq!(sched.clock().upcoming(), 1);
        assert_eq!(sched.frame_index(), 1);
    }

    #[test]
    fn test_dual_queue_needs_compute_queue() {
        crate::diagnostics::suppress_diagnostics(true);
        let device = Arc::new(SimDevice::graphics_only());
        let err = FrameScheduler::new(device.clone(), SchedConfig::default(), KernelHandle::new(0, "x"))
            .unwrap_err();
        assert!(matches!(err, SchedError::MissingCapability(_)));

        let single = SchedConfig::default().with_mode(QueueMode::SingleQueue);
        let mut sched = FrameScheduler::new(device, single, KernelHandle::new(0, "x")).unwrap();
        assert!(matches!(
            sched.set_mode(QueueMode::DualQueue),
            Err(SchedError::MissingCapability(_))
        ));
        assert_eq!(sched.mode(), QueueMode::SingleQueue);
        crate::diagnostics::suppress_diagnostics(false);
    }

    #[test]
    fn test_mode_switch_round_trip() {
        let mut sched = scheduler(SchedConfig::default());
        sched.run_frame(&jobs(20), &mut NullRecorder).unwrap();
        sched.set_mode(QueueMode::SingleQueue).unwrap();
        let report = sched.run_frame(&jobs(20), &mut NullRecorder).unwrap();
        assert_eq!(report.signals, None);
        // Single-queue frames leave the clock alone.
        assert_eq!(sched.clock().upcoming(), 5);

        sched.set_mode(QueueMode::DualQueue).unwrap();
        let report = sched.run_frame(&jobs(20), &mut NullRecorder).unwrap();
        assert_eq!(report.signals, Some((5, 8)));
        assert_eq!(sched.stats().mode_switches, 2);
    }

    #[test]
    fn test_batch_size_changes() {
        crate::diagnostics::suppress_diagnostics(true);
        let sink = Arc::new(CollectingSink::new());
        let mut sched = scheduler(SchedConfig::default()).with_sink(sink.clone());
        assert_eq!(sched.set_batch_size(3).unwrap(), 3);
        assert_eq!(sched.run_frame(&jobs(7), &mut NullRecorder).unwrap().batches, 3);

        assert_eq!(sched.set_batch_size(100).unwrap(), 6);
        assert_eq!(sink.codes(), vec!["FS001"]);
        crate::diagnostics::suppress_diagnostics(false);
    }

    #[test]
    fn test_single_queue_rejects_wide_batches() {
        crate::diagnostics::suppress_diagnostics(true);
        let config = SchedConfig::default()
            .with_mode(QueueMode::SingleQueue)
            .with_max_batch_size(12)
            .with_batch_size(4);
        let mut sched = scheduler(config);
        assert!(matches!(sched.set_batch_size(7), Err(SchedError::Config(_))));
        assert_eq!(sched.batch_size(), 4);
        crate::diagnostics::suppress_diagnostics(false);
    }

    #[test]
    fn test_kernel_replacement() {
        crate::diagnostics::suppress_diagnostics(true);
        let sink = Arc::new(CollectingSink::new());
        let mut sched = scheduler(SchedConfig::default()).with_sink(sink.clone());
        let mut compiler = PickyCompiler { next_id: 0 };

        assert_eq!(sched.replace_kernel(&mut compiler, "torus"), Ok(true));
        assert_eq!(sched.active_kernel().expression(), "torus");

        assert_eq!(sched.replace_kernel(&mut compiler, "torus!"), Ok(false));
        assert!(sched.kernel_failed());
        assert_eq!(sched.active_kernel().expression(), "torus");
        assert!(sink.codes().contains(&"FS201"));

        assert_eq!(sched.replace_kernel(&mut compiler, "gyroid"), Ok(true));
        assert!(!sched.kernel_failed());
        assert_eq!(sched.stats().kernel_replacements, 2);
        assert_eq!(sched.stats().kernel_failures, 1);
        crate::diagnostics::suppress_diagnostics(false);
    }
}
