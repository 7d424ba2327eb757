//! Frame loop on the simulated device
//!
//! Runs a few frames in dual-queue mode, retunes the batch size, falls back to
//! single-queue mode, tries a broken kernel and prints the statistics.

use std::sync::Arc;

use framesync::{
    BatchContext, CommandBuffer, CommandRecorder, DeviceError, FrameScheduler, JobGrid,
    KernelCompiler, KernelError, KernelHandle, QueueMode, SchedConfig, SchedError, SimDevice,
};

/// Labels every command so the simulator's log shows what ran where.
struct LabelRecorder {
    device: Arc<SimDevice>,
}

impl CommandRecorder for LabelRecorder {
    fn record_frame_start(&mut self, cmd: CommandBuffer) -> Result<(), DeviceError> {
        self.device.cmd_marker(cmd, "clear + begin render pass");
        Ok(())
    }

    fn record_producer(
        &mut self,
        cmd: CommandBuffer,
        kernel: &KernelHandle,
        batch: &BatchContext<'_>,
    ) -> Result<(), DeviceError> {
        for (job, slot) in batch.assignments() {
            self.device.cmd_marker(
                cmd,
                format!("sample `{}` at {:?} into {}", kernel.expression(), job.offset, slot),
            );
        }
        Ok(())
    }

    fn record_consumer(
        &mut self,
        cmd: CommandBuffer,
        batch: &BatchContext<'_>,
    ) -> Result<(), DeviceError> {
        self.device
            .cmd_marker(cmd, format!("draw {} meshes", batch.jobs.len()));
        Ok(())
    }

    fn record_frame_end(&mut self, cmd: CommandBuffer) -> Result<(), DeviceError> {
        self.device.cmd_marker(cmd, "end render pass");
        Ok(())
    }
}

/// Accepts anything with balanced parentheses.
struct ParenCompiler {
    next_id: u64,
}

impl KernelCompiler for ParenCompiler {
    fn compile(&mut self, expression: &str) -> Result<KernelHandle, KernelError> {
        let mut depth = 0i32;
        for c in expression.chars() {
            match c {
                '(' => depth += 1,
                ')' => depth -= 1,
                _ => {}
            }
            if depth < 0 {
                break;
            }
        }
        if depth != 0 {
            return Err(KernelError::Syntax(format!("unbalanced parentheses in `{}`", expression)));
        }
        self.next_id += 1;
        Ok(KernelHandle::new(self.next_id, expression))
    }
}

fn main() -> Result<(), SchedError> {
    // `--verbose` prints the note and help lines of every diagnostic.
    framesync::diagnostics::set_verbose(std::env::args().any(|arg| arg == "--verbose"));

    let device = Arc::new(SimDevice::new());
    let mut scheduler =
        FrameScheduler::new(device.clone(), SchedConfig::default(), KernelHandle::new(0, "sphere"))?;
    let mut recorder = LabelRecorder {
        device: device.clone(),
    };
    let mut compiler = ParenCompiler { next_id: 0 };

    println!("framesync on the simulated device\n");

    let grid = JobGrid::default();
    println!("Dual queue, batch size {}:", scheduler.batch_size());
    for _ in 0..4 {
        let report = scheduler.run_frame(&grid, &mut recorder)?;
        println!(
            "  frame {}: {} jobs in {} batches, signals {:?}, waited: {}",
            report.frame_index, report.jobs, report.batches, report.signals, report.waited
        );
    }

    let applied = scheduler.set_batch_size(12)?;
    println!("\nBatch size now {}:", applied);
    for _ in 0..2 {
        let report = scheduler.run_frame(&grid, &mut recorder)?;
        println!(
            "  frame {}: {} batches, first slot {:?}",
            report.frame_index, report.batches, report.first_slot
        );
    }

    // Spacing rule: a single queue needs batches of at most half the pool.
    match scheduler.set_mode(QueueMode::SingleQueue) {
        Ok(()) => println!("\nSwitched to single queue"),
        Err(err) => println!("\nSingle queue refused: {}", err),
    }
    scheduler.set_batch_size(6)?;
    scheduler.set_mode(QueueMode::SingleQueue)?;
    println!("Single queue, batch size {}:", scheduler.batch_size());
    let later = grid.clone().with_time(0.5);
    for _ in 0..2 {
        let report = scheduler.run_frame(&later, &mut recorder)?;
        println!("  frame {}: {} batches", report.frame_index, report.batches);
    }

    println!("\nKernels:");
    for expression in ["sin(x) * cos(y)", "max(x, (y"] {
        let accepted = scheduler.replace_kernel(&mut compiler, expression)?;
        println!(
            "  `{}` accepted: {}, active: `{}`",
            expression,
            accepted,
            scheduler.active_kernel().expression()
        );
    }

    scheduler.set_mode(QueueMode::DualQueue)?;
    scheduler.run_frame(&grid, &mut recorder)?;

    let last = device.submissions().pop();
    if let Some(record) = last {
        println!("\nLast submission ({:?}):", record.queue);
        for op in record.flat_ops() {
            println!("  {:?}", op);
        }
    }

    println!("\n{}", scheduler.stats());
    Ok(())
}
