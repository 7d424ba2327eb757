//! Mapping between backend-neutral types and Vulkan.

use ash::vk;

use crate::device::traits::{DeviceError, PipelineBarrier, QueueKind};

pub(super) fn device_error(result: vk::Result) -> DeviceError {
    match result {
        vk::Result::ERROR_DEVICE_LOST => DeviceError::DeviceLost,
        vk::Result::TIMEOUT => DeviceError::Timeout,
        vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
            DeviceError::OutOfMemory
        }
        other => DeviceError::BackendError(format!("{:?}", other)),
    }
}

/// Stages that read what the producer wrote: the geometry array is consumed
/// by indirect draws and by vertex shaders fetching it directly.
pub(super) fn consumer_read_stages() -> vk::PipelineStageFlags {
    vk::PipelineStageFlags::DRAW_INDIRECT | vk::PipelineStageFlags::VERTEX_SHADER
}

/// Stage at which a submission to `queue` waits for its timeline semaphore.
pub(super) fn wait_stage(queue: QueueKind) -> vk::PipelineStageFlags {
    match queue {
        QueueKind::Compute => vk::PipelineStageFlags::COMPUTE_SHADER,
        QueueKind::Graphics => consumer_read_stages(),
    }
}

/// Source stages, destination stages and memory barrier for `barrier`.
pub(super) fn barrier(
    barrier: PipelineBarrier,
) -> (vk::PipelineStageFlags, vk::PipelineStageFlags, vk::MemoryBarrier) {
    match barrier {
        PipelineBarrier::ProducerToConsumer => (
            vk::PipelineStageFlags::COMPUTE_SHADER,
            consumer_read_stages(),
            vk::MemoryBarrier::builder()
                .src_access_mask(vk::AccessFlags::SHADER_WRITE)
                .dst_access_mask(
                    vk::AccessFlags::INDIRECT_COMMAND_READ | vk::AccessFlags::SHADER_READ,
                )
                .build(),
        ),
        PipelineBarrier::AllStages => {
            let stages = vk::PipelineStageFlags::COMPUTE_SHADER | consumer_read_stages();
            let access = vk::AccessFlags::SHADER_WRITE
                | vk::AccessFlags::INDIRECT_COMMAND_READ
                | vk::AccessFlags::SHADER_READ;
            (
                stages,
                stages,
                vk::MemoryBarrier::builder()
                    .src_access_mask(access)
                    .dst_access_mask(access)
                    .build(),
            )
        }
    }
}
