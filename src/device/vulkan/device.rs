//! `Device` implementation on top of `ash`.

use std::sync::Arc;

use ash::extensions::khr::TimelineSemaphore;
use ash::vk;
use ash::vk::Handle;

use super::convert;
use crate::core::clock::TimelineValue;
use crate::device::traits::*;
use crate::sync::mutex::Mutex;

/// A queue handed to the backend.
#[derive(Debug, Clone, Copy)]
pub struct VulkanQueue {
    /// Queue family index
    pub family: u32,
    /// Queue handle
    pub queue: vk::Queue,
}

/// Queue families suitable for the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    /// Family supporting graphics and compute
    pub graphics: Option<u32>,
    /// Compute-capable family without graphics support
    pub dedicated_compute: Option<u32>,
    /// Whether the timeline semaphore feature is supported
    pub timeline_semaphores: bool,
}

/// Find a graphics family and a dedicated compute family and check timeline
/// semaphore support, before the logical device is created.
pub fn find_queue_families(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> QueueFamilies {
    let families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    let graphics = families
        .iter()
        .position(|f| {
            f.queue_flags
                .contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
        })
        .map(|i| i as u32);
    let dedicated_compute = families
        .iter()
        .position(|f| {
            f.queue_flags.contains(vk::QueueFlags::COMPUTE)
                && !f.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        })
        .map(|i| i as u32);

    let mut timeline = vk::PhysicalDeviceTimelineSemaphoreFeatures::default();
    let mut features = vk::PhysicalDeviceFeatures2::builder().push_next(&mut timeline);
    unsafe { instance.get_physical_device_features2(physical_device, &mut features) };

    QueueFamilies {
        graphics,
        dedicated_compute,
        timeline_semaphores: timeline.timeline_semaphore == vk::TRUE,
    }
}

/// Vulkan-backed device.
///
/// The two channels are timeline semaphores created with initial value 0.
/// Queue submissions are serialized per queue, as Vulkan requires external
/// synchronization of `vkQueueSubmit`.
pub struct VulkanDevice {
    device: Arc<ash::Device>,
    timeline: TimelineSemaphore,
    graphics: Mutex<VulkanQueue>,
    compute: Option<Mutex<VulkanQueue>>,
    /// Indexed by `Channel::index`; empty when timeline semaphores are off
    semaphores: Vec<vk::Semaphore>,
    capabilities: DeviceCapabilities,
}

impl VulkanDevice {
    /// Wrap a logical device.
    ///
    /// `timeline_enabled` must be true only if the device was created with
    /// the `timelineSemaphore` feature enabled. `compute` must come from a
    /// family other than `graphics`' to count as a dedicated compute queue.
    pub fn new(
        instance: &ash::Instance,
        device: Arc<ash::Device>,
        graphics: VulkanQueue,
        compute: Option<VulkanQueue>,
        timeline_enabled: bool,
    ) -> Result<Self, DeviceError> {
        let timeline = TimelineSemaphore::new(instance, &device);
        let compute = compute.filter(|c| c.family != graphics.family);

        let mut semaphores = Vec::with_capacity(Channel::ALL.len());
        if timeline_enabled {
            for _ in Channel::ALL {
                let mut type_info = vk::SemaphoreTypeCreateInfo::builder()
                    .semaphore_type(vk::SemaphoreType::TIMELINE)
                    .initial_value(0);
                let info = vk::SemaphoreCreateInfo::builder().push_next(&mut type_info);
                match unsafe { device.create_semaphore(&info, None) } {
                    Ok(semaphore) => semaphores.push(semaphore),
                    Err(err) => {
                        for semaphore in semaphores {
                            unsafe { device.destroy_semaphore(semaphore, None) };
                        }
                        return Err(convert::device_error(err));
                    }
                }
            }
        }

        Ok(Self {
            capabilities: DeviceCapabilities {
                dedicated_compute_queue: compute.is_some(),
                timeline_semaphores: timeline_enabled,
            },
            device,
            timeline,
            graphics: Mutex::new(graphics),
            compute: compute.map(Mutex::new),
            semaphores,
        })
    }

    /// The wrapped logical device.
    pub fn raw(&self) -> &Arc<ash::Device> {
        &self.device
    }

    /// Raw command buffer behind a handle, for recorders issuing their own commands.
    pub fn raw_command_buffer(cmd: CommandBuffer) -> vk::CommandBuffer {
        vk::CommandBuffer::from_raw(cmd.0)
    }

    fn semaphore(&self, channel: Channel) -> Result<vk::Semaphore, DeviceError> {
        self.semaphores
            .get(channel.index())
            .copied()
            .ok_or_else(|| DeviceError::BackendError("timeline semaphores not enabled".to_string()))
    }

    fn queue(&self, kind: QueueKind) -> Result<&Mutex<VulkanQueue>, DeviceError> {
        match kind {
            QueueKind::Graphics => Ok(&self.graphics),
            QueueKind::Compute => self
                .compute
                .as_ref()
                .ok_or_else(|| DeviceError::SubmitRejected("no dedicated compute queue".to_string())),
        }
    }
}

impl Device for VulkanDevice {
    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn create_command_pool(&self, queue: QueueKind) -> Result<CommandPool, DeviceError> {
        let family = self.queue(queue)?.lock().family;
        let info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let pool = unsafe { self.device.create_command_pool(&info, None) }
            .map_err(convert::device_error)?;
        Ok(CommandPool(pool.as_raw()))
    }

    fn destroy_command_pool(&self, pool: CommandPool) {
        unsafe {
            self.device
                .destroy_command_pool(vk::CommandPool::from_raw(pool.0), None)
        };
    }

    fn reset_command_pool(&self, pool: CommandPool) -> Result<(), DeviceError> {
        // No RELEASE_RESOURCES flag: the buffers are recorded again next frame.
        unsafe {
            self.device.reset_command_pool(
                vk::CommandPool::from_raw(pool.0),
                vk::CommandPoolResetFlags::empty(),
            )
        }
        .map_err(convert::device_error)
    }

    fn allocate_command_buffer(&self, pool: CommandPool) -> Result<CommandBuffer, DeviceError> {
        let info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(vk::CommandPool::from_raw(pool.0))
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = unsafe { self.device.allocate_command_buffers(&info) }
            .map_err(convert::device_error)?;
        buffers
            .first()
            .map(|cmd| CommandBuffer(cmd.as_raw()))
            .ok_or(DeviceError::OutOfMemory)
    }

    fn begin_command_buffer(&self, cmd: CommandBuffer) -> Result<(), DeviceError> {
        let info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .begin_command_buffer(vk::CommandBuffer::from_raw(cmd.0), &info)
        }
        .map_err(convert::device_error)
    }

    fn end_command_buffer(&self, cmd: CommandBuffer) -> Result<(), DeviceError> {
        unsafe { self.device.end_command_buffer(vk::CommandBuffer::from_raw(cmd.0)) }
            .map_err(convert::device_error)
    }

    fn cmd_pipeline_barrier(&self, cmd: CommandBuffer, barrier: PipelineBarrier) {
        let (src, dst, memory) = convert::barrier(barrier);
        unsafe {
            self.device.cmd_pipeline_barrier(
                vk::CommandBuffer::from_raw(cmd.0),
                src,
                dst,
                vk::DependencyFlags::empty(),
                &[memory],
                &[],
                &[],
            )
        };
    }

    fn submit(&self, queue: QueueKind, submission: &Submission<'_>) -> Result<(), DeviceError> {
        let command_buffers: Vec<vk::CommandBuffer> = submission
            .command_buffers
            .iter()
            .map(|cmd| vk::CommandBuffer::from_raw(cmd.0))
            .collect();
        let wait_semaphores = submission
            .waits
            .iter()
            .map(|w| self.semaphore(w.channel))
            .collect::<Result<Vec<_>, _>>()?;
        let wait_values: Vec<u64> = submission.waits.iter().map(|w| w.value).collect();
        let wait_stages = vec![convert::wait_stage(queue); submission.waits.len()];
        let signal_semaphores = submission
            .signals
            .iter()
            .map(|s| self.semaphore(s.channel))
            .collect::<Result<Vec<_>, _>>()?;
        let signal_values: Vec<u64> = submission.signals.iter().map(|s| s.value).collect();

        // Which semaphores to wait on lives in SubmitInfo, which values in the
        // chained TimelineSemaphoreSubmitInfo.
        let mut timeline_info = vk::TimelineSemaphoreSubmitInfo::builder()
            .wait_semaphore_values(&wait_values)
            .signal_semaphore_values(&signal_values);
        let mut info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);
        if !wait_semaphores.is_empty() || !signal_semaphores.is_empty() {
            info = info.push_next(&mut timeline_info);
        }
        let fence = submission
            .fence
            .map_or(vk::Fence::null(), |f| vk::Fence::from_raw(f.0));

        let target = self.queue(queue)?.lock();
        unsafe {
            self.device
                .queue_submit(target.queue, std::slice::from_ref(&*info), fence)
        }
        .map_err(convert::device_error)
    }

    fn wait_channels(&self, waits: &[ChannelWait], timeout: Timeout) -> Result<(), DeviceError> {
        if waits.is_empty() {
            return Ok(());
        }
        let semaphores = waits
            .iter()
            .map(|w| self.semaphore(w.channel))
            .collect::<Result<Vec<_>, _>>()?;
        let values: Vec<u64> = waits.iter().map(|w| w.value).collect();
        // Default flags: wait for all, not any.
        let info = vk::SemaphoreWaitInfo::builder()
            .semaphores(&semaphores)
            .values(&values);
        unsafe { self.timeline.wait_semaphores(&info, timeout.as_nanos()) }
            .map_err(convert::device_error)
    }

    fn channel_value(&self, channel: Channel) -> Result<TimelineValue, DeviceError> {
        let semaphore = self.semaphore(channel)?;
        unsafe { self.timeline.get_semaphore_counter_value(semaphore) }
            .map_err(convert::device_error)
    }

    fn create_fence(&self, signaled: bool) -> Result<Fence, DeviceError> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo::builder().flags(flags);
        let fence =
            unsafe { self.device.create_fence(&info, None) }.map_err(convert::device_error)?;
        Ok(Fence(fence.as_raw()))
    }

    fn destroy_fence(&self, fence: Fence) {
        unsafe { self.device.destroy_fence(vk::Fence::from_raw(fence.0), None) };
    }

    fn fence_signaled(&self, fence: Fence) -> Result<bool, DeviceError> {
        unsafe { self.device.get_fence_status(vk::Fence::from_raw(fence.0)) }
            .map_err(convert::device_error)
    }

    fn wait_fence(&self, fence: Fence, timeout: Timeout) -> Result<(), DeviceError> {
        let fences = [vk::Fence::from_raw(fence.0)];
        unsafe { self.device.wait_for_fences(&fences, true, timeout.as_nanos()) }
            .map_err(convert::device_error)
    }

    fn reset_fence(&self, fence: Fence) -> Result<(), DeviceError> {
        let fences = [vk::Fence::from_raw(fence.0)];
        unsafe { self.device.reset_fences(&fences) }.map_err(convert::device_error)
    }

    fn wait_idle(&self) -> Result<(), DeviceError> {
        unsafe { self.device.device_wait_idle() }.map_err(convert::device_error)
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            // Semaphores still referenced by pending work must not be destroyed.
            let _ = self.device.device_wait_idle();
            for semaphore in self.semaphores.drain(..) {
                self.device.destroy_semaphore(semaphore, None);
            }
        }
    }
}
