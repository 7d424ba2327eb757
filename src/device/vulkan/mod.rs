//! Vulkan backend
//!
//! Only compiled with the `vulkan` feature. Wraps an `ash::Device` the
//! application created; the application keeps ownership of instance, device
//! and queues and must keep them alive for as long as the [`VulkanDevice`].

mod convert;
mod device;

pub use device::{find_queue_families, QueueFamilies, VulkanDevice, VulkanQueue};
