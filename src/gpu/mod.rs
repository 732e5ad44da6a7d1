//! GPU context and allocation.
//!
//! Uses wgpu for cross-platform support (Vulkan, Metal, DX12, GL).

pub mod allocator;
pub mod device;

pub use allocator::allocate;
pub use device::GpuContext;
