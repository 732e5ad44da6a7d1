//! GPU adapter selection and context creation.
//!
//! A context here is a wgpu device and queue. No window or surface is
//! created; buffer allocation only needs a device.

use crate::error::GpuError;
use log::info;
use pollster::block_on;
use wgpu::{Adapter, Backend, Backends, Device, DeviceType, Instance, InstanceDescriptor, Queue};

/// Information about the GPU a context was opened on.
#[derive(Debug, Clone)]
pub struct GpuInfo {
    /// Index in the enumerated list.
    pub index: usize,
    /// GPU name (e.g., "NVIDIA GeForce RTX 4090").
    pub name: String,
    /// Vendor name (e.g., "NVIDIA").
    pub vendor: String,
    /// Graphics API backend (Vulkan, Metal, DX12, etc.).
    pub backend: Backend,
    /// Device type (discrete, integrated, virtual, etc.).
    pub device_type: DeviceType,
    /// Driver version string.
    pub driver: String,
}

impl GpuInfo {
    fn from_adapter(index: usize, adapter: &Adapter) -> Self {
        let info = adapter.get_info();
        Self {
            index,
            name: info.name,
            vendor: vendor_name(info.vendor),
            backend: info.backend,
            device_type: info.device_type,
            driver: info.driver,
        }
    }
}

impl std::fmt::Display for GpuInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {} ({:?}, {:?})",
            self.index, self.name, self.backend, self.device_type
        )
    }
}

/// An open device and queue, bound to one adapter.
pub struct GpuContext {
    device: Device,
    queue: Queue,
    info: GpuInfo,
}

impl GpuContext {
    /// Opens a context on the preferred adapter.
    ///
    /// The device is requested with the adapter's own limits so that
    /// buffers can be as large as the hardware permits.
    ///
    /// # Errors
    ///
    /// Returns `GpuError::NoAdapter` if no GPUs are available.
    /// Returns `GpuError::DeviceRequest` if device creation fails.
    pub fn open(label: &str) -> Result<Self, GpuError> {
        let (adapter, info) = select_adapter()?;
        info!("Using GPU {} from {}, driver {:?}", info, info.vendor, info.driver);

        let (device, queue) = block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some(label),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
            experimental_features: wgpu::ExperimentalFeatures::disabled(),
        }))
        .map_err(|e| GpuError::DeviceRequest(e.to_string()))?;

        Ok(Self { device, queue, info })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// Returns information about the GPU behind this context.
    pub fn info(&self) -> &GpuInfo {
        &self.info
    }

    /// Largest single buffer the device accepts.
    pub fn max_buffer_size(&self) -> u64 {
        self.device.limits().max_buffer_size
    }
}

/// Picks the preferred adapter among all backends.
///
/// # Errors
///
/// Returns `GpuError::NoAdapter` if no GPUs are available.
fn select_adapter() -> Result<(Adapter, GpuInfo), GpuError> {
    let instance = Instance::new(&InstanceDescriptor::default());
    let adapters: Vec<Adapter> = instance.enumerate_adapters(Backends::all());

    let types: Vec<DeviceType> = adapters.iter().map(|a| a.get_info().device_type).collect();
    let index = preferred_index(&types).ok_or(GpuError::NoAdapter)?;

    let adapter = adapters.into_iter().nth(index).ok_or(GpuError::NoAdapter)?;
    let info = GpuInfo::from_adapter(index, &adapter);
    Ok((adapter, info))
}

/// Index of the best device type in `types`.
///
/// Preference order:
/// 1. Discrete GPU
/// 2. Integrated GPU
/// 3. Virtual GPU
/// 4. Any other (first listed)
fn preferred_index(types: &[DeviceType]) -> Option<usize> {
    [
        DeviceType::DiscreteGpu,
        DeviceType::IntegratedGpu,
        DeviceType::VirtualGpu,
    ]
    .iter()
    .find_map(|wanted| types.iter().position(|t| t == wanted))
    .or(if types.is_empty() { None } else { Some(0) })
}

/// Convert vendor ID to human-readable name.
fn vendor_name(vendor_id: u32) -> String {
    match vendor_id {
        0x1002 => "AMD".to_string(),
        0x1010 => "ImgTec".to_string(),
        0x10DE => "NVIDIA".to_string(),
        0x13B5 => "ARM".to_string(),
        0x5143 => "Qualcomm".to_string(),
        0x8086 => "Intel".to_string(),
        0x106B => "Apple".to_string(),
        _ => format!("Unknown (0x{:04X})", vendor_id),
    }
}
