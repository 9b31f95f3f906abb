//! Error types for the engine.
//!
//! Configuration problems are fatal at startup: the simulator refuses to
//! build. GPU acquisition and dispatch failures surface to the frame driver,
//! which may skip the frame or abort. Recoverable conditions (dropped
//! emissions, ignored writes) are logged, not returned.

use std::fmt;

/// Errors that can occur during GPU initialization.
#[derive(Debug)]
pub enum GpuError {
    /// No compatible GPU adapter found.
    NoAdapter,
    /// Failed to create GPU device.
    DeviceCreation(wgpu::RequestDeviceError),
    /// Failed to map buffer for reading.
    BufferMapping(String),
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::NoAdapter => write!(f, "No compatible GPU adapter found. Ensure your system has a GPU with Vulkan/Metal/DX12 support."),
            GpuError::DeviceCreation(e) => write!(f, "Failed to create GPU device: {}", e),
            GpuError::BufferMapping(msg) => write!(f, "Failed to map GPU buffer: {}", msg),
        }
    }
}

impl std::error::Error for GpuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpuError::DeviceCreation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<wgpu::RequestDeviceError> for GpuError {
    fn from(e: wgpu::RequestDeviceError) -> Self {
        GpuError::DeviceCreation(e)
    }
}

/// Invalid configuration detected while building a simulator.
///
/// All variants are fatal: the simulator refuses to start rather than run
/// with state it cannot honor.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Material index outside the material table.
    UnknownMaterial(i32),
    /// Grid dimension is zero or would overflow the cell index space.
    InvalidGridSize { width: u32, height: u32, depth: u32 },
    /// Rest density must be strictly positive.
    NonPositiveRestDensity(f32),
    /// More force fields enabled than the packed uniform arrays can hold.
    TooManyForceFields { enabled: usize, max: usize },
    /// Particle capacity of zero makes every emission a drop.
    ZeroCapacity,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnknownMaterial(idx) => {
                write!(f, "Unknown material index {}", idx)
            }
            ConfigError::InvalidGridSize { width, height, depth } => {
                write!(f, "Invalid grid size {}x{}x{}: each dimension must be positive and the cell count must fit in u32", width, height, depth)
            }
            ConfigError::NonPositiveRestDensity(d) => {
                write!(f, "Rest density must be positive, got {}", d)
            }
            ConfigError::TooManyForceFields { enabled, max } => {
                write!(f, "{} force fields enabled but at most {} fit in the uniform arrays", enabled, max)
            }
            ConfigError::ZeroCapacity => {
                write!(f, "Particle capacity must be at least 1")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors that can occur while driving a simulation.
#[derive(Debug)]
pub enum SimulationError {
    /// Invalid configuration at build time.
    Config(ConfigError),
    /// GPU acquisition failed.
    Gpu(GpuError),
    /// The GPU backend rejected a kernel dispatch. The frame was abandoned;
    /// no retry happens inside `update`.
    Dispatch(String),
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationError::Config(e) => write!(f, "Configuration error: {}", e),
            SimulationError::Gpu(e) => write!(f, "GPU error: {}", e),
            SimulationError::Dispatch(msg) => write!(f, "Compute dispatch failed: {}", msg),
        }
    }
}

impl std::error::Error for SimulationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimulationError::Config(e) => Some(e),
            SimulationError::Gpu(e) => Some(e),
            SimulationError::Dispatch(_) => None,
        }
    }
}

impl From<ConfigError> for SimulationError {
    fn from(e: ConfigError) -> Self {
        SimulationError::Config(e)
    }
}

impl From<GpuError> for SimulationError {
    fn from(e: GpuError) -> Self {
        SimulationError::Gpu(e)
    }
}
