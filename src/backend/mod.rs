// Backend module - Vulkan bootstrap
//
// Design: Thin wrapper around ash, one module per bootstrap stage
// Ownership: later stages hold an Arc to what they were built from

pub mod capabilities;
pub mod context;
pub mod debug;
pub mod device;
pub mod error;
pub mod instance;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;

pub use context::GpuContext;
