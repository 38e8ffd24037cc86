//! Vulkan 的封装层
//!
//! 所有 GPU 对象都是 RAII 的：对象持有 `Rc<GfxDevice>`（或者 `Rc<GfxAllocator>`），
//! 在 drop 时销毁自己，并且保证 device 和 instance 比它们活得更久。
//! 所有可能失败的驱动调用都返回 [`error::GfxError`]。

pub mod commands;
pub mod descriptors;
pub mod error;
pub mod foundation;
pub mod gfx_core;
pub mod pipelines;
pub mod raytracing;
pub mod resources;
pub mod swapchain;

pub use error::{ErrorKind, GfxError, GfxResult};
