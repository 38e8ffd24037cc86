//! vkrtx 的渲染层
//!
//! [`render_context::RenderContextBuilder`] 在两个维度上组合出渲染方式：
//! pipeline kind（光栅化 / MSAA 光栅化 / 光线追踪）与 geometry source。
//! 每个 swapchain image 的命令只录制一次，之后每一帧通过 `vkrtx-frame` 的帧同步协议提交。

pub mod camera;
pub mod frame_device;
pub mod geometry;
pub mod passes;
pub mod render_context;
pub mod settings;

pub use geometry::GeometrySource;
pub use render_context::{PipelineKind, RenderContext, RenderContextBuilder, RenderError};
pub use settings::{DefaultRenderSettings, RenderSettings};
