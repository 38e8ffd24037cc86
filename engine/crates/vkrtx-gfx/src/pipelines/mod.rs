pub mod graphics_pipeline;
pub mod pipeline_layout;
pub mod rt_pipeline;
pub mod shader;
