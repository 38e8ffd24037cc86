use vkrtx_render::PipelineKind;
use vkrtx_winit_app::app::WinitApp;

fn main() -> anyhow::Result<()> {
    WinitApp::run(PipelineKind::RayTracing)
}
