use anyhow::Context;
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use vkrtx_crate_tools::init_log::init_log;
use vkrtx_render::{PipelineKind, RenderContext, RenderSettings};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowId},
};

pub fn panic_handler(info: &std::panic::PanicHookInfo) {
    log::error!("{}", info);
}

pub struct WinitApp {
    kind: PipelineKind,
    settings: RenderSettings,

    /// 需要在 window 之前销毁
    render_context: Option<RenderContext>,
    window: Option<Window>,

    /// 事件循环中出现的第一个错误，循环结束后返回给 main
    error: Option<anyhow::Error>,
}
// 总的 main 函数
impl WinitApp {
    /// 整个程序的入口
    pub fn run(kind: PipelineKind) -> anyhow::Result<()> {
        Self::init_env();

        let event_loop = EventLoop::new().context("failed to create event loop")?;
        let mut app = Self {
            kind,
            settings: RenderSettings::default(),
            render_context: None,
            window: None,
            error: None,
        };

        event_loop.run_app(&mut app).context("event loop failed")?;
        log::info!("end run.");

        app.destroy()
    }

    fn init_env() {
        std::panic::set_hook(Box::new(panic_handler));

        init_log();

        tracy_client::Client::start();
        tracy_client::set_thread_name!("RenderThread");
    }
}
// new & init
impl WinitApp {
    /// 在 window 创建之后调用，初始化 RenderContext
    fn init_after_window(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let window = Self::create_window(event_loop, &self.settings)?;

        let size = window.inner_size();
        let extent = vk::Extent2D {
            width: size.width,
            height: size.height,
        };
        let render_context = RenderContext::builder()
            .pipeline(self.kind)
            .settings(self.settings.clone())
            .build(window.display_handle()?.as_raw(), window.window_handle()?.as_raw(), extent)
            .with_context(|| format!("failed to build {:?} render context", self.kind))?;

        self.render_context = Some(render_context);
        self.window = Some(window);
        Ok(())
    }

    fn create_window(event_loop: &ActiveEventLoop, settings: &RenderSettings) -> anyhow::Result<Window> {
        let window_attr = Window::default_attributes()
            .with_title(settings.app_name.clone())
            .with_resizable(false)
            .with_inner_size(winit::dpi::LogicalSize::new(
                settings.window_extent.width,
                settings.window_extent.height,
            ));

        event_loop.create_window(window_attr).context("failed to create window")
    }

    /// 记录错误并结束事件循环
    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        self.error.get_or_insert(error);
        event_loop.exit();
    }
}
// destroy
impl WinitApp {
    fn destroy(mut self) -> anyhow::Result<()> {
        if let Some(mut render_context) = self.render_context.take() {
            render_context.shutdown().context("failed to shutdown render context")?;
            log::info!("frame stats: {:?}", render_context.frame_stats());
        }
        self.window = None;

        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
// 各种 winit 的事件处理
impl ApplicationHandler for WinitApp {
    // 建议在这里创建 window 和 RenderContext
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        log::info!("winit event: resumed");
        if self.window.is_some() {
            return;
        }

        if let Err(e) = self.init_after_window(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                let Some(render_context) = self.render_context.as_mut() else {
                    return;
                };
                match render_context.draw_frame() {
                    Ok(_) => {}
                    // 超时的帧可以在下一次 redraw 时继续
                    Err(e) if e.is_timeout() => log::warn!("{}", e),
                    Err(e) => self.fail(event_loop, anyhow::Error::new(e).context("failed to draw frame")),
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        log::warn!("winit event: suspended");
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        log::info!("loop exiting");
    }
}
