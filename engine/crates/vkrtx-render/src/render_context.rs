use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use vkrtx_frame::{FrameError, FramePipeliner, FrameReport, FrameStats};
use vkrtx_gfx::{
    GfxError, GfxResult,
    gfx_core::{GfxCore, GfxCoreCreateInfo},
    swapchain::render_swapchain::GfxRenderSwapchain,
};

use crate::{
    camera::Camera,
    frame_device::VulkanPresenter,
    geometry::GeometrySource,
    passes::{RenderPass, raster_pass::RasterPass, rt_pass::RtPass},
    settings::RenderSettings,
};

/// 渲染方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineKind {
    #[default]
    Raster,
    RasterMsaa,
    RayTracing,
}

impl PipelineKind {
    #[inline]
    pub fn needs_ray_tracing(self) -> bool {
        self == PipelineKind::RayTracing
    }
}

/// 渲染循环中可能出现的错误
pub type RenderError = FrameError<GfxError>;

/// 初始化阶段不会出现超时，帧同步的错误都归入 GfxError
fn into_gfx_error(e: RenderError) -> GfxError {
    match e {
        FrameError::Device(e) => e,
        e => GfxError::Invariant(e.to_string()),
    }
}

/// 记录 draw_frame 的致命错误。超时可以继续，其他错误之后 device 的状态不再可信
#[derive(Debug, Default)]
struct FailureLatch {
    reason: Option<String>,
}

impl FailureLatch {
    fn check(&self) -> Result<(), RenderError> {
        match &self.reason {
            Some(reason) => Err(FrameError::Device(GfxError::Invariant(format!(
                "render context failed earlier: {reason}"
            )))),
            None => Ok(()),
        }
    }

    fn observe<T>(&mut self, result: Result<T, RenderError>) -> Result<T, RenderError> {
        match &result {
            Err(e) if !e.is_timeout() => {
                self.reason.get_or_insert_with(|| e.to_string());
            }
            _ => {}
        }
        result
    }
}

/// (pipeline kind × geometry source) 两个维度上的 RenderContext 构建器
#[derive(Debug, Clone, Default)]
pub struct RenderContextBuilder {
    kind: PipelineKind,
    geometry: GeometrySource,
    settings: RenderSettings,
    camera: Camera,
}

impl RenderContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pipeline(mut self, kind: PipelineKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn geometry(mut self, geometry: GeometrySource) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn settings(mut self, settings: RenderSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn camera(mut self, camera: Camera) -> Self {
        self.camera = camera;
        self
    }

    #[inline]
    pub fn get_settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// # param
    /// * window_extent - 窗口的物理尺寸，surface 没有给出尺寸时使用
    pub fn build(
        self,
        display_handle: RawDisplayHandle,
        window_handle: RawWindowHandle,
        window_extent: vk::Extent2D,
    ) -> GfxResult<RenderContext> {
        let _span = tracy_client::span!("RenderContextBuilder::build");

        // 在创建任何 GPU 对象之前检查几何体
        let vertices = self.geometry.vertices()?;
        log::info!(
            "build render context: {:?}, {} vertices, {} frames in flight",
            self.kind,
            vertices.len(),
            self.settings.frames_in_flight
        );

        let core = GfxCore::new(&GfxCoreCreateInfo {
            app_name: &self.settings.app_name,
            enable_validation: self.settings.enable_validation,
            ray_tracing: self.kind.needs_ray_tracing(),
            display_handle,
            window_handle,
        })?;
        let swapchain =
            GfxRenderSwapchain::new(core.device.clone(), &core.physical_device, core.surface.clone(), window_extent)?;

        let pass: Box<dyn RenderPass> = match self.kind {
            PipelineKind::Raster => Box::new(RasterPass::new(
                &core,
                &swapchain,
                &vertices,
                &self.camera,
                vk::SampleCountFlags::TYPE_1,
                self.settings.clear_color,
            )?),
            PipelineKind::RasterMsaa => {
                let samples = core.physical_device.msaa_sample_count(self.settings.msaa_samples);
                if samples.as_raw() < self.settings.msaa_samples {
                    log::warn!("msaa x{} is not supported, use {:?}", self.settings.msaa_samples, samples);
                }
                Box::new(RasterPass::new(&core, &swapchain, &vertices, &self.camera, samples, self.settings.clear_color)?)
            }
            PipelineKind::RayTracing => Box::new(RtPass::new(&core, &swapchain, &vertices, &self.camera)?),
        };

        let mut presenter = VulkanPresenter::new(
            swapchain,
            pass.as_ref(),
            core.gfx_queue.clone(),
            core.present_queue.clone(),
            core.device.clone(),
        )?;
        let pipeliner = FramePipeliner::new(&mut presenter, self.settings.frames_in_flight, self.settings.wait_timeout)
            .map_err(into_gfx_error)?;

        Ok(RenderContext {
            pipeliner: Some(pipeliner),
            last_stats: FrameStats::default(),
            failure: FailureLatch::default(),
            presenter,
            _pass: pass,
            _core: core,
            kind: self.kind,
        })
    }
}

/// 持有渲染所需的全部 GPU 对象，通过帧同步协议逐帧提交预录制的命令
///
/// 字段按照销毁顺序声明。drop 时会先等待 device idle
pub struct RenderContext {
    /// shutdown 之后为 None
    pipeliner: Option<FramePipeliner<VulkanPresenter>>,
    last_stats: FrameStats,
    failure: FailureLatch,

    presenter: VulkanPresenter,
    _pass: Box<dyn RenderPass>,
    _core: GfxCore,

    kind: PipelineKind,
}

impl RenderContext {
    pub fn builder() -> RenderContextBuilder {
        RenderContextBuilder::new()
    }

    /// 超时返回 `FrameError::Timeout`，之后再次调用会从阻塞的位置继续
    ///
    /// 出现其他错误后，之后的调用都直接返回错误，只能 shutdown
    pub fn draw_frame(&mut self) -> Result<FrameReport, RenderError> {
        self.failure.check()?;
        let Some(pipeliner) = self.pipeliner.as_mut() else {
            return Err(FrameError::Device(GfxError::Invariant("render context is already shut down".to_string())));
        };

        let report = self.failure.observe(pipeliner.draw_frame(&mut self.presenter))?;
        self.last_stats = pipeliner.stats();
        tracy_client::frame_mark();
        log::trace!("frame {} presented image {} from slot {}", report.frame_id, report.image_index, report.slot);
        Ok(report)
    }

    #[inline]
    pub fn frame_stats(&self) -> FrameStats {
        self.pipeliner.as_ref().map_or(self.last_stats, |p| p.stats())
    }

    #[inline]
    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    #[inline]
    pub fn swapchain_extent(&self) -> vk::Extent2D {
        self.presenter.swapchain().extent()
    }

    /// 等待 device idle，然后销毁帧同步对象。重复调用没有效果
    pub fn shutdown(&mut self) -> Result<(), RenderError> {
        let Some(pipeliner) = self.pipeliner.take() else {
            return Ok(());
        };
        self.last_stats = pipeliner.stats();
        pipeliner.shutdown(&mut self.presenter)?;
        log::info!("render context shutdown, stats: {:?}", self.last_stats);
        Ok(())
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("failed to shutdown render context: {}", e);
        }
        // shutdown 失败时，仍然需要在释放 GPU 对象之前等待 idle
        if let Err(e) = self.presenter.wait_device_idle() {
            log::error!("failed to wait device idle: {}", e);
        }
    }
}
