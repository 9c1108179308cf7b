use crate::config::WindowConfig;
use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Fullscreen, Window};

use super::DEPTH_FORMAT;

const DEFAULT_PRESENT_MODES: [wgpu::PresentMode; 1] = [wgpu::PresentMode::Fifo];
/// Backends the offscreen device may use; the GL fallback cannot copy cubemap layers to buffers.
pub const HEADLESS_BACKENDS: wgpu::Backends = wgpu::Backends::PRIMARY;

#[derive(Debug)]
pub struct SurfaceFrame {
    view: wgpu::TextureView,
    surface: wgpu::SurfaceTexture,
}

impl SurfaceFrame {
    fn new(surface: wgpu::SurfaceTexture) -> Self {
        let view = surface.texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { view, surface }
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn present(self) {
        self.surface.present();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SurfaceErrorAction {
    Reconfigure,
    Retry,
    OutOfMemory,
    Unknown,
}

/// Window, swapchain and the device every IBL pass records into.
pub struct WindowSurface {
    surface: Option<wgpu::Surface<'static>>,
    device: Option<wgpu::Device>,
    queue: Option<wgpu::Queue>,
    config: Option<wgpu::SurfaceConfiguration>,
    size: PhysicalSize<u32>,
    window: Option<Arc<Window>>,
    title: String,
    vsync: bool,
    fullscreen: bool,
    depth_texture: Option<wgpu::Texture>,
    depth_view: Option<wgpu::TextureView>,
}

impl WindowSurface {
    pub fn new(window_cfg: &WindowConfig) -> Self {
        Self {
            surface: None,
            device: None,
            queue: None,
            config: None,
            size: PhysicalSize::new(window_cfg.width, window_cfg.height),
            window: None,
            title: window_cfg.title.clone(),
            vsync: window_cfg.vsync,
            fullscreen: window_cfg.fullscreen,
            depth_texture: None,
            depth_view: None,
        }
    }

    pub fn ensure_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        if self.window.is_some() {
            return Ok(());
        }
        let mut attrs =
            Window::default_attributes().with_title(self.title.clone()).with_inner_size(self.size);
        if self.fullscreen {
            attrs = attrs.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }
        let window = Arc::new(event_loop.create_window(attrs).context("Failed to create window")?);
        pollster::block_on(self.init_wgpu(&window))?;
        let actual = window.inner_size();
        if actual.width > 0 && actual.height > 0 && actual != self.size {
            self.resize(actual);
        }
        self.window = Some(window);
        Ok(())
    }

    pub fn device(&self) -> Result<&wgpu::Device> {
        self.device.as_ref().context("GPU device not initialized")
    }

    pub fn queue(&self) -> Result<&wgpu::Queue> {
        self.queue.as_ref().context("GPU queue not initialized")
    }

    pub fn depth_view(&self) -> Result<&wgpu::TextureView> {
        self.depth_view.as_ref().context("Depth texture missing")
    }

    pub fn surface_format(&self) -> Result<wgpu::TextureFormat> {
        Ok(self.config.as_ref().context("Surface configuration missing")?.format)
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn window(&self) -> Option<&Window> {
        self.window.as_deref()
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.size = new_size;
        if new_size.width > 0 && new_size.height > 0 {
            if let Some(config) = self.config.as_mut() {
                config.width = new_size.width;
                config.height = new_size.height;
                if self.surface.is_some() {
                    if let Err(err) = self.configure_surface() {
                        log::error!("[surface] resize failed: {err:?}");
                    }
                }
            }
            if self.device.is_some() {
                if let Err(err) = self.recreate_depth_texture() {
                    log::error!("[surface] depth texture resize failed: {err:?}");
                }
            }
        }
    }

    pub fn acquire_surface_frame(&mut self) -> Result<SurfaceFrame> {
        let surface = self.surface.as_ref().context("Surface not initialized")?;
        match surface.get_current_texture() {
            Ok(frame) => Ok(SurfaceFrame::new(frame)),
            Err(err) => Err(self.handle_surface_error(&err)),
        }
    }

    pub fn handle_surface_error(&mut self, error: &wgpu::SurfaceError) -> anyhow::Error {
        match Self::surface_error_action(error) {
            SurfaceErrorAction::Reconfigure => {
                self.resize(self.size);
                anyhow!("Surface lost or outdated; reconfigured surface")
            }
            SurfaceErrorAction::Retry => anyhow!("Surface acquisition timed out"),
            SurfaceErrorAction::OutOfMemory => anyhow!("Surface out of memory"),
            SurfaceErrorAction::Unknown => anyhow!("Surface reported an unknown error"),
        }
    }

    fn configure_surface(&mut self) -> Result<()> {
        let surface = self.surface.as_ref().context("Surface not initialized")?;
        let device = self.device.as_ref().context("GPU device not initialized")?;
        let config = self.config.as_mut().context("Surface configuration missing")?;
        surface.configure(device, config);
        Ok(())
    }

    fn recreate_depth_texture(&mut self) -> Result<()> {
        let device = self.device.as_ref().context("GPU device not initialized")?;
        let (depth_texture, depth_view) = create_depth_texture(device, self.size);
        self.depth_texture = Some(depth_texture);
        self.depth_view = Some(depth_view);
        Ok(())
    }

    fn select_present_mode(&self, modes: &[wgpu::PresentMode]) -> wgpu::PresentMode {
        let modes = if modes.is_empty() { &DEFAULT_PRESENT_MODES[..] } else { modes };
        if self.vsync {
            wgpu::PresentMode::Fifo
        } else {
            modes
                .iter()
                .copied()
                .find(|mode| *mode != wgpu::PresentMode::Fifo)
                .unwrap_or(wgpu::PresentMode::Fifo)
        }
    }

    fn choose_surface_format(formats: &[wgpu::TextureFormat]) -> Result<wgpu::TextureFormat> {
        formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| formats.first().copied())
            .context("Surface reports no supported formats")
    }

    async fn init_wgpu(&mut self, window: &Arc<Window>) -> Result<()> {
        let instance = wgpu::Instance::default();
        let surface = instance.create_surface(window.clone()).context("Failed to create WGPU surface")?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("Failed to request WGPU adapter")?;
        let (device, queue) = request_device(&adapter, "Device").await?;

        let caps = surface.get_capabilities(&adapter);
        let format = Self::choose_surface_format(&caps.formats)?;
        let size = window.inner_size();
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: self.select_present_mode(&caps.present_modes),
            alpha_mode: caps.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        log::info!("[surface] {:?} {}x{} {:?}", format, config.width, config.height, config.present_mode);

        let (depth_texture, depth_view) = create_depth_texture(&device, size);

        self.surface = Some(surface);
        self.device = Some(device);
        self.queue = Some(queue);
        self.config = Some(config);
        self.depth_texture = Some(depth_texture);
        self.depth_view = Some(depth_view);
        Ok(())
    }

    fn surface_error_action(error: &wgpu::SurfaceError) -> SurfaceErrorAction {
        match error {
            wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => SurfaceErrorAction::Reconfigure,
            wgpu::SurfaceError::Timeout => SurfaceErrorAction::Retry,
            wgpu::SurfaceError::OutOfMemory => SurfaceErrorAction::OutOfMemory,
            wgpu::SurfaceError::Other => SurfaceErrorAction::Unknown,
        }
    }
}

/// Device and queue on a [`HEADLESS_BACKENDS`] adapter with no surface attached.
pub async fn request_headless_device() -> Result<(wgpu::Device, wgpu::Queue)> {
    let instance =
        wgpu::Instance::new(&wgpu::InstanceDescriptor { backends: HEADLESS_BACKENDS, ..Default::default() });
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
        .context("Failed to request headless adapter")?;
    request_device(&adapter, "Headless Device").await
}

async fn request_device(adapter: &wgpu::Adapter, label: &str) -> Result<(wgpu::Device, wgpu::Queue)> {
    let info = adapter.get_info();
    log::info!("[surface] adapter '{}' ({:?}, {:?})", info.name, info.device_type, info.backend);
    let device_desc = wgpu::DeviceDescriptor {
        label: Some(label),
        required_features: wgpu::Features::empty(),
        required_limits: adapter.limits(),
        experimental_features: wgpu::ExperimentalFeatures::default(),
        memory_hints: wgpu::MemoryHints::default(),
        trace: wgpu::Trace::default(),
    };
    adapter.request_device(&device_desc).await.context("Failed to request WGPU device")
}

pub(super) fn create_depth_texture(
    device: &wgpu::Device,
    size: PhysicalSize<u32>,
) -> (wgpu::Texture, wgpu::TextureView) {
    let extent =
        wgpu::Extent3d { width: size.width.max(1), height: size.height.max(1), depth_or_array_layers: 1 };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Texture"),
        size: extent,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn present_mode_respects_vsync_flag() {
        let cfg = WindowConfig { vsync: false, ..WindowConfig::default() };
        let surface = WindowSurface::new(&cfg);
        let modes = vec![wgpu::PresentMode::Immediate, wgpu::PresentMode::Fifo];
        assert_eq!(surface.select_present_mode(&modes), wgpu::PresentMode::Immediate);
        assert_eq!(surface.select_present_mode(&[]), wgpu::PresentMode::Fifo);

        let mut vsync_surface = WindowSurface::new(&cfg);
        vsync_surface.vsync = true;
        assert_eq!(vsync_surface.select_present_mode(&modes), wgpu::PresentMode::Fifo);
    }

    #[test]
    fn surface_format_prefers_srgb() {
        let formats = [wgpu::TextureFormat::Bgra8Unorm, wgpu::TextureFormat::Bgra8UnormSrgb];
        assert_eq!(
            WindowSurface::choose_surface_format(&formats).expect("format"),
            wgpu::TextureFormat::Bgra8UnormSrgb
        );
        assert!(WindowSurface::choose_surface_format(&[]).is_err());
    }

    #[test]
    fn surface_error_action_matches_variants() {
        assert_eq!(
            WindowSurface::surface_error_action(&wgpu::SurfaceError::Lost),
            SurfaceErrorAction::Reconfigure
        );
        assert_eq!(
            WindowSurface::surface_error_action(&wgpu::SurfaceError::Outdated),
            SurfaceErrorAction::Reconfigure
        );
        assert_eq!(
            WindowSurface::surface_error_action(&wgpu::SurfaceError::Timeout),
            SurfaceErrorAction::Retry
        );
        assert_eq!(
            WindowSurface::surface_error_action(&wgpu::SurfaceError::OutOfMemory),
            SurfaceErrorAction::OutOfMemory
        );
        assert_eq!(
            WindowSurface::surface_error_action(&wgpu::SurfaceError::Other),
            SurfaceErrorAction::Unknown
        );
    }

    #[test]
    fn headless_device_never_uses_gl() {
        assert!(!HEADLESS_BACKENDS.contains(wgpu::Backends::GL));
        assert!(HEADLESS_BACKENDS.contains(wgpu::Backends::VULKAN));
    }
}
