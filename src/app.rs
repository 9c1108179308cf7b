use anyhow::{Context, Result};
use std::path::Path;
use winit::application::ApplicationHandler;
use winit::event::{DeviceEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};

use crate::camera3d::{Camera3D, FreeflyController};
use crate::config::{AppConfig, AppConfigOverrides, DEFAULT_CONFIG_PATH};
use crate::error::IblError;
use crate::ibl::panorama::HdrImage;
use crate::ibl::DisplayMode;
use crate::input::{Input, InputAction, InputEvent, DEFAULT_BINDINGS_PATH};
use crate::orchestrator::FrameOrchestrator;
use crate::renderer::{FrameTarget, WindowSurface};
use crate::sky::SkyModel;
use crate::time::FrameTimer;

const ROUGHNESS_STEP: f32 = 0.1;
const SUN_STEP: f32 = 0.05;
const TITLE_REFRESH_FRAMES: u64 = 30;

pub async fn run() -> Result<()> {
    run_with_overrides(Path::new(DEFAULT_CONFIG_PATH), AppConfigOverrides::default()).await
}

pub async fn run_with_overrides(config_path: &Path, overrides: AppConfigOverrides) -> Result<()> {
    let mut config = AppConfig::load_or_default(config_path);
    if !overrides.is_empty() {
        log::info!("[config] CLI overrides: {}", overrides.applied_fields().join(", "));
    }
    config.apply_overrides(&overrides);
    let event_loop = EventLoop::new().context("Failed to create winit event loop")?;
    let mut app = App::new(config)?;
    event_loop.run_app(&mut app).context("Event loop execution failed")?;
    Ok(())
}

/// Loads the configured panorama; the generated gradient sky stands in only when none is configured.
fn load_panorama(config: &AppConfig) -> Result<HdrImage, IblError> {
    let Some(path) = config.environment.panorama.as_ref() else {
        log::info!("[ibl] no panorama configured; using the generated sky gradient");
        return Ok(HdrImage::generated_default());
    };
    let image = HdrImage::load(path)?;
    log::info!("[ibl] loaded panorama {} ({}x{})", path.display(), image.width(), image.height());
    Ok(image)
}

fn load_sky(config: &AppConfig) -> Result<Option<SkyModel>, IblError> {
    if !config.sky.enabled {
        return Ok(None);
    }
    SkyModel::load(&config.sky).map(Some)
}

pub struct App {
    config: AppConfig,
    surface: WindowSurface,
    orchestrator: Option<FrameOrchestrator>,
    pending_panorama: Option<HdrImage>,
    pending_sky: Option<SkyModel>,
    input: Input,
    camera: Camera3D,
    controller: FreeflyController,
    timer: FrameTimer,
    should_close: bool,
}

impl App {
    /// Fails when a configured panorama or enabled sky table cannot be loaded.
    pub fn new(config: AppConfig) -> Result<Self> {
        let panorama = load_panorama(&config).context("Failed to load the environment panorama")?;
        let sky = load_sky(&config).context("Failed to load the sky tables")?;
        let (controller, camera) = FreeflyController::from_config(&config.camera);
        Ok(Self {
            surface: WindowSurface::new(&config.window),
            orchestrator: None,
            pending_panorama: Some(panorama),
            pending_sky: sky,
            input: Input::from_config(DEFAULT_BINDINGS_PATH),
            camera,
            controller,
            timer: FrameTimer::new(),
            should_close: false,
            config,
        })
    }

    fn init_pipeline(&mut self) -> Result<()> {
        if self.orchestrator.is_some() {
            return Ok(());
        }
        let panorama = self.pending_panorama.take().context("Panorama already consumed by a previous pipeline")?;
        let orchestrator = FrameOrchestrator::new(
            self.surface.device()?,
            self.surface.queue()?,
            &self.config,
            panorama,
            self.pending_sky.take(),
            self.surface.surface_format()?,
        )?;
        self.orchestrator = Some(orchestrator);
        Ok(())
    }

    fn apply_actions(&mut self) {
        let actions = self.input.take_triggered();
        let Some(orchestrator) = self.orchestrator.as_mut() else {
            return;
        };
        for action in actions {
            match action {
                InputAction::ShowEnvironment => {
                    orchestrator.set_display_mode(DisplayMode::Environment);
                }
                InputAction::ShowIrradiance => {
                    orchestrator.set_display_mode(DisplayMode::Irradiance);
                }
                InputAction::ShowPrefiltered => {
                    orchestrator.set_display_mode(DisplayMode::Prefiltered);
                }
                InputAction::ShowSky => {
                    orchestrator.set_display_mode(DisplayMode::Sky);
                }
                InputAction::CycleDisplayMode => {
                    orchestrator.cycle_display_mode();
                }
                InputAction::RoughnessDown => {
                    orchestrator.set_roughness(orchestrator.roughness() - ROUGHNESS_STEP);
                }
                InputAction::RoughnessUp => {
                    orchestrator.set_roughness(orchestrator.roughness() + ROUGHNESS_STEP);
                }
                InputAction::SamplesDown => {
                    let current = orchestrator.sample_arena().sample_count();
                    orchestrator.set_sample_count(current.saturating_sub(1));
                }
                InputAction::SamplesUp => {
                    let current = orchestrator.sample_arena().sample_count();
                    orchestrator.set_sample_count(current + 1);
                }
                InputAction::SunDown => {
                    orchestrator.adjust_sun(-SUN_STEP);
                }
                InputAction::SunUp => {
                    orchestrator.adjust_sun(SUN_STEP);
                }
                InputAction::ToggleDebugOverlay => {
                    let shown = orchestrator.toggle_debug_overlay();
                    log::info!("[ibl] BRDF LUT overlay {}", if shown { "on" } else { "off" });
                }
                InputAction::Quit => self.should_close = true,
                _ => {}
            }
        }
    }

    fn render_frame(&mut self) -> Result<()> {
        let Some(orchestrator) = self.orchestrator.as_mut() else {
            return Ok(());
        };
        let frame = match self.surface.acquire_surface_frame() {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("[renderer] skipping frame: {err:#}");
                return Ok(());
            }
        };
        let device = self.surface.device()?;
        let queue = self.surface.queue()?;
        let target = FrameTarget { color: frame.view(), depth: self.surface.depth_view()?, size: self.surface.size() };
        let mut encoder =
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Frame Encoder") });
        orchestrator.encode_frame(queue, &mut encoder, &self.camera, &target)?;
        queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(())
    }

    fn refresh_title(&self) {
        if self.timer.frames() % TITLE_REFRESH_FRAMES != 0 {
            return;
        }
        let (Some(window), Some(orchestrator)) = (self.surface.window(), self.orchestrator.as_ref()) else {
            return;
        };
        window.set_title(&format!(
            "{} | {} | roughness {:.1} | {} spp | {:.2} ms",
            self.config.window.title,
            orchestrator.display_mode().label(),
            orchestrator.roughness(),
            orchestrator.sample_arena().sample_count(),
            self.timer.smoothed_ms()
        ));
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(err) = self.surface.ensure_window(event_loop) {
            log::error!("Renderer initialization error: {err:?}");
            self.should_close = true;
            return;
        }
        if let Err(err) = self.init_pipeline() {
            log::error!("IBL pipeline initialization error: {err:?}");
            self.should_close = true;
        }
    }

    fn window_event(&mut self, _el: &ActiveEventLoop, _id: winit::window::WindowId, event: WindowEvent) {
        self.input.push(InputEvent::from_window_event(&event));
        match &event {
            WindowEvent::CloseRequested => self.should_close = true,
            WindowEvent::Resized(size) => self.surface.resize(*size),
            _ => {}
        }
    }

    fn device_event(&mut self, _e: &ActiveEventLoop, _dev: winit::event::DeviceId, ev: DeviceEvent) {
        self.input.push(InputEvent::from_device_event(&ev));
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.should_close {
            event_loop.exit();
            return;
        }
        self.timer.tick();
        let dt = self.timer.delta_seconds();
        self.apply_actions();
        self.controller.update(&mut self.camera, &self.input.freefly_input(), dt);
        self.input.clear_frame();

        if let Err(err) = self.render_frame() {
            log::error!("Frame error: {err:?}");
            self.should_close = true;
        }
        self.refresh_title();
        if let Some(window) = self.surface.window() {
            window.request_redraw();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn config_with_panorama(path: PathBuf) -> AppConfig {
        let mut config = AppConfig::default();
        config.environment.panorama = Some(path);
        config
    }

    #[test]
    fn unconfigured_panorama_uses_generated_sky() {
        let image = load_panorama(&AppConfig::default()).expect("generated panorama");
        let generated = HdrImage::generated_default();
        assert_eq!((image.width(), image.height()), (generated.width(), generated.height()));
    }

    #[test]
    fn missing_configured_panorama_aborts_startup() {
        let config = config_with_panorama(PathBuf::from("does/not/exist.hdr"));
        let err = load_panorama(&config).expect_err("missing panorama must fail");
        assert!(matches!(err, IblError::Io { kind: "panorama", .. }));
        assert!(App::new(config).is_err());
    }

    #[test]
    fn undecodable_panorama_aborts_startup() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("broken.hdr");
        std::fs::write(&path, b"not an image").expect("write panorama");
        assert!(load_panorama(&config_with_panorama(path)).is_err());
    }

    #[test]
    fn disabled_sky_loads_nothing() {
        assert!(load_sky(&AppConfig::default()).expect("sky disabled").is_none());
    }

    #[test]
    fn missing_enabled_sky_tables_abort_startup() {
        let dir = tempdir().expect("temp dir");
        let mut config = AppConfig::default();
        config.sky.enabled = true;
        config.sky.transmittance_path = dir.path().join("missing_transmittance.raw");
        let err = load_sky(&config).expect_err("missing table must fail");
        assert!(matches!(err, IblError::Io { kind: "sky table", .. }));
        assert!(App::new(config).is_err());
    }

    #[test]
    fn short_enabled_sky_table_aborts_startup() {
        let dir = tempdir().expect("temp dir");
        let mut config = AppConfig::default();
        config.sky.enabled = true;
        config.sky.transmittance_size = [2, 2];
        config.sky.transmittance_path = dir.path().join("transmittance.raw");
        std::fs::write(&config.sky.transmittance_path, [0u8; 12]).expect("write table");
        let err = load_sky(&config).expect_err("short table must fail");
        assert!(matches!(err, IblError::TableSize { expected: 64, actual: 12, .. }));
    }
}
