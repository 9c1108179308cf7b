//! Per-frame IBL orchestration: decides which precompute stages run, orders them into a
//! [`FrameSchedule`] and records every batch into the frame's command encoder.

use anyhow::{bail, Context, Result};
use std::time::Instant;

use crate::camera3d::Camera3D;
use crate::config::AppConfig;
use crate::ibl::panorama::HdrImage;
use crate::ibl::sampling::SampleArena;
use crate::ibl::sh::ShCoefficients;
use crate::ibl::{full_mip_count, DisplayMode};
use crate::renderer::readback::read_texture;
use crate::renderer::resources::{IblLayout, IblResources};
use crate::renderer::shaders;
use crate::renderer::{
    BrdfPass, CapturePass, CaptureSource, EnvMipPass, FrameTarget, OverlayPass, PrefilterPass, ScenePass, ShPass,
    SkyboxPass, SkyboxUniform,
};
use crate::schedule::{FrameSchedule, StageId, StageKind};
use crate::sky::SkyModel;

const MIN_ENVIRONMENT_SIZE: u32 = 16;
const MAX_ENVIRONMENT_SIZE: u32 = 4096;
const SUN_STEP_LIMIT: f32 = std::f32::consts::PI;

/// Resource sizes derived from a config, with every size sanitized.
pub fn layout_from_config(config: &AppConfig) -> IblLayout {
    let environment_size =
        config.environment.cubemap_size.clamp(MIN_ENVIRONMENT_SIZE, MAX_ENVIRONMENT_SIZE).next_power_of_two();
    let ibl = config.ibl.sanitized(environment_size);
    IblLayout {
        environment_size,
        environment_mips: full_mip_count(environment_size),
        prefilter_size: ibl.prefilter_size,
        prefilter_mips: ibl.prefilter_mip_levels,
        sh_sample_size: ibl.sh_sample_size,
        brdf_lut_size: ibl.brdf_lut_size,
    }
}

/// Tracks which source the environment cubemap holds and derives each frame's stages.
#[derive(Debug, Clone)]
pub struct FramePlanner {
    environment_mips: u32,
    prefilter_mips: u32,
    env_source: Option<CaptureSource>,
}

impl FramePlanner {
    pub fn new(environment_mips: u32, prefilter_mips: u32) -> Self {
        Self { environment_mips, prefilter_mips, env_source: None }
    }

    /// Precompute stages for one frame showing `source`. The cubemap is only re-captured when the
    /// source changed or is the analytic sky; SH projection and prefiltering run every frame.
    pub fn precompute_stages(&self, source: CaptureSource) -> Vec<StageId> {
        let mut stages = Vec::new();
        if self.env_source != Some(source) || source == CaptureSource::Sky {
            stages.push(match source {
                CaptureSource::Panorama => StageId::ConvertPanorama,
                CaptureSource::Sky => StageId::ConvertSky,
            });
            stages.extend((1..self.environment_mips).map(StageId::EnvMip));
        }
        stages.extend([StageId::ProjectSh, StageId::ReduceSh]);
        stages.extend((0..self.prefilter_mips).map(StageId::Prefilter));
        stages
    }

    pub fn frame_stages(&self, source: CaptureSource, debug_overlay: bool) -> Vec<StageId> {
        let mut stages = self.precompute_stages(source);
        stages.extend([StageId::RenderScene, StageId::RenderSkybox]);
        if debug_overlay {
            stages.push(StageId::DebugOverlay);
        }
        stages
    }

    /// Records that `schedule` was encoded while showing `source`.
    pub fn mark_encoded(&mut self, schedule: &FrameSchedule, source: CaptureSource) {
        if schedule.stages().any(|stage| matches!(stage, StageId::ConvertPanorama | StageId::ConvertSky)) {
            self.env_source = Some(source);
        }
    }

    pub fn environment_source(&self) -> Option<CaptureSource> {
        self.env_source
    }
}

/// Owns the IBL resources and passes and runs them in dependency order.
pub struct FrameOrchestrator {
    resources: IblResources,
    capture: CapturePass,
    env_mips: EnvMipPass,
    sh: ShPass,
    prefilter: PrefilterPass,
    brdf: BrdfPass,
    scene: ScenePass,
    skybox: SkyboxPass,
    overlay: OverlayPass,
    arena: SampleArena,
    planner: FramePlanner,
    sky: Option<SkyModel>,
    mode: DisplayMode,
    roughness: f32,
    exposure: f32,
    debug_overlay: bool,
}

impl FrameOrchestrator {
    /// Builds every resource and pass, then integrates the BRDF LUT once.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        config: &AppConfig,
        panorama: HdrImage,
        sky: Option<SkyModel>,
        target_format: wgpu::TextureFormat,
    ) -> Result<Self> {
        let started = Instant::now();
        shaders::validate_all()?;
        let layout = layout_from_config(config);
        let ibl = config.ibl.sanitized(layout.environment_size);
        log::info!(
            "[ibl] environment {}px x{} mips, prefilter {}px x{} mips, SH grid {}, {} samples",
            layout.environment_size,
            layout.environment_mips,
            layout.prefilter_size,
            layout.prefilter_mips,
            layout.sh_sample_size,
            ibl.sample_count
        );

        let resources = IblResources::new(device, queue, layout, &panorama, sky.as_ref())?;
        let arena = SampleArena::new(
            layout.prefilter_mips,
            layout.prefilter_size,
            layout.environment_size,
            layout.environment_mips,
            config.ibl.sample_count,
        );
        let mut mode = config.display.mode;
        if mode == DisplayMode::Sky && sky.is_none() {
            log::warn!("[ibl] sky display requested but no sky model is loaded; showing the environment");
            mode = DisplayMode::Environment;
        }

        let orchestrator = Self {
            capture: CapturePass::new(device, &resources)?,
            env_mips: EnvMipPass::new(device, &resources)?,
            sh: ShPass::new(device, &resources)?,
            prefilter: PrefilterPass::new(device, &resources)?,
            brdf: BrdfPass::new(device, &resources, ibl.brdf_sample_count)?,
            scene: ScenePass::new(device, &resources, target_format)?,
            skybox: SkyboxPass::new(device, &resources, target_format)?,
            overlay: OverlayPass::new(device, &resources, target_format)?,
            planner: FramePlanner::new(layout.environment_mips, layout.prefilter_mips),
            resources,
            arena,
            sky,
            mode,
            roughness: config.display.roughness.clamp(0.0, 1.0),
            exposure: config.display.exposure.max(0.0),
            debug_overlay: config.display.debug_overlay,
        };

        let lut = FrameSchedule::build([StageId::IntegrateBrdf]);
        let mut encoder =
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("BRDF LUT Encoder") });
        orchestrator.encode_schedule(&mut encoder, &lut, None)?;
        queue.submit(std::iter::once(encoder.finish()));
        log::info!("[ibl] pipeline ready in {:.1} ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(orchestrator)
    }

    pub fn resources(&self) -> &IblResources {
        &self.resources
    }

    pub fn sample_arena(&self) -> &SampleArena {
        &self.arena
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.mode
    }

    pub fn sky_available(&self) -> bool {
        self.sky.is_some()
    }

    pub fn roughness(&self) -> f32 {
        self.roughness
    }

    pub fn debug_overlay(&self) -> bool {
        self.debug_overlay
    }

    /// Returns false when `Sky` is requested without a sky model.
    pub fn set_display_mode(&mut self, mode: DisplayMode) -> bool {
        if mode == DisplayMode::Sky && self.sky.is_none() {
            log::warn!("[ibl] no sky model loaded; staying in {} mode", self.mode.label());
            return false;
        }
        if mode != self.mode {
            log::info!("[ibl] display mode {}", mode.label());
        }
        self.mode = mode;
        true
    }

    pub fn cycle_display_mode(&mut self) -> DisplayMode {
        let next = self.mode.next(self.sky.is_some());
        self.set_display_mode(next);
        self.mode
    }

    /// Applies a new prefilter sample count (clamped to `1..=64`) and returns the count in use.
    pub fn set_sample_count(&mut self, requested: u32) -> u32 {
        if self.arena.set_sample_count(requested) {
            log::info!("[ibl] prefilter samples {}", self.arena.sample_count());
        }
        self.arena.sample_count()
    }

    pub fn set_roughness(&mut self, roughness: f32) -> f32 {
        self.roughness = roughness.clamp(0.0, 1.0);
        self.roughness
    }

    pub fn set_exposure(&mut self, exposure: f32) {
        self.exposure = exposure.max(0.0);
    }

    /// Moves the sun by `delta` radians. Returns the new angle, or `None` without a sky model.
    pub fn adjust_sun(&mut self, delta: f32) -> Option<f32> {
        let sky = self.sky.as_mut()?;
        let target = sky.sun_angle() + delta.clamp(-SUN_STEP_LIMIT, SUN_STEP_LIMIT);
        if sky.set_sun_angle(target) {
            log::debug!("[sky] sun angle {:.3} rad", sky.sun_angle());
        }
        Some(sky.sun_angle())
    }

    pub fn toggle_debug_overlay(&mut self) -> bool {
        self.debug_overlay = !self.debug_overlay;
        self.debug_overlay
    }

    fn capture_source(&self) -> CaptureSource {
        match self.mode {
            DisplayMode::Sky => CaptureSource::Sky,
            _ => CaptureSource::Panorama,
        }
    }

    pub fn plan_precompute(&self) -> Result<FrameSchedule> {
        let stages = self.planner.precompute_stages(self.capture_source());
        Self::checked_schedule(stages)
    }

    pub fn plan_frame(&self) -> Result<FrameSchedule> {
        let stages = self.planner.frame_stages(self.capture_source(), self.debug_overlay);
        Self::checked_schedule(stages)
    }

    fn checked_schedule(stages: Vec<StageId>) -> Result<FrameSchedule> {
        let schedule = FrameSchedule::build(stages);
        schedule.validate()?;
        log::trace!("[schedule] {} barriers: {}", schedule.barrier_count(), schedule.summary());
        Ok(schedule)
    }

    /// Uploads whatever changed on the CPU since the last frame.
    fn upload_inputs(&mut self, queue: &wgpu::Queue, schedule: &FrameSchedule) {
        if self.arena.take_dirty() {
            self.resources.upload_sample_blocks(queue, self.arena.blocks());
        }
        if schedule.stages().any(|stage| stage == StageId::ConvertSky) {
            if let Some(sky) = self.sky.as_ref() {
                self.resources.upload_sky_uniform(queue, &sky.uniform());
            }
        }
    }

    /// Records the precompute stages and the frame's render stages into `encoder`.
    pub fn encode_frame(
        &mut self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        camera: &Camera3D,
        target: &FrameTarget<'_>,
    ) -> Result<FrameSchedule> {
        let schedule = self.plan_frame()?;
        self.upload_inputs(queue, &schedule);

        self.scene.prepare(queue, camera.view_projection(target.size), camera.position, self.exposure);
        self.skybox.prepare(
            queue,
            &SkyboxUniform::new(
                camera.rotation_view_projection(target.size),
                self.mode,
                self.roughness,
                self.resources.layout.prefilter_mips,
                self.exposure,
            ),
        );

        self.encode_schedule(encoder, &schedule, Some(target))?;
        self.planner.mark_encoded(&schedule, self.capture_source());
        Ok(schedule)
    }

    /// Runs one frame's precompute stages on their own submission and waits for the GPU.
    pub fn run_precompute(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<FrameSchedule> {
        let schedule = self.plan_precompute()?;
        self.upload_inputs(queue, &schedule);
        let mut encoder =
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("IBL Precompute Encoder") });
        self.encode_schedule(&mut encoder, &schedule, None)?;
        queue.submit(std::iter::once(encoder.finish()));
        device.poll(wgpu::PollType::wait_indefinitely()).context("Device poll failed after precompute")?;
        self.planner.mark_encoded(&schedule, self.capture_source());
        Ok(schedule)
    }

    /// Consecutive compute stages of a batch share one compute pass; each render stage opens its own
    /// render pass. A batch boundary always ends the current pass.
    fn encode_schedule(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        schedule: &FrameSchedule,
        target: Option<&FrameTarget<'_>>,
    ) -> Result<()> {
        for (index, batch) in schedule.batches().iter().enumerate() {
            let groups = batch
                .stages()
                .chunk_by(|a, b| a.kind() == StageKind::Compute && b.kind() == StageKind::Compute);
            for group in groups {
                if group[0].kind() == StageKind::Compute {
                    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                        label: Some(&format!("IBL Compute Batch {index}")),
                        timestamp_writes: None,
                    });
                    for stage in group {
                        self.encode_compute(&mut pass, *stage)?;
                    }
                } else {
                    for stage in group {
                        self.encode_render(encoder, *stage, target)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn encode_compute(&self, pass: &mut wgpu::ComputePass<'_>, stage: StageId) -> Result<()> {
        match stage {
            StageId::EnvMip(mip) => self.env_mips.encode(pass, &self.resources, mip)?,
            StageId::ProjectSh => self.sh.encode_projection(pass),
            StageId::ReduceSh => self.sh.encode_reduction(pass),
            StageId::Prefilter(mip) => self.prefilter.encode(pass, &self.resources, mip)?,
            StageId::IntegrateBrdf => self.brdf.encode(pass),
            other => bail!("{other:?} is not a compute stage"),
        }
        Ok(())
    }

    fn encode_render(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        stage: StageId,
        target: Option<&FrameTarget<'_>>,
    ) -> Result<()> {
        match stage {
            StageId::ConvertPanorama => self.capture.encode(encoder, &self.resources, CaptureSource::Panorama)?,
            StageId::ConvertSky => self.capture.encode(encoder, &self.resources, CaptureSource::Sky)?,
            StageId::RenderScene | StageId::RenderSkybox | StageId::DebugOverlay => {
                let target = target.with_context(|| format!("{stage:?} needs a frame target"))?;
                match stage {
                    StageId::RenderScene => self.scene.encode(encoder, target),
                    StageId::RenderSkybox => self.skybox.encode(encoder, target),
                    _ => self.overlay.encode(encoder, target),
                }
            }
            other => bail!("{other:?} is not a render stage"),
        }
        Ok(())
    }

    pub fn read_sh(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<ShCoefficients> {
        let texels = read_texture(device, queue, &self.resources.sh_coefficients, 0, 1)?;
        ShCoefficients::from_texels(&texels).context("SH readback returned too few texels")
    }

    /// All six faces of one prefilter mip, face-major.
    pub fn read_prefilter_mip(&self, device: &wgpu::Device, queue: &wgpu::Queue, mip: u32) -> Result<Vec<[f32; 4]>> {
        read_texture(device, queue, &self.resources.prefiltered, mip, 6)
    }

    pub fn read_environment_mip(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        mip: u32,
    ) -> Result<Vec<[f32; 4]>> {
        read_texture(device, queue, &self.resources.environment, mip, 6)
    }

    pub fn read_brdf_lut(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Vec<[f32; 4]>> {
        read_texture(device, queue, &self.resources.brdf_lut, 0, 1)
    }
}
