use glam::Vec3;
use runtime_ibl::config::AppConfig;
use runtime_ibl::ibl::brdf::{integrate_brdf, lut_coordinate};
use runtime_ibl::ibl::panorama::HdrImage;
use runtime_ibl::ibl::DisplayMode;
use runtime_ibl::renderer::request_headless_device;
use runtime_ibl::schedule::{FrameSchedule, StageId};
use runtime_ibl::FrameOrchestrator;

const ENV_SIZE: u32 = 64;
const PREFILTER_SIZE: u32 = 32;
const PREFILTER_MIPS: u32 = 4;
const LUT_SIZE: u32 = 32;

fn headless() -> Option<(wgpu::Device, wgpu::Queue)> {
    match pollster::block_on(request_headless_device()) {
        Ok(pair) => Some(pair),
        Err(err) => {
            eprintln!("skipping GPU test: {err:#}");
            None
        }
    }
}

fn small_config(sample_count: u32) -> AppConfig {
    let mut config = AppConfig::default();
    config.environment.cubemap_size = ENV_SIZE;
    config.ibl.prefilter_size = PREFILTER_SIZE;
    config.ibl.prefilter_mip_levels = PREFILTER_MIPS;
    config.ibl.sh_sample_size = 32;
    config.ibl.sample_count = sample_count;
    config.ibl.brdf_lut_size = LUT_SIZE;
    config.ibl.brdf_sample_count = 256;
    config
}

fn orchestrator(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    config: &AppConfig,
    panorama: HdrImage,
) -> FrameOrchestrator {
    FrameOrchestrator::new(device, queue, config, panorama, None, wgpu::TextureFormat::Rgba8UnormSrgb)
        .expect("build IBL pipeline")
}

fn assert_rgb_near(texel: [f32; 4], expected: Vec3, tolerance: f32, what: &str) {
    let got = Vec3::new(texel[0], texel[1], texel[2]);
    assert!((got - expected).abs().max_element() <= tolerance, "{what}: got {got:?}, expected {expected:?}");
}

#[test]
fn uniform_environment_produces_flat_maps() {
    let Some((device, queue)) = headless() else { return };
    let gray = Vec3::splat(0.5);
    let mut ibl = orchestrator(&device, &queue, &small_config(32), HdrImage::uniform(128, 64, gray));
    let schedule = ibl.run_precompute(&device, &queue).expect("precompute");
    assert!(schedule.stages().any(|stage| stage == StageId::ConvertPanorama));

    for (mip, label) in [(0, "environment mip 0"), (ENV_SIZE.trailing_zeros(), "environment last mip")] {
        let texels = ibl.read_environment_mip(&device, &queue, mip).expect("read environment");
        for texel in texels {
            assert_rgb_near(texel, gray, 1e-2, label);
        }
    }

    let sh = ibl.read_sh(&device, &queue).expect("read SH");
    let four_pi = 4.0 * std::f32::consts::PI;
    assert!((sh.weight - four_pi).abs() < 1e-2 * four_pi, "solid angle sums to 4pi, got {}", sh.weight);
    assert!((sh.dc() - gray * four_pi.sqrt()).abs().max_element() < 2e-2, "DC {:?}", sh.dc());
    for coefficient in &sh.coefficients[1..] {
        assert!(coefficient.abs().max_element() < 1e-2, "higher bands vanish, got {coefficient:?}");
    }
    for normal in [Vec3::X, Vec3::NEG_Y, Vec3::new(1.0, 1.0, -1.0)] {
        let irradiance = sh.irradiance(normal);
        assert!((irradiance - gray * std::f32::consts::PI).abs().max_element() < 3e-2, "irradiance {irradiance:?}");
    }

    for mip in 0..PREFILTER_MIPS {
        for texel in ibl.read_prefilter_mip(&device, &queue, mip).expect("read prefilter") {
            assert_rgb_near(texel, gray, 2e-2, "prefiltered");
        }
    }
}

fn recaptures(schedule: &FrameSchedule) -> bool {
    schedule.stages().any(|stage| matches!(stage, StageId::ConvertPanorama | StageId::ConvertSky | StageId::EnvMip(_)))
}

fn steady_stages() -> Vec<StageId> {
    let mut stages = vec![StageId::ProjectSh, StageId::ReduceSh];
    stages.extend((0..PREFILTER_MIPS).map(StageId::Prefilter));
    stages
}

#[test]
fn steady_precompute_reprojects_without_recapture() {
    let Some((device, queue)) = headless() else { return };
    let mut ibl = orchestrator(&device, &queue, &small_config(16), HdrImage::generated_default());
    ibl.run_precompute(&device, &queue).expect("first precompute");
    let first = ibl.read_sh(&device, &queue).expect("read SH");
    let again = ibl.run_precompute(&device, &queue).expect("second precompute");
    assert_eq!(again.stages().collect::<Vec<_>>(), steady_stages());
    let second = ibl.read_sh(&device, &queue).expect("read SH");
    for (a, b) in first.coefficients.iter().zip(&second.coefficients) {
        assert!((*a - *b).abs().max_element() < 1e-5, "SH drifted between frames: {a:?} vs {b:?}");
    }

    let before = ibl.read_prefilter_mip(&device, &queue, 1).expect("read prefilter");
    ibl.set_sample_count(17);
    ibl.set_sample_count(16);
    ibl.run_precompute(&device, &queue).expect("prefilter rerun");
    let after = ibl.read_prefilter_mip(&device, &queue, 1).expect("read prefilter");
    for (a, b) in before.iter().zip(&after) {
        assert_rgb_near(*b, Vec3::new(a[0], a[1], a[2]), 1e-3, "regenerated samples");
    }

    // Display modes that share the panorama never re-capture it.
    assert!(ibl.set_display_mode(DisplayMode::Irradiance));
    assert!(!recaptures(&ibl.plan_precompute().expect("plan")));
}

#[test]
fn mirror_level_reproduces_the_environment() {
    let Some((device, queue)) = headless() else { return };
    let mut ibl = orchestrator(&device, &queue, &small_config(32), HdrImage::generated_default());
    ibl.run_precompute(&device, &queue).expect("precompute");
    let environment = ibl.read_environment_mip(&device, &queue, 0).expect("read environment");
    let mirror = ibl.read_prefilter_mip(&device, &queue, 0).expect("read prefilter");

    let env_face = (ENV_SIZE * ENV_SIZE) as usize;
    let pre_face = (PREFILTER_SIZE * PREFILTER_SIZE) as usize;
    for face in 0..6usize {
        for (x, y) in [(3u32, 5u32), (16, 16), (28, 9)] {
            let env = |ex: u32, ey: u32| {
                let t = environment[face * env_face + (ey * ENV_SIZE + ex) as usize];
                Vec3::new(t[0], t[1], t[2])
            };
            let expected = (env(2 * x, 2 * y) + env(2 * x + 1, 2 * y) + env(2 * x, 2 * y + 1) + env(2 * x + 1, 2 * y + 1))
                * 0.25;
            let texel = mirror[face * pre_face + (y * PREFILTER_SIZE + x) as usize];
            let tolerance = 2e-2 * expected.max_element().max(1.0);
            assert_rgb_near(texel, expected, tolerance, "mirror prefilter");
        }
    }

    let spread = |texels: &[[f32; 4]]| {
        let (lo, hi) = texels.iter().fold((f32::MAX, f32::MIN), |(lo, hi), t| (lo.min(t[1]), hi.max(t[1])));
        hi - lo
    };
    let broad = ibl.read_prefilter_mip(&device, &queue, PREFILTER_MIPS - 1).expect("read last mip");
    assert!(spread(&broad) < spread(&mirror), "the roughest level is a broad average");
}

#[test]
fn brdf_lut_matches_reference_integral() {
    let Some((device, queue)) = headless() else { return };
    let ibl = orchestrator(&device, &queue, &small_config(32), HdrImage::uniform(8, 4, Vec3::ONE));
    let lut = ibl.read_brdf_lut(&device, &queue).expect("read LUT");
    assert_eq!(lut.len(), (LUT_SIZE * LUT_SIZE) as usize);
    for (x, y) in [(0u32, 0u32), (LUT_SIZE - 1, 0), (LUT_SIZE / 2, LUT_SIZE / 2), (4, LUT_SIZE - 1)] {
        let (scale, bias) = integrate_brdf(lut_coordinate(x, LUT_SIZE), lut_coordinate(y, LUT_SIZE), 256);
        let texel = lut[(y * LUT_SIZE + x) as usize];
        assert!((texel[0] - scale).abs() < 1e-2, "scale at ({x}, {y}): {} vs {scale}", texel[0]);
        assert!((texel[1] - bias).abs() < 1e-2, "bias at ({x}, {y}): {} vs {bias}", texel[1]);
        assert!(texel[0] + texel[1] <= 1.0 + 1e-2);
    }
}

#[test]
fn sample_count_change_never_recaptures() {
    let Some((device, queue)) = headless() else { return };
    let mut ibl = orchestrator(&device, &queue, &small_config(32), HdrImage::generated_default());
    ibl.run_precompute(&device, &queue).expect("precompute");
    let generation = ibl.sample_arena().generation();

    assert_eq!(ibl.set_sample_count(64), 64);
    assert_eq!(ibl.sample_arena().generation(), generation + 1);
    let rerun = ibl.run_precompute(&device, &queue).expect("prefilter rerun");
    assert_eq!(rerun.stages().collect::<Vec<_>>(), steady_stages());

    assert_eq!(ibl.set_sample_count(500), 64, "requests above capacity clamp");
    assert_eq!(ibl.sample_arena().generation(), generation + 1, "clamped request changes nothing");
    assert_eq!(ibl.set_sample_count(0), 1);
}

#[test]
fn sky_mode_requires_a_sky_model() {
    let Some((device, queue)) = headless() else { return };
    let mut config = small_config(8);
    config.display.mode = DisplayMode::Sky;
    let mut ibl = orchestrator(&device, &queue, &config, HdrImage::generated_default());
    assert_eq!(ibl.display_mode(), DisplayMode::Environment);
    assert!(!ibl.set_display_mode(DisplayMode::Sky));
    assert_eq!(ibl.cycle_display_mode(), DisplayMode::Irradiance);
    assert!(ibl.adjust_sun(0.1).is_none());
}
