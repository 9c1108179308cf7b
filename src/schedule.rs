//! Frame stages, their declared resource access, and barrier placement.
//!
//! A [`FrameSchedule`] groups stages into batches. A new batch (a synchronization point) starts
//! whenever a stage reads something written earlier in the current batch. Each batch is encoded
//! as its own pass group, which is where wgpu places the memory barrier.

use smallvec::SmallVec;

use crate::error::IblError;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ResourceSet: u32 {
        const PANORAMA = 1 << 0;
        const SKY_TABLES = 1 << 1;
        const ENV_CUBEMAP = 1 << 2;
        const CAPTURE_DEPTH = 1 << 3;
        const SH_INTERMEDIATE = 1 << 4;
        const SH_COEFFICIENTS = 1 << 5;
        const SAMPLE_BUFFERS = 1 << 6;
        const PREFILTER_CUBEMAP = 1 << 7;
        const BRDF_LUT = 1 << 8;
        const FRAME_COLOR = 1 << 9;
        const FRAME_DEPTH = 1 << 10;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageId {
    ConvertPanorama,
    ConvertSky,
    /// Downsample into the given environment mip from the level above it.
    EnvMip(u32),
    ProjectSh,
    ReduceSh,
    Prefilter(u32),
    IntegrateBrdf,
    RenderScene,
    RenderSkybox,
    DebugOverlay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Compute,
    Render,
}

impl StageId {
    pub fn kind(self) -> StageKind {
        match self {
            StageId::EnvMip(_)
            | StageId::ProjectSh
            | StageId::ReduceSh
            | StageId::Prefilter(_)
            | StageId::IntegrateBrdf => StageKind::Compute,
            StageId::ConvertPanorama
            | StageId::ConvertSky
            | StageId::RenderScene
            | StageId::RenderSkybox
            | StageId::DebugOverlay => StageKind::Render,
        }
    }

    pub fn reads(self) -> ResourceSet {
        match self {
            StageId::ConvertPanorama => ResourceSet::PANORAMA,
            StageId::ConvertSky => ResourceSet::SKY_TABLES,
            StageId::EnvMip(_) | StageId::ProjectSh => ResourceSet::ENV_CUBEMAP,
            StageId::ReduceSh => ResourceSet::SH_INTERMEDIATE,
            StageId::Prefilter(_) => ResourceSet::ENV_CUBEMAP | ResourceSet::SAMPLE_BUFFERS,
            StageId::IntegrateBrdf => ResourceSet::empty(),
            StageId::RenderScene => {
                ResourceSet::SH_COEFFICIENTS | ResourceSet::PREFILTER_CUBEMAP | ResourceSet::BRDF_LUT
            }
            StageId::RenderSkybox => {
                ResourceSet::ENV_CUBEMAP | ResourceSet::SH_COEFFICIENTS | ResourceSet::PREFILTER_CUBEMAP
            }
            StageId::DebugOverlay => ResourceSet::BRDF_LUT,
        }
    }

    pub fn writes(self) -> ResourceSet {
        match self {
            StageId::ConvertPanorama | StageId::ConvertSky => {
                ResourceSet::ENV_CUBEMAP | ResourceSet::CAPTURE_DEPTH
            }
            StageId::EnvMip(_) => ResourceSet::ENV_CUBEMAP,
            StageId::ProjectSh => ResourceSet::SH_INTERMEDIATE,
            StageId::ReduceSh => ResourceSet::SH_COEFFICIENTS,
            StageId::Prefilter(_) => ResourceSet::PREFILTER_CUBEMAP,
            StageId::IntegrateBrdf => ResourceSet::BRDF_LUT,
            StageId::RenderScene | StageId::RenderSkybox => {
                ResourceSet::FRAME_COLOR | ResourceSet::FRAME_DEPTH
            }
            StageId::DebugOverlay => ResourceSet::FRAME_COLOR,
        }
    }
}

pub type StageList = SmallVec<[StageId; 12]>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    stages: StageList,
    writes: ResourceSet,
}

impl Batch {
    pub fn stages(&self) -> &[StageId] {
        &self.stages
    }

    pub fn writes(&self) -> ResourceSet {
        self.writes
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameSchedule {
    batches: Vec<Batch>,
}

impl FrameSchedule {
    /// Orders `stages` as given and opens a new batch at every read-after-write hazard.
    pub fn build(stages: impl IntoIterator<Item = StageId>) -> Self {
        let mut batches: Vec<Batch> = Vec::new();
        for stage in stages {
            let needs_barrier = match batches.last() {
                Some(batch) => stage.reads().intersects(batch.writes),
                None => true,
            };
            if needs_barrier {
                batches.push(Batch::default());
            }
            if let Some(batch) = batches.last_mut() {
                batch.stages.push(stage);
                batch.writes |= stage.writes();
            }
        }
        Self { batches }
    }

    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    /// Synchronization points between batches.
    pub fn barrier_count(&self) -> usize {
        self.batches.len().saturating_sub(1)
    }

    pub fn stages(&self) -> impl Iterator<Item = StageId> + '_ {
        self.batches.iter().flat_map(|batch| batch.stages.iter().copied())
    }

    pub fn batch_of(&self, stage: StageId) -> Option<usize> {
        self.batches.iter().position(|batch| batch.stages.contains(&stage))
    }

    /// Checks that no stage consumes a resource produced inside its own batch.
    pub fn validate(&self) -> Result<(), IblError> {
        for batch in &self.batches {
            let mut written = ResourceSet::empty();
            for stage in &batch.stages {
                let hazard = stage.reads() & written;
                if !hazard.is_empty() {
                    return Err(IblError::UnsynchronizedRead { stage: *stage, resources: hazard });
                }
                written |= stage.writes();
            }
        }
        Ok(())
    }

    pub fn summary(&self) -> String {
        self.batches
            .iter()
            .map(|batch| {
                let names: Vec<String> = batch.stages.iter().map(|stage| format!("{stage:?}")).collect();
                format!("[{}]", names.join(", "))
            })
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn precompute_stages(env_mips: u32, prefilter_mips: u32) -> Vec<StageId> {
        let mut stages = vec![StageId::ConvertPanorama];
        stages.extend((1..env_mips).map(StageId::EnvMip));
        stages.extend([StageId::ProjectSh, StageId::ReduceSh]);
        stages.extend((0..prefilter_mips).map(StageId::Prefilter));
        stages.extend([StageId::RenderScene, StageId::RenderSkybox, StageId::DebugOverlay]);
        stages
    }

    #[test]
    fn barriers_separate_producers_from_consumers() {
        let schedule = FrameSchedule::build(precompute_stages(3, 7));
        schedule.validate().expect("schedule is synchronized");
        let batch = |stage| schedule.batch_of(stage).expect("stage scheduled");
        assert!(batch(StageId::ConvertPanorama) < batch(StageId::EnvMip(1)));
        assert!(batch(StageId::EnvMip(1)) < batch(StageId::EnvMip(2)));
        assert!(batch(StageId::EnvMip(2)) < batch(StageId::ProjectSh));
        assert!(batch(StageId::ProjectSh) < batch(StageId::ReduceSh));
        assert!(batch(StageId::Prefilter(0)) < batch(StageId::RenderScene));
        assert!(batch(StageId::ReduceSh) < batch(StageId::RenderScene));
    }

    #[test]
    fn prefilter_mips_share_one_batch() {
        let schedule = FrameSchedule::build(precompute_stages(2, 7));
        let first = schedule.batch_of(StageId::Prefilter(0));
        assert!((1..7).all(|mip| schedule.batch_of(StageId::Prefilter(mip)) == first));
        assert_eq!(schedule.batch_of(StageId::ReduceSh), first);
    }

    #[test]
    fn converting_frame_has_expected_barrier_count() {
        // convert | mip 1 | mip 2 | project | reduce + prefilter | scene + skybox + overlay
        let schedule = FrameSchedule::build(precompute_stages(3, 7));
        assert_eq!(schedule.batches().len(), 6);
        assert_eq!(schedule.barrier_count(), 5);
        assert_eq!(schedule.stages().count(), precompute_stages(3, 7).len());
    }

    #[test]
    fn independent_stages_need_no_barrier() {
        let schedule = FrameSchedule::build([StageId::IntegrateBrdf, StageId::ProjectSh]);
        assert_eq!(schedule.barrier_count(), 0);
    }

    #[test]
    fn validate_flags_hand_built_hazards() {
        let mut batch = Batch::default();
        batch.stages.push(StageId::ProjectSh);
        batch.writes |= StageId::ProjectSh.writes();
        batch.stages.push(StageId::ReduceSh);
        let schedule = FrameSchedule { batches: vec![batch] };
        let err = schedule.validate().expect_err("reduce reads projection output");
        assert!(matches!(err, IblError::UnsynchronizedRead { stage: StageId::ReduceSh, .. }));
    }

    #[test]
    fn summary_lists_batches_in_order() {
        let schedule = FrameSchedule::build([StageId::ProjectSh, StageId::ReduceSh]);
        assert_eq!(schedule.summary(), "[ProjectSh] | [ReduceSh]");
    }
}
