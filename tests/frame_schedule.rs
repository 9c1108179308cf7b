use runtime_ibl::schedule::{FrameSchedule, ResourceSet, StageId, StageKind};

fn full_frame(env_mips: u32, prefilter_mips: u32) -> Vec<StageId> {
    let mut stages = vec![StageId::ConvertPanorama];
    stages.extend((1..env_mips).map(StageId::EnvMip));
    stages.extend([StageId::ProjectSh, StageId::ReduceSh]);
    stages.extend((0..prefilter_mips).map(StageId::Prefilter));
    stages.extend([StageId::RenderScene, StageId::RenderSkybox, StageId::DebugOverlay]);
    stages
}

#[test]
fn every_consumer_lands_after_its_producer() {
    let stages = full_frame(10, 7);
    let schedule = FrameSchedule::build(stages.clone());
    schedule.validate().expect("schedule has no hazards");
    assert_eq!(schedule.stages().collect::<Vec<_>>(), stages, "order is preserved");

    for consumer in &stages {
        for producer in &stages {
            if consumer == producer || !consumer.reads().intersects(producer.writes()) {
                continue;
            }
            let (Some(c), Some(p)) = (schedule.batch_of(*consumer), schedule.batch_of(*producer)) else {
                panic!("stage missing from schedule");
            };
            let consumer_index = stages.iter().position(|s| s == consumer);
            let producer_index = stages.iter().position(|s| s == producer);
            if producer_index < consumer_index {
                assert!(p < c, "{producer:?} must be in an earlier batch than {consumer:?}");
            }
        }
    }
}

#[test]
fn prefilter_levels_share_a_batch() {
    let schedule = FrameSchedule::build(full_frame(4, 5));
    let first = schedule.batch_of(StageId::Prefilter(0));
    assert!(first.is_some());
    assert!((1..5).all(|mip| schedule.batch_of(StageId::Prefilter(mip)) == first));
    let render = schedule.batch_of(StageId::RenderScene);
    assert_eq!(schedule.batch_of(StageId::RenderSkybox), render);
    assert_eq!(schedule.batch_of(StageId::DebugOverlay), render);
    assert_ne!(render, first);
}

#[test]
fn render_only_frames_need_no_barrier() {
    let schedule = FrameSchedule::build([StageId::RenderScene, StageId::RenderSkybox]);
    assert_eq!(schedule.barrier_count(), 0);
    assert!(schedule.batches()[0].writes().contains(ResourceSet::FRAME_COLOR));
    assert_eq!(StageId::RenderScene.kind(), StageKind::Render);
    assert_eq!(StageId::ReduceSh.kind(), StageKind::Compute);
}

#[test]
fn sky_capture_reads_only_the_tables() {
    assert_eq!(StageId::ConvertSky.reads(), ResourceSet::SKY_TABLES);
    assert!(StageId::ConvertSky.writes().contains(ResourceSet::ENV_CUBEMAP));
    let schedule = FrameSchedule::build([StageId::ConvertSky, StageId::EnvMip(1), StageId::ProjectSh]);
    assert_eq!(schedule.barrier_count(), 2);
    assert!(schedule.validate().is_ok());
}
