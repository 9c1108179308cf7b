pub mod app;
pub mod camera3d;
pub mod cli;
pub mod config;
pub mod error;
pub mod ibl;
pub mod input;
pub mod mesh;
pub mod orchestrator;
pub mod renderer;
pub mod schedule;
pub mod sky;
pub mod time;

pub use app::{run, run_with_overrides, App};
pub use error::IblError;
pub use orchestrator::FrameOrchestrator;

pub(crate) fn wrap_angle(mut radians: f32) -> f32 {
    let two_pi = 2.0 * std::f32::consts::PI;
    while radians > std::f32::consts::PI {
        radians -= two_pi;
    }
    while radians < -std::f32::consts::PI {
        radians += two_pi;
    }
    radians
}
