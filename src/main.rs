use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use nalgebra::Vector3;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vio_backend::backend::{
    BackendConfig, GraphLedger, IncrementalEstimationDriver, KeyframeInput, VisionUpdate,
};
use vio_backend::geometry::{StereoCamera, SE3};
use vio_backend::imu::{ImuBias, ImuParams, ImuSample, NavState, Timestamp};
use vio_backend::landmarks::{LandmarkId, PlaneId, StereoObservation};
use vio_backend::lifecycle::PlaneRegion;
use vio_backend::system::SharedState;

const KEYFRAME_CHANNEL_CAPACITY: usize = 4;
const KEYFRAME_PERIOD_NS: Timestamp = 200_000_000;
const IMU_PERIOD_NS: Timestamp = 5_000_000;
const SPEED: f64 = 0.5;
const WALL_DEPTH: f64 = 4.0;
const IMAGE_WIDTH: f64 = 752.0;
const IMAGE_HEIGHT: f64 = 480.0;

/// Synthetic rig sliding along x in front of a textured wall.
struct Scene {
    camera: StereoCamera,
    gravity: Vector3<f64>,
    wall: Vec<Vector3<f64>>,
}

impl Scene {
    fn new(camera: StereoCamera, gravity: Vector3<f64>) -> Self {
        let wall = (0..40)
            .flat_map(|i| (0..5).map(move |j| (i, j)))
            .map(|(i, j)| Vector3::new(-1.0 + 0.25 * i as f64, -0.8 + 0.4 * j as f64, WALL_DEPTH))
            .collect();
        Self {
            camera,
            gravity,
            wall,
        }
    }

    fn pose_at(t_ns: Timestamp) -> SE3 {
        SE3::from_translation(Vector3::new(SPEED * t_ns as f64 * 1e-9, 0.0, 0.0))
    }

    fn imu_at(&self, t_ns: Timestamp) -> ImuSample {
        ImuSample::new(t_ns, -self.gravity, Vector3::zeros())
    }

    fn keyframe(&self, t_ns: Timestamp) -> KeyframeInput {
        let cam_t_world = self.camera.camera_pose(&Self::pose_at(t_ns)).inverse();
        let mut observations = Vec::new();
        for (i, point) in self.wall.iter().enumerate() {
            let Some(uvr) = self.camera.project(&cam_t_world.transform_point(point)) else {
                continue;
            };
            let (u_left, u_right, v) = (uvr.x, uvr.y, uvr.z);
            if !(0.0..IMAGE_WIDTH).contains(&u_left) || !(0.0..IMAGE_HEIGHT).contains(&v) {
                continue;
            }
            let observation = if (0.0..IMAGE_WIDTH).contains(&u_right) {
                StereoObservation::stereo(u_left, v, u_right)
            } else {
                StereoObservation::mono(u_left, v)
            };
            observations.push((LandmarkId(i as u64), observation));
        }

        let members: Vec<LandmarkId> = observations.iter().map(|(id, _)| *id).collect();
        let mut input = KeyframeInput::new(
            t_ns,
            VisionUpdate {
                observations,
                ..VisionUpdate::default()
            },
        );
        input.planes = PlaneRegion::new(PlaneId(0), Vector3::z(), WALL_DEPTH, members)
            .into_iter()
            .collect();
        input
    }
}

/// Spawn the acquisition role: streams IMU into the shared state and emits
/// a keyframe every period.
fn spawn_acquisition(
    scene: Arc<Scene>,
    shared: Arc<SharedState>,
    kf_sender: Sender<KeyframeInput>,
    keyframes: u64,
) -> JoinHandle<Result<()>> {
    thread::spawn(move || {
        let end = keyframes.saturating_sub(1) * KEYFRAME_PERIOD_NS;
        let mut t = 0;
        while t <= end && !shared.is_shutdown_requested() {
            shared.push_imu(scene.imu_at(t))?;
            if t % KEYFRAME_PERIOD_NS == 0 && kf_sender.send(scene.keyframe(t)).is_err() {
                break;
            }
            t += IMU_PERIOD_NS;
        }
        Ok(())
    })
}

fn run(mut driver: IncrementalEstimationDriver, kf_receiver: Receiver<KeyframeInput>) -> Result<()> {
    let mut engine = GraphLedger::new();
    for input in kf_receiver {
        let timestamp = input.timestamp_ns;
        match driver.step(input, &mut engine) {
            Ok(update) => {
                let truth = Scene::pose_at(timestamp).translation;
                info!(
                    "{} pos=[{:.3}, {:.3}, {:.3}] err={:.2e} landmarks={} planes={} factors={}",
                    update.keyframe,
                    update.pose.translation.x,
                    update.pose.translation.y,
                    update.pose.translation.z,
                    (update.pose.translation - truth).norm(),
                    update.landmarks.len(),
                    update.planes.len(),
                    engine.len()
                );
            }
            Err(e) => warn!("Keyframe at {} ns dropped: {}", timestamp, e),
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let keyframes = std::env::args()
        .nth(1)
        .map(|s| s.parse::<u64>())
        .transpose()
        .context("keyframe count must be an integer")?
        .unwrap_or(25);

    let params = ImuParams::default();
    let config = BackendConfig::default();
    let scene = Arc::new(Scene::new(config.camera, params.gravity));
    let shared = SharedState::new(params, ImuBias::zero());

    let initial = NavState::new(SE3::identity(), Vector3::new(SPEED, 0.0, 0.0));
    let driver = IncrementalEstimationDriver::new(config, Arc::clone(&shared), initial);

    let (kf_sender, kf_receiver) = bounded::<KeyframeInput>(KEYFRAME_CHANNEL_CAPACITY);
    let acquisition = spawn_acquisition(scene, Arc::clone(&shared), kf_sender, keyframes);

    let result = run(driver, kf_receiver);
    shared.request_shutdown();
    match acquisition.join() {
        Ok(acquired) => acquired?,
        Err(_) => anyhow::bail!("acquisition thread panicked"),
    }
    result?;

    info!("Done! Processed {} keyframes", keyframes);
    Ok(())
}
