//! End-to-end scenarios over a synthetic calibrated scene.
//!
//! The scene: camera co-located with the LiDAR, optical axis along LiDAR +X
//! (world frame == LiDAR frame). A flat wall at 12 m plays the static
//! background; a small point blob at 10 m plays a robot.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use approx::assert_relative_eq;
use nalgebra::{Matrix3, Matrix4, Point3};
use radar_core::referee::{build_frame, CommandCode, MapRobot};
use radar_core::{
    Detection, Locator, LocatorConfig, RadarPipeline, RefereeCommunicator, Robot, RobotTracker,
    SerialDevice, TrackState, TrackerConfig,
};

const FOCAL: f32 = 1000.0;
const CENTER_X: f32 = 640.0;
const CENTER_Y: f32 = 360.0;

/// camera x = -lidar y, camera y = -lidar z, camera z = lidar x.
fn axis_swap() -> Matrix4<f32> {
    Matrix4::new(
        0.0, -1.0, 0.0, 0.0, //
        0.0, 0.0, -1.0, 0.0, //
        1.0, 0.0, 0.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    )
}

fn make_locator() -> Locator {
    let config = LocatorConfig {
        image_width: 1280,
        image_height: 720,
        intrinsic: Matrix3::new(
            FOCAL, 0.0, CENTER_X, //
            0.0, FOCAL, CENTER_Y, //
            0.0, 0.0, 1.0,
        ),
        lidar_to_camera: axis_swap(),
        world_to_camera: axis_swap(),
        zoom_factor: 0.5,
        queue_size: 3,
        min_depth_diff: 0.5,
        max_depth_diff: 4.0,
        cluster_tolerance: 0.2,
        min_cluster_size: 5,
        max_cluster_size: 10_000,
        max_distance: 30.0,
    };
    Locator::new(config).unwrap()
}

fn make_tracker() -> RobotTracker {
    RobotTracker::new(TrackerConfig {
        init_thresh: 4,
        miss_thresh: 3,
        ..Default::default()
    })
}

/// Wall at x = 12 m spanning +-1 m, dense enough to cover the robot's pixels.
fn wall_cloud() -> Vec<Point3<f32>> {
    let mut cloud = Vec::new();
    let mut y = -1.0f32;
    while y <= 1.0 {
        let mut z = -1.0f32;
        while z <= 1.0 {
            cloud.push(Point3::new(12.0, y, z));
            z += 0.02;
        }
        y += 0.02;
    }
    cloud
}

/// Robot-sized blob at (10 + dx, 0, 0), 0.6 m across.
fn robot_blob(dx: f32) -> Vec<Point3<f32>> {
    let mut cloud = Vec::new();
    let mut y = -0.3f32;
    while y <= 0.3 {
        let mut z = -0.3f32;
        while z <= 0.3 {
            cloud.push(Point3::new(10.0 + dx, y, z));
            z += 0.05;
        }
        y += 0.05;
    }
    cloud
}

/// Full-resolution bounding box containing the blob's projection.
fn robot_detection() -> Detection {
    // The blob projects to roughly u in [610, 670], v in [330, 390].
    Detection::new(600.0, 320.0, 80.0, 80.0, 0, 0.9)
}

fn make_robot(label: i32) -> Robot {
    let car = robot_detection();
    let armor = Detection::new(10.0, 10.0, 12.0, 12.0, label, 0.9);
    Robot::new(&car, &[armor])
}

/// One locate pass: background wall first, then wall + robot blob.
fn locate_tick(locator: &mut Locator, robots: &mut [Robot], dx: f32) {
    let mut cloud = wall_cloud();
    cloud.extend(robot_blob(dx));
    locator.update(&cloud);
    locator.cluster();
    locator.search(robots);
}

#[test]
fn cold_start_locates_and_births_track_zero() {
    let mut locator = make_locator();
    let mut tracker = make_tracker();

    // Let the background model learn the wall.
    locator.update(&wall_cloud());
    locator.cluster();

    let mut robots = vec![make_robot(1)];
    locate_tick(&mut locator, &mut robots, 0.0);

    let location = robots[0].location().expect("robot should be located");
    assert_relative_eq!(location.x, 10.0, epsilon = 0.1);
    assert_relative_eq!(location.y, 0.0, epsilon = 0.1);
    assert_relative_eq!(location.z, 0.0, epsilon = 0.1);

    tracker.update(&mut robots, 0.0);
    assert_eq!(tracker.tracks().len(), 1);
    assert_eq!(tracker.tracks()[0].track_id(), 0);
    assert_eq!(robots[0].track_state(), Some(TrackState::Tentative));
}

#[test]
fn track_confirms_after_init_thresh_ticks() {
    let mut locator = make_locator();
    let mut tracker = make_tracker();

    locator.update(&wall_cloud());
    locator.cluster();

    for tick in 0..4u32 {
        let mut robots = vec![make_robot(1)];
        // Small motion between ticks.
        locate_tick(&mut locator, &mut robots, tick as f32 * 0.02);
        tracker.update(&mut robots, tick as f64 * 0.1);

        let expected = if tick < 3 {
            TrackState::Tentative
        } else {
            TrackState::Confirmed
        };
        assert_eq!(robots[0].track_state(), Some(expected), "tick {tick}");
    }
}

#[test]
fn confirmed_track_dies_after_miss_thresh_misses() {
    let mut locator = make_locator();
    let mut tracker = make_tracker();

    locator.update(&wall_cloud());
    locator.cluster();

    for tick in 0..4u32 {
        let mut robots = vec![make_robot(1)];
        locate_tick(&mut locator, &mut robots, 0.0);
        tracker.update(&mut robots, tick as f64 * 0.1);
    }
    assert_eq!(tracker.tracks()[0].state(), TrackState::Confirmed);

    // Misses 1 and 2 are tolerated (miss_thresh = 3), the third kills.
    tracker.update(&mut [], 0.4);
    tracker.update(&mut [], 0.5);
    assert_eq!(tracker.tracks().len(), 1);
    tracker.update(&mut [], 0.6);
    assert!(tracker.tracks().is_empty());
}

#[test]
fn confirmed_track_pins_the_label() {
    let mut locator = make_locator();
    let mut tracker = make_tracker();

    locator.update(&wall_cloud());
    locator.cluster();

    for tick in 0..4u32 {
        let mut robots = vec![make_robot(3)];
        locate_tick(&mut locator, &mut robots, 0.0);
        tracker.update(&mut robots, tick as f64 * 0.1);
    }

    // The detector now votes label 5; the confirmed track overrules it.
    let mut robots = vec![make_robot(5)];
    locate_tick(&mut locator, &mut robots, 0.0);
    tracker.update(&mut robots, 0.4);
    assert_eq!(robots[0].label(), Some(3));
    assert_eq!(robots[0].track_state(), Some(TrackState::Confirmed));
}

#[test]
fn empty_cloud_is_harmless() {
    let mut locator = make_locator();

    locator.update(&[]);
    locator.cluster();

    assert!(locator.depth_image().iter().all(|&d| d == 0.0));
    assert!(locator.diff_depth_image().iter().all(|&d| d == 0.0));

    let mut robots = vec![make_robot(1)];
    locator.search(&mut robots);
    assert!(robots[0].location().is_none());
    assert!(!robots[0].is_located());
}

#[test]
fn unclustered_points_can_still_win() {
    // A locator whose min_cluster_size is huge never forms clusters, so
    // every candidate lands in the unclustered bucket; the robot must still
    // be located from it.
    let config = LocatorConfig {
        image_width: 1280,
        image_height: 720,
        intrinsic: Matrix3::new(
            FOCAL, 0.0, CENTER_X, //
            0.0, FOCAL, CENTER_Y, //
            0.0, 0.0, 1.0,
        ),
        lidar_to_camera: axis_swap(),
        world_to_camera: axis_swap(),
        zoom_factor: 0.5,
        queue_size: 3,
        min_depth_diff: 0.5,
        max_depth_diff: 4.0,
        cluster_tolerance: 0.2,
        min_cluster_size: 100_000,
        max_cluster_size: 200_000,
        max_distance: 30.0,
    };
    let mut locator = Locator::new(config).unwrap();

    locator.update(&wall_cloud());
    locator.cluster();

    let mut robots = vec![make_robot(1)];
    locate_tick(&mut locator, &mut robots, 0.0);

    let location = robots[0].location().expect("unclustered candidates win");
    assert_relative_eq!(location.x, 10.0, epsilon = 0.1);
}

/// In-memory serial channel for driving the full pipeline.
#[derive(Clone, Default)]
struct LoopbackDevice {
    rx: Arc<Mutex<VecDeque<u8>>>,
    tx: Arc<Mutex<Vec<u8>>>,
}

impl SerialDevice for LoopbackDevice {
    fn open(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut rx = self.rx.lock().unwrap();
        let mut count = 0;
        while count < buf.len() {
            match rx.pop_front() {
                Some(byte) => {
                    buf[count] = byte;
                    count += 1;
                }
                None => break,
            }
        }
        Ok(count)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.tx.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn is_open(&self) -> bool {
        true
    }
}

#[test]
fn full_pipeline_reports_located_enemies() {
    let device = LoopbackDevice::default();
    let referee = RefereeCommunicator::new(device.clone());

    // Tell the station it is the red radar (id 9) so blue robots are enemies.
    let mut status = vec![9u8, 1];
    status.extend_from_slice(&[0; 11]);
    device
        .rx
        .lock()
        .unwrap()
        .extend(build_frame(CommandCode::RobotStatus, 0, &status));

    let mut pipeline = RadarPipeline::new(make_locator(), make_tracker(), referee);
    pipeline.poll_referee();
    pipeline.poll_referee();

    // Background pass, then a frame with a blue robot blob in view.
    pipeline.process_frame(&[], &wall_cloud(), 0.0);

    let mut cloud = wall_cloud();
    cloud.extend(robot_blob(0.0));
    let detections = vec![(
        robot_detection(),
        vec![Detection::new(10.0, 10.0, 12.0, 12.0, 1, 0.9)], // blue engineer
    )];
    let robots = pipeline.process_frame(&detections, &cloud, 0.1);

    assert_eq!(robots.len(), 1);
    let location = robots[0].location().expect("pipeline locates the robot");
    assert_relative_eq!(location.x, 10.0, epsilon = 0.1);
    assert_eq!(robots[0].track_state(), Some(TrackState::Tentative));

    // One map frame on the wire for the enemy robot.
    let sent = device.tx.lock().unwrap().clone();
    assert_eq!(sent.len(), 15);
    let payload = MapRobot::from_bytes(&sent[7..13]).expect("map payload parses");
    assert_eq!(payload.target_robot_id, 102);
    assert_relative_eq!(payload.position_x_cm as f32, 1000.0, epsilon = 10.0);
}

#[test]
fn background_model_survives_robot_passing() {
    let mut locator = make_locator();

    locator.update(&wall_cloud());
    locator.cluster();
    let background_before = locator.background_depth_image().clone();

    let mut robots = vec![make_robot(1)];
    locate_tick(&mut locator, &mut robots, 0.0);

    // The shallower robot must not erode the learned background.
    let background_after = locator.background_depth_image();
    for (before, after) in background_before.iter().zip(background_after.iter()) {
        assert!(after >= before);
    }
}
