//! Robot localization by LiDAR/camera fusion.

use std::collections::{BTreeMap, HashMap};

use nalgebra::{Matrix3, Matrix4, Point3, Vector3};
use ndarray::Array2;
use rayon::prelude::*;
use tracing::warn;

use crate::error::Error;
use crate::locator::background::DepthBackground;
use crate::locator::camera::CameraGeometry;
use crate::locator::clustering::{euclidean_clusters, ClusterParams};
use crate::robot::Robot;

/// Construction parameters for the [`Locator`].
///
/// Depth thresholds, the cluster tolerance and `max_distance` are in the
/// point cloud's raw units; calibration matrices come straight from the
/// camera/LiDAR calibration.
#[derive(Debug, Clone)]
pub struct LocatorConfig {
    pub image_width: usize,
    pub image_height: usize,
    pub intrinsic: Matrix3<f32>,
    pub lidar_to_camera: Matrix4<f32>,
    pub world_to_camera: Matrix4<f32>,
    /// Shrinks the working depth image for throughput, in (0, 1]
    pub zoom_factor: f32,
    /// Number of recent depth frames diffed against the background
    pub queue_size: usize,
    /// Minimum background-minus-depth delta considered foreground
    pub min_depth_diff: f32,
    /// Maximum background-minus-depth delta considered foreground
    pub max_depth_diff: f32,
    pub cluster_tolerance: f32,
    pub min_cluster_size: usize,
    pub max_cluster_size: usize,
    /// Points farther than this along LiDAR x are ignored
    pub max_distance: f32,
}

/// Fuses image-space bounding boxes with LiDAR point clouds to place robots
/// in the world frame.
///
/// Per tick: `update` projects the cloud and refreshes the depth-diff model,
/// `cluster` segments the foreground, `search` picks each robot's point
/// subset and writes its world-frame location.
pub struct Locator {
    geometry: CameraGeometry,
    min_depth_diff: f32,
    max_depth_diff: f32,
    max_distance: f32,
    cluster_params: ClusterParams,
    depth_image: Array2<f32>,
    diff_depth_image: Array2<f32>,
    background: DepthBackground,
    foreground: Vec<Point3<f32>>,
    pixel_index_map: HashMap<(usize, usize), usize>,
    index_cluster_map: HashMap<usize, usize>,
}

impl Locator {
    pub fn new(config: LocatorConfig) -> Result<Self, Error> {
        let geometry = CameraGeometry::new(
            config.image_width,
            config.image_height,
            config.intrinsic,
            config.lidar_to_camera,
            config.world_to_camera,
            config.zoom_factor,
        )?;
        let shape = (geometry.zoomed_height(), geometry.zoomed_width());

        Ok(Self {
            min_depth_diff: config.min_depth_diff,
            max_depth_diff: config.max_depth_diff,
            max_distance: config.max_distance,
            cluster_params: ClusterParams {
                tolerance: config.cluster_tolerance,
                min_cluster_size: config.min_cluster_size,
                max_cluster_size: config.max_cluster_size,
            },
            depth_image: Array2::zeros(shape),
            diff_depth_image: Array2::zeros(shape),
            background: DepthBackground::new(shape.0, shape.1, config.queue_size),
            foreground: Vec::new(),
            pixel_index_map: HashMap::new(),
            index_cluster_map: HashMap::new(),
            geometry,
        })
    }

    /// Depth of the current frame at each zoomed pixel (0 where unseen).
    pub fn depth_image(&self) -> &Array2<f32> {
        &self.depth_image
    }

    /// Foreground depths surviving the background diff (0 elsewhere).
    pub fn diff_depth_image(&self) -> &Array2<f32> {
        &self.diff_depth_image
    }

    /// Per-pixel maximum depth ever observed.
    pub fn background_depth_image(&self) -> &Array2<f32> {
        self.background.background()
    }

    /// Ingest one point cloud: refresh the depth image, raise the background
    /// model and rebuild the foreground diff over the frame queue.
    pub fn update(&mut self, cloud: &[Point3<f32>]) {
        self.depth_image.fill(0.0);
        self.diff_depth_image.fill(0.0);

        if cloud.is_empty() {
            warn!("point cloud is empty");
            return;
        }

        let width = self.geometry.zoomed_width();
        let height = self.geometry.zoomed_height();
        let geometry = &self.geometry;
        let max_distance = self.max_distance;

        let projected: Vec<(usize, usize, f32)> = cloud
            .par_iter()
            .filter_map(|point| {
                if point.x == 0.0 && point.y == 0.0 && point.z == 0.0 {
                    return None;
                }
                if point.x > max_distance {
                    return None;
                }
                let (u, v, depth) = geometry.lidar_to_camera(point);
                if depth <= 0.0 || u < 0.0 || v < 0.0 {
                    return None;
                }
                let (u, v) = (u as usize, v as usize);
                if u >= width || v >= height {
                    return None;
                }
                Some((v, u, depth))
            })
            .collect();

        for (v, u, depth) in projected {
            self.background.observe_max(v, u, depth);
            self.depth_image[[v, u]] = depth;
        }

        self.background.push_frame(self.depth_image.clone());
        self.background
            .rebuild_diff(&mut self.diff_depth_image, self.min_depth_diff, self.max_depth_diff);
    }

    /// Segment the foreground diff into Euclidean clusters.
    ///
    /// Rebuilds the pixel-to-point and point-to-cluster maps that `search`
    /// reads; must run after `update` and before `search` each tick.
    pub fn cluster(&mut self) {
        self.foreground.clear();
        self.pixel_index_map.clear();
        self.index_cluster_map.clear();

        for ((v, u), &depth) in self.diff_depth_image.indexed_iter() {
            if depth == 0.0 {
                continue;
            }
            self.foreground
                .push(self.geometry.camera_to_lidar(u as f32, v as f32, depth));
            self.pixel_index_map.insert((u, v), self.foreground.len() - 1);
        }

        if self.foreground.is_empty() {
            return;
        }

        let clusters = euclidean_clusters(&self.foreground, &self.cluster_params);
        for (cluster_id, members) in clusters.iter().enumerate() {
            for &index in members {
                self.index_cluster_map.insert(index, cluster_id);
            }
        }
    }

    /// Locate every robot that has an image rectangle. Large locator state
    /// is read-only here, so robots fan out in parallel.
    pub fn search(&self, robots: &mut [Robot]) {
        robots.par_iter_mut().for_each(|robot| self.search_one(robot));
    }

    /// Locate a single robot from the foreground pixels inside its box.
    ///
    /// Candidate points are grouped by cluster id (`-1` for unclustered);
    /// the most populated group wins and its centroid, mapped to the world
    /// frame, becomes the robot location. Missing inputs leave the robot
    /// unlocated.
    fn search_one(&self, robot: &mut Robot) {
        let Some(rect) = robot.rect() else {
            return;
        };
        let rect = self.geometry.zoom_rect(&rect);
        if rect.is_empty() {
            return;
        }

        let mut candidates: BTreeMap<i32, Vec<Point3<f32>>> = BTreeMap::new();

        let (v_begin, v_end) = (rect.y as usize, rect.bottom() as usize);
        let (u_begin, u_end) = (rect.x as usize, rect.right() as usize);
        for v in v_begin..v_end.min(self.geometry.zoomed_height()) {
            for u in u_begin..u_end.min(self.geometry.zoomed_width()) {
                let depth = self.diff_depth_image[[v, u]];
                if depth == 0.0 {
                    continue;
                }
                let Some(&index) = self.pixel_index_map.get(&(u, v)) else {
                    continue;
                };
                let cluster_id = self
                    .index_cluster_map
                    .get(&index)
                    .map_or(-1, |&id| id as i32);
                candidates
                    .entry(cluster_id)
                    .or_default()
                    .push(self.geometry.camera_to_lidar(u as f32, v as f32, depth));
            }
        }

        // Key-ordered iteration makes ties deterministic.
        let Some(points) = candidates.values().max_by_key(|points| points.len()) else {
            return;
        };
        let centroid = points
            .iter()
            .fold(Vector3::zeros(), |sum, p| sum + p.coords)
            / points.len() as f32;

        robot.set_location(self.geometry.lidar_to_world(&Point3::from(centroid)));
    }
}
