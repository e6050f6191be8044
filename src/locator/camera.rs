//! Calibrated transforms between the LiDAR, camera, image and world frames.

use nalgebra::{Matrix3, Matrix4, Point3, Vector3};

use crate::error::Error;
use crate::rect::Rect;

/// Camera intrinsic/extrinsic bundle with the derived inverse transforms.
///
/// All derived matrices are computed once at construction. Pixel coordinates
/// produced and consumed here are in the zoomed depth-image resolution.
#[derive(Debug, Clone)]
pub struct CameraGeometry {
    intrinsic: Matrix3<f32>,
    intrinsic_inv: Matrix3<f32>,
    lidar_to_camera: Matrix4<f32>,
    camera_to_lidar_rotation: Matrix3<f32>,
    camera_to_lidar_translation: Vector3<f32>,
    camera_to_world: Matrix4<f32>,
    zoom_factor: f32,
    zoomed_width: usize,
    zoomed_height: usize,
}

impl CameraGeometry {
    pub fn new(
        image_width: usize,
        image_height: usize,
        intrinsic: Matrix3<f32>,
        lidar_to_camera: Matrix4<f32>,
        world_to_camera: Matrix4<f32>,
        zoom_factor: f32,
    ) -> Result<Self, Error> {
        let intrinsic_inv = intrinsic
            .try_inverse()
            .ok_or(Error::SingularTransform("intrinsic"))?;
        let camera_to_lidar = lidar_to_camera
            .try_inverse()
            .ok_or(Error::SingularTransform("lidar_to_camera"))?;
        let camera_to_world = world_to_camera
            .try_inverse()
            .ok_or(Error::SingularTransform("world_to_camera"))?;

        let camera_to_lidar_rotation: Matrix3<f32> =
            camera_to_lidar.fixed_view::<3, 3>(0, 0).into_owned();
        let camera_to_lidar_translation: Vector3<f32> =
            camera_to_lidar.fixed_view::<3, 1>(0, 3).into_owned();

        Ok(Self {
            intrinsic,
            intrinsic_inv,
            lidar_to_camera,
            camera_to_lidar_rotation,
            camera_to_lidar_translation,
            camera_to_world,
            zoom_factor,
            zoomed_width: (image_width as f32 * zoom_factor) as usize,
            zoomed_height: (image_height as f32 * zoom_factor) as usize,
        })
    }

    pub fn zoomed_width(&self) -> usize {
        self.zoomed_width
    }

    pub fn zoomed_height(&self) -> usize {
        self.zoomed_height
    }

    /// Project a LiDAR-frame point into zoomed pixel coordinates.
    ///
    /// Returns `(u, v, depth)` where depth is the raw camera-frame Z; callers
    /// must reject non-positive depths and out-of-image pixels themselves.
    pub fn lidar_to_camera(&self, point: &Point3<f32>) -> (f32, f32, f32) {
        let camera = (self.lidar_to_camera * point.to_homogeneous()).xyz();
        let pixel = self.intrinsic * camera;
        let depth = pixel.z;
        (
            pixel.x * self.zoom_factor / depth,
            pixel.y * self.zoom_factor / depth,
            depth,
        )
    }

    /// Back-project a zoomed pixel with known depth into the LiDAR frame.
    pub fn camera_to_lidar(&self, u: f32, v: f32, depth: f32) -> Point3<f32> {
        let pixel = Vector3::new(u / self.zoom_factor, v / self.zoom_factor, 1.0);
        let camera = self.intrinsic_inv * pixel * depth;
        Point3::from(self.camera_to_lidar_rotation * (camera + self.camera_to_lidar_translation))
    }

    /// Map a LiDAR-frame point into the world frame.
    pub fn lidar_to_world(&self, point: &Point3<f32>) -> Point3<f32> {
        let world = self.camera_to_world * self.lidar_to_camera * point.to_homogeneous();
        Point3::new(world.x, world.y, world.z)
    }

    /// Scale a full-resolution rectangle into the zoomed image and clip it
    /// to the image bounds.
    pub fn zoom_rect(&self, rect: &Rect) -> Rect {
        let image = Rect::new(0.0, 0.0, self.zoomed_width as f32, self.zoomed_height as f32);
        rect.scale(self.zoom_factor).intersection(&image)
    }
}
