//! Kalman filter over a Singer maneuvering-target model.
//!
//! The state is position, velocity and exponentially correlated acceleration
//! per axis, laid out in per-axis blocks: `[x vx ax  y vy ay  z vz az]`.
//! Acceleration decorrelates with time constant `tau`; its stationary
//! magnitude is bounded by `max_acceleration`.

use nalgebra::{Matrix3, Point3, SMatrix, SVector, Vector3};

/// Filter state dimension (3 axes x position/velocity/acceleration).
const STATE_DIM: usize = 9;

pub type StateVec = SVector<f32, STATE_DIM>;
pub type StateCov = SMatrix<f32, STATE_DIM, STATE_DIM>;

#[derive(Debug, Clone)]
pub struct SingerFilter {
    mean: StateVec,
    covariance: StateCov,
    max_acceleration: f32,
    tau: f32,
    observation_noise: Vector3<f32>,
}

impl SingerFilter {
    /// Initialize the filter from a first position observation. Velocity and
    /// acceleration start at zero with generous uncertainty.
    pub fn new(
        location: Point3<f32>,
        max_acceleration: f32,
        tau: f32,
        observation_noise: Vector3<f32>,
    ) -> Self {
        let mut mean = StateVec::zeros();
        let mut covariance = StateCov::zeros();
        for axis in 0..3 {
            let base = axis * 3;
            mean[base] = location[axis];

            let position_var = observation_noise[axis] * observation_noise[axis];
            let velocity_var = (max_acceleration * tau) * (max_acceleration * tau);
            let acceleration_var = max_acceleration * max_acceleration;
            covariance[(base, base)] = position_var;
            covariance[(base + 1, base + 1)] = velocity_var;
            covariance[(base + 2, base + 2)] = acceleration_var;
        }

        Self {
            mean,
            covariance,
            max_acceleration,
            tau,
            observation_noise,
        }
    }

    /// Current position estimate.
    pub fn location(&self) -> Point3<f32> {
        Point3::new(self.mean[0], self.mean[3], self.mean[6])
    }

    pub fn mean(&self) -> &StateVec {
        &self.mean
    }

    pub fn covariance(&self) -> &StateCov {
        &self.covariance
    }

    /// Propagate the state by `dt` seconds through the Singer transition.
    pub fn predict(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }

        let transition = self.transition_block(dt);
        let process_noise = self.process_noise_block(dt);

        let mut motion = StateCov::zeros();
        let mut noise = StateCov::zeros();
        for axis in 0..3 {
            let base = axis * 3;
            motion
                .fixed_view_mut::<3, 3>(base, base)
                .copy_from(&transition);
            noise
                .fixed_view_mut::<3, 3>(base, base)
                .copy_from(&process_noise);
        }

        self.mean = motion * self.mean;
        self.covariance = motion * self.covariance * motion.transpose() + noise;
    }

    /// Kalman measurement update with a 3-D position observation.
    pub fn update(&mut self, location: Point3<f32>) {
        // H picks the position entry of each axis block.
        let mut observation = SMatrix::<f32, 3, STATE_DIM>::zeros();
        observation[(0, 0)] = 1.0;
        observation[(1, 3)] = 1.0;
        observation[(2, 6)] = 1.0;

        let mut measurement_noise = Matrix3::zeros();
        for axis in 0..3 {
            measurement_noise[(axis, axis)] =
                self.observation_noise[axis] * self.observation_noise[axis];
        }

        let innovation = location.coords - observation * self.mean;
        let innovation_cov =
            observation * self.covariance * observation.transpose() + measurement_noise;

        let Some(innovation_cov_inv) = innovation_cov.try_inverse() else {
            return;
        };

        // K = P H^T S^-1
        let gain = self.covariance * observation.transpose() * innovation_cov_inv;

        self.mean += gain * innovation;
        self.covariance -= gain * innovation_cov * gain.transpose();
    }

    /// Per-axis Singer transition matrix.
    fn transition_block(&self, dt: f32) -> Matrix3<f32> {
        let alpha = 1.0 / self.tau;
        let decay = (-alpha * dt).exp();

        Matrix3::new(
            1.0,
            dt,
            (alpha * dt - 1.0 + decay) / (alpha * alpha),
            0.0,
            1.0,
            (1.0 - decay) / alpha,
            0.0,
            0.0,
            decay,
        )
    }

    /// Per-axis Singer process noise for one step of `dt` seconds.
    fn process_noise_block(&self, dt: f32) -> Matrix3<f32> {
        let alpha = 1.0 / self.tau;
        let sigma2 = self.max_acceleration * self.max_acceleration;
        let at = alpha * dt;
        let e = (-at).exp();
        let e2 = (-2.0 * at).exp();

        let q11 = (1.0 - e2 + 2.0 * at + 2.0 * at.powi(3) / 3.0 - 2.0 * at * at - 4.0 * at * e)
            / (2.0 * alpha.powi(5));
        let q12 = (e2 + 1.0 - 2.0 * e + 2.0 * at * e - 2.0 * at + at * at) / (2.0 * alpha.powi(4));
        let q13 = (1.0 - e2 - 2.0 * at * e) / (2.0 * alpha.powi(3));
        let q22 = (4.0 * e - 3.0 - e2 + 2.0 * at) / (2.0 * alpha.powi(3));
        let q23 = (e2 + 1.0 - 2.0 * e) / (2.0 * alpha * alpha);
        let q33 = (1.0 - e2) / (2.0 * alpha);

        2.0 * alpha
            * sigma2
            * Matrix3::new(q11, q12, q13, q12, q22, q23, q13, q23, q33)
    }
}
