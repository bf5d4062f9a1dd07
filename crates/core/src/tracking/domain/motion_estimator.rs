//! Constant-velocity Kalman filter over a face box.
//!
//! State is `[x, y, w, h, vx, vy, vw, vh]`; only the box half is observed.
//! All matrices are fixed at construction, one time step per frame.

use nalgebra::{Matrix4, SMatrix, SVector};

use crate::shared::bounding_box::BoundingBox;
use crate::tracking::domain::tracker_config::MotionNoise;

type StateVector = SVector<f64, 8>;
type StateMatrix = SMatrix<f64, 8, 8>;
type ObservationMatrix = SMatrix<f64, 4, 8>;

#[derive(Clone, Debug, PartialEq)]
pub struct MotionEstimator {
    state: StateVector,
    covariance: StateMatrix,
    noise: MotionNoise,
}

impl MotionEstimator {
    /// Seeds position and size from the first detection, velocities at zero.
    pub fn new(initial: &BoundingBox, noise: MotionNoise) -> Self {
        let mut state = StateVector::zeros();
        state
            .fixed_rows_mut::<4>(0)
            .copy_from(&SVector::<f64, 4>::from(initial.as_array()));
        Self {
            state,
            covariance: StateMatrix::identity() * noise.initial_uncertainty,
            noise,
        }
    }

    /// Advances one frame: `x = F x`, `P = F P Fᵀ + Q`.
    pub fn predict(&mut self) -> BoundingBox {
        let f = transition();
        self.state = f * self.state;
        self.covariance =
            f * self.covariance * f.transpose() + StateMatrix::identity() * self.noise.process;
        self.current_box()
    }

    /// Fuses a measured box into the predicted state and returns the
    /// corrected box. Must follow a [`predict`](Self::predict) in the same frame.
    pub fn correct(&mut self, measurement: &BoundingBox) -> BoundingBox {
        let h = observation();
        let z = SVector::<f64, 4>::from(measurement.as_array());

        let s = h * self.covariance * h.transpose() + Matrix4::identity() * self.noise.measurement;
        let Some(s_inv) = s.try_inverse() else {
            log::warn!("Innovation covariance is singular, keeping predicted state");
            return self.current_box();
        };

        let gain = self.covariance * h.transpose() * s_inv;
        let innovation = z - h * self.state;
        self.state += gain * innovation;
        self.covariance = (StateMatrix::identity() - gain * h) * self.covariance;
        self.current_box()
    }

    pub fn current_box(&self) -> BoundingBox {
        BoundingBox::new(self.state[0], self.state[1], self.state[2], self.state[3])
    }

    /// `[vx, vy, vw, vh]` in pixels per frame.
    pub fn velocity(&self) -> [f64; 4] {
        [self.state[4], self.state[5], self.state[6], self.state[7]]
    }

    pub fn covariance(&self) -> &StateMatrix {
        &self.covariance
    }
}

/// Position and size each advance by their velocity.
fn transition() -> StateMatrix {
    let mut f = StateMatrix::identity();
    for i in 0..4 {
        f[(i, i + 4)] = 1.0;
    }
    f
}

fn observation() -> ObservationMatrix {
    ObservationMatrix::identity()
}
