//! Landmark smoothing engine
//!
//! A bank of 1D Kalman filters suppresses sensor/model jitter while staying
//! responsive to genuine motion. A single smoothing factor in [0, 1] controls
//! the trade-off: 0.0 = maximum smoothing (slow response), 1.0 = no smoothing
//! (instant response).
//!
//! The recursion is exact recursive least squares with fixed noise
//! parameters: no outlier rejection, no velocity model. Axes are filtered
//! independently.

use std::collections::HashMap;
use std::sync::Mutex;

use super::{Landmark, Point3D};

/// Process noise: how much the underlying signal is expected to move
/// between frames.
const PROCESS_NOISE: f64 = 0.1;

/// A 1D Kalman filter for scalar landmark channels.
///
/// Safe to drive from one task while inspecting from another: `update`,
/// `reset`, and `state` serialize on an internal mutex.
#[derive(Debug)]
pub struct KalmanFilter {
    inner: Mutex<FilterState>,
    /// Process noise
    q: f64,
    /// Measurement noise
    r: f64,
}

#[derive(Debug)]
struct FilterState {
    /// State estimate
    x: f64,
    /// Estimate uncertainty
    p: f64,
    initialized: bool,
}

impl KalmanFilter {
    /// Create a filter with the given smoothing factor in [0, 1].
    ///
    /// The factor maps to measurement noise: lower factor means higher `r`,
    /// so the filter trusts its own estimate more and reacts more slowly.
    /// `r` ranges from 0.1 (factor 1.0) to 1.0 (factor 0.0).
    pub fn new(smoothing_factor: f64) -> Self {
        Self {
            inner: Mutex::new(FilterState {
                x: 0.0,
                p: 1.0,
                initialized: false,
            }),
            q: PROCESS_NOISE,
            r: 0.1 + (1.0 - smoothing_factor) * 0.9,
        }
    }

    /// Process a new measurement and return the filtered value.
    ///
    /// The first measurement is adopted verbatim so the first frame is never
    /// artificially damped.
    pub fn update(&self, measurement: f64) -> f64 {
        let mut state = self.inner.lock().unwrap();

        if !state.initialized {
            state.x = measurement;
            state.p = 1.0;
            state.initialized = true;
            return measurement;
        }

        // Prediction: constant-position model, so only uncertainty grows
        let p_pred = state.p + self.q;

        // Update
        let k = p_pred / (p_pred + self.r);
        state.x += k * (measurement - state.x);
        state.p = (1.0 - k) * p_pred;

        state.x
    }

    /// Clear the filter back to uninitialized.
    pub fn reset(&self) {
        let mut state = self.inner.lock().unwrap();
        state.x = 0.0;
        state.p = 1.0;
        state.initialized = false;
    }

    /// Read the current state estimate without mutating it.
    pub fn state(&self) -> f64 {
        self.inner.lock().unwrap().x
    }
}

/// Kalman filtering for 3D points: three independent per-axis filters.
#[derive(Debug)]
pub struct KalmanFilter3d {
    x: KalmanFilter,
    y: KalmanFilter,
    z: KalmanFilter,
}

impl KalmanFilter3d {
    pub fn new(smoothing_factor: f64) -> Self {
        Self {
            x: KalmanFilter::new(smoothing_factor),
            y: KalmanFilter::new(smoothing_factor),
            z: KalmanFilter::new(smoothing_factor),
        }
    }

    /// Process a new 3D measurement and return the filtered point.
    pub fn update(&self, point: Point3D) -> Point3D {
        Point3D {
            x: self.x.update(point.x),
            y: self.y.update(point.y),
            z: self.z.update(point.z),
        }
    }

    /// Reset all three axis filters together.
    pub fn reset(&self) {
        self.x.reset();
        self.y.reset();
        self.z.reset();
    }
}

/// Manages one 3D filter per landmark index, created lazily on first
/// observation of that index.
#[derive(Debug)]
pub struct LandmarkSmoother {
    filters: Mutex<HashMap<usize, KalmanFilter3d>>,
    factor: f64,
}

impl LandmarkSmoother {
    pub fn new(smoothing_factor: f64) -> Self {
        Self {
            filters: Mutex::new(HashMap::new()),
            factor: smoothing_factor,
        }
    }

    /// Filter a landmark array, preserving order and length. Visibility is a
    /// discrete detector confidence, not a continuous signal, so it passes
    /// through unchanged.
    pub fn smooth(&self, landmarks: &[Landmark]) -> Vec<Landmark> {
        if landmarks.is_empty() {
            return Vec::new();
        }

        let mut filters = self.filters.lock().unwrap();

        landmarks
            .iter()
            .enumerate()
            .map(|(i, lm)| {
                let filter = filters
                    .entry(i)
                    .or_insert_with(|| KalmanFilter3d::new(self.factor));
                Landmark {
                    point: filter.update(lm.point),
                    visibility: lm.visibility,
                }
            })
            .collect()
    }

    /// Reset every existing filter to uninitialized. The index mapping is
    /// kept, so future frames at the same indices reuse the same filters.
    pub fn reset(&self) {
        let filters = self.filters.lock().unwrap();
        for filter in filters.values() {
            filter.reset();
        }
    }

    #[cfg(test)]
    fn filter_count(&self) -> usize {
        self.filters.lock().unwrap().len()
    }
}
