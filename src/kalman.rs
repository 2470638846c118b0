use nalgebra::{Matrix2, Matrix2x4, Matrix4, Point2, Vector2, Vector4};

/// Tuning of the constant-velocity estimator. Small process noise favours a
/// smooth output over a fast one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KalmanConfig {
    pub process_noise: f32,
    pub measurement_noise: f32,
}

impl Default for KalmanConfig {
    fn default() -> Self {
        Self {
            process_noise: 0.01,
            measurement_noise: 1.0,
        }
    }
}

/// Constant-velocity 2D estimator over the state `(x, y, vx, vy)`.
///
/// Observations are taken relative to the origin given to [`Kalman2d::init`],
/// the estimator itself always starts at rest at zero. Predictions are handed
/// back in the caller's coordinates.
#[derive(Debug, Clone)]
pub struct Kalman2d {
    transition: Matrix4<f32>,
    measurement: Matrix2x4<f32>,
    process_cov: Matrix4<f32>,
    measurement_cov: Matrix2<f32>,
    // a priori estimate, produced by the last predict
    state_pre: Vector4<f32>,
    cov_pre: Matrix4<f32>,
    origin: Vector2<f32>,
    last_prediction: Point2<f32>,
    current_prediction: Point2<f32>,
}

impl Kalman2d {
    pub fn new(config: KalmanConfig) -> Self {
        #[rustfmt::skip]
        let transition = Matrix4::new(
            1.0, 0.0, 1.0, 0.0,
            0.0, 1.0, 0.0, 1.0,
            0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        );
        #[rustfmt::skip]
        let measurement = Matrix2x4::new(
            1.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
        );
        Self {
            transition,
            measurement,
            process_cov: Matrix4::identity() * config.process_noise,
            measurement_cov: Matrix2::identity() * config.measurement_noise,
            state_pre: Vector4::zeros(),
            cov_pre: Matrix4::zeros(),
            origin: Vector2::zeros(),
            last_prediction: Point2::origin(),
            current_prediction: Point2::origin(),
        }
    }

    /// Resets to a fresh estimator seeded at `(x0, y0)`.
    pub fn init(&mut self, x0: f32, y0: f32) {
        self.origin = Vector2::new(x0, y0);
        self.state_pre = Vector4::zeros();
        self.cov_pre = Matrix4::zeros();
        self.last_prediction = Point2::new(x0, y0);
        self.current_prediction = Point2::new(x0, y0);
    }

    pub fn origin(&self) -> Point2<f32> {
        Point2::from(self.origin)
    }

    /// Folds `(x, y)` into the estimate when `correct` is set, then advances
    /// one step. With `correct == false` the observation is ignored and the
    /// estimator coasts on its velocity. Returns (previous, current) prediction.
    pub fn predict_and_update(&mut self, x: f32, y: f32, correct: bool) -> (Point2<f32>, Point2<f32>) {
        self.last_prediction = self.current_prediction;

        let (state_post, cov_post) = if correct {
            self.correct(Vector2::new(x, y) - self.origin)
        } else {
            (self.state_pre, self.cov_pre)
        };

        self.state_pre = self.transition * state_post;
        self.cov_pre = self.transition * cov_post * self.transition.transpose() + self.process_cov;

        let position = self.measurement * self.state_pre + self.origin;
        self.current_prediction = Point2::from(position);
        (self.last_prediction, self.current_prediction)
    }

    fn correct(&self, z: Vector2<f32>) -> (Vector4<f32>, Matrix4<f32>) {
        let h = &self.measurement;
        let innovation_cov = h * self.cov_pre * h.transpose() + self.measurement_cov;
        let Some(inv) = innovation_cov.try_inverse() else {
            tracing::warn!(method_name = "kalman_correct", "singular innovation covariance, skip correction");
            return (self.state_pre, self.cov_pre);
        };
        let gain = self.cov_pre * h.transpose() * inv;
        let state = self.state_pre + gain * (z - h * self.state_pre);
        let cov = (Matrix4::identity() - gain * h) * self.cov_pre;
        (state, cov)
    }

    /// Velocity part of the current estimate.
    pub fn velocity(&self) -> Vector2<f32> {
        Vector2::new(self.state_pre[2], self.state_pre[3])
    }
}

impl Default for Kalman2d {
    fn default() -> Self {
        Self::new(KalmanConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converges_on_stationary_target() {
        let mut kf = Kalman2d::default();
        kf.init(0.0, 0.0);
        let target = Point2::new(10.0_f32, -5.0);
        let errors: Vec<[f32; 2]> = (0..150)
            .map(|_| {
                let (_, cp) = kf.predict_and_update(target.x, target.y, true);
                [(cp.x - target.x).abs(), (cp.y - target.y).abs()]
            })
            .collect();

        for axis in 0..2 {
            let initial = errors[0][axis];
            // one overshoot, then the error envelope shrinks every swing
            assert!(errors[7..].iter().all(|e| e[axis] < 0.35 * initial), "axis {axis}");
            let peaks: Vec<f32> = errors
                .chunks(15)
                .map(|w| w.iter().map(|e| e[axis]).fold(0.0, f32::max))
                .collect();
            for pair in peaks.windows(2) {
                assert!(pair[1] < pair[0] || pair[1] < 1e-3, "axis {axis}: {peaks:?}");
            }
            assert!(errors[149][axis] < 0.01, "axis {axis}: {}", errors[149][axis]);
        }
    }

    #[test]
    fn test_init_offset_is_rebiased() {
        let mut kf = Kalman2d::default();
        kf.init(320.0, 240.0);
        for _ in 0..20 {
            let (_, cp) = kf.predict_and_update(320.0, 240.0, true);
            assert!((cp.x - 320.0).abs() < 1e-4);
            assert!((cp.y - 240.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_returns_previous_and_current() {
        let mut kf = Kalman2d::default();
        kf.init(0.0, 0.0);
        let (_, first) = kf.predict_and_update(4.0, 4.0, true);
        let (prev, _) = kf.predict_and_update(4.0, 4.0, true);
        assert_eq!(prev, first);
    }

    #[test]
    fn test_prediction_only_ignores_observation() {
        let mut a = Kalman2d::default();
        a.init(0.0, 0.0);
        for _ in 0..30 {
            a.predict_and_update(5.0, 5.0, true);
        }
        let mut b = a.clone();
        let (_, pa) = a.predict_and_update(100.0, -100.0, false);
        let (_, pb) = b.predict_and_update(-3.0, 42.0, false);
        assert_eq!(pa, pb);
        let (_, pa) = a.predict_and_update(1.0, 1.0, false);
        let (_, pb) = b.predict_and_update(9.0, 9.0, false);
        assert_eq!(pa, pb);
    }

    #[test]
    fn test_coasts_with_velocity() {
        let mut kf = Kalman2d::default();
        kf.init(0.0, 0.0);
        let mut x = 0.0;
        for _ in 0..200 {
            x += 2.0;
            kf.predict_and_update(x, 0.0, true);
        }
        assert!((kf.velocity().x - 2.0).abs() < 0.05);
        let (prev, cur) = kf.predict_and_update(0.0, 0.0, false);
        assert!(cur.x > prev.x);
    }

    #[test]
    fn test_init_resets_estimate() {
        let mut kf = Kalman2d::default();
        kf.init(0.0, 0.0);
        for _ in 0..50 {
            kf.predict_and_update(30.0, 30.0, true);
        }
        kf.init(1.0, 1.0);
        assert_eq!(kf.velocity(), Vector2::zeros());
        let (_, cp) = kf.predict_and_update(1.0, 1.0, true);
        assert_eq!(cp, Point2::new(1.0, 1.0));
    }
}
