// src/smoothing.rs - display smoothing for strokes
use nalgebra::{DMatrix, Matrix2, Matrix2x4, Matrix4, Vector2, Vector4};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmoothingMethod {
    MovingAverage,
    Gaussian,
    SavitzkyGolay,
    Kalman,
    /// Catmull-Rom curve through the samples, resampled by arc length.
    Spline,
    /// Kalman, then Savitzky-Golay, then Gaussian.
    MultiPass,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    pub enabled: bool,
    pub method: SmoothingMethod,
    /// Points closer than this (pixels) are merged before each pass.
    pub duplicate_distance: f64,
    /// Smooth the stroke being drawn on every stored sample.
    pub real_time: bool,
    /// Douglas-Peucker tolerance (pixels) applied after smoothing.
    pub simplify_epsilon: Option<f64>,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            method: SmoothingMethod::MultiPass,
            duplicate_distance: 2.0,
            real_time: true,
            simplify_epsilon: None,
        }
    }
}

/// Constant-velocity Kalman filter over (x, y).
pub struct KalmanFilter {
    state: Vector4<f64>, // [x, y, vx, vy]
    covariance: Matrix4<f64>,
    process_noise: Matrix4<f64>,
    measurement_noise: Matrix2<f64>,
}

impl KalmanFilter {
    pub fn new(start: Vector2<f64>, process_variance: f64, measurement_variance: f64) -> Self {
        Self {
            state: Vector4::new(start.x, start.y, 0.0, 0.0),
            covariance: Matrix4::identity() * 1000.0,
            process_noise: Matrix4::identity() * process_variance,
            measurement_noise: Matrix2::identity() * measurement_variance,
        }
    }

    pub fn predict(&mut self) {
        let mut f = Matrix4::identity();
        f.fixed_view_mut::<2, 2>(0, 2).fill_diagonal(1.0);

        self.state = f * self.state;
        self.covariance = f * self.covariance * f.transpose() + self.process_noise;
    }

    pub fn update(&mut self, measurement: Vector2<f64>) {
        // Observes position, not velocity
        let mut h = Matrix2x4::<f64>::zeros();
        h[(0, 0)] = 1.0;
        h[(1, 1)] = 1.0;

        let y = measurement - (h * self.state);
        let s = h * self.covariance * h.transpose() + self.measurement_noise;

        // A singular innovation covariance leaves the prediction as is.
        let Some(s_inv) = s.try_inverse() else {
            return;
        };
        let k = self.covariance * h.transpose() * s_inv;

        self.state += k * y;
        self.covariance = (Matrix4::identity() - k * h) * self.covariance;
    }

    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.state[0], self.state[1])
    }
}

pub struct StrokeSmoother {
    config: SmoothingConfig,
}

impl StrokeSmoother {
    pub fn new(config: SmoothingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SmoothingConfig {
        &self.config
    }

    /// Smoothed copy of `points`, or the points unchanged when smoothing is off.
    pub fn smooth(&self, points: &[Vector2<f64>]) -> Vec<Vector2<f64>> {
        if !self.config.enabled || points.len() < 2 {
            return points.to_vec();
        }
        let smoothed = self.smooth_with_method(points);
        match self.config.simplify_epsilon {
            Some(epsilon) => douglas_peucker(&smoothed, epsilon),
            None => smoothed,
        }
    }

    /// Preview of an open stroke: a short Savitzky-Golay pass once there are
    /// more than three samples. Empty means "draw the raw points".
    pub fn smooth_live(&self, points: &[Vector2<f64>]) -> Vec<Vector2<f64>> {
        if !self.config.enabled || !self.config.real_time || points.len() <= 3 {
            return Vec::new();
        }
        let mut window = points.len().min(7);
        if window % 2 == 0 {
            window -= 1;
        }
        savitzky_golay(points, window, 3.min(window - 2))
    }

    fn smooth_with_method(&self, points: &[Vector2<f64>]) -> Vec<Vector2<f64>> {
        match self.config.method {
            SmoothingMethod::MultiPass => {
                let passes = [
                    SmoothingMethod::Kalman,
                    SmoothingMethod::SavitzkyGolay,
                    SmoothingMethod::Gaussian,
                ];
                passes.iter().fold(points.to_vec(), |acc, method| {
                    if acc.len() >= 2 {
                        self.single_pass(&acc, *method)
                    } else {
                        acc
                    }
                })
            }
            method => self.single_pass(points, method),
        }
    }

    fn single_pass(&self, points: &[Vector2<f64>], method: SmoothingMethod) -> Vec<Vector2<f64>> {
        let points = remove_duplicates(points, self.config.duplicate_distance);
        if points.len() < 2 {
            return points;
        }
        match method {
            SmoothingMethod::MovingAverage => moving_average(&points, 5),
            SmoothingMethod::Gaussian => gaussian(&points, 1.5),
            SmoothingMethod::SavitzkyGolay => savitzky_golay(&points, 7, 3),
            SmoothingMethod::Kalman => kalman(&points, 1e-5, 1e-1),
            SmoothingMethod::Spline => catmull_rom(&points, points.len()),
            SmoothingMethod::MultiPass => points,
        }
    }
}

pub fn remove_duplicates(points: &[Vector2<f64>], min_distance: f64) -> Vec<Vector2<f64>> {
    let mut filtered: Vec<Vector2<f64>> = Vec::with_capacity(points.len());
    for p in points {
        match filtered.last() {
            Some(last) if (p - last).norm() < min_distance => {}
            _ => filtered.push(*p),
        }
    }
    filtered
}

pub fn moving_average(points: &[Vector2<f64>], window: usize) -> Vec<Vector2<f64>> {
    if window == 0 || points.len() < window {
        return points.to_vec();
    }
    let half = window / 2;
    (0..points.len())
        .map(|i| {
            let start = i.saturating_sub(half);
            let end = (i + half + 1).min(points.len());
            let sum: Vector2<f64> = points[start..end].iter().sum();
            sum / (end - start) as f64
        })
        .collect()
}

/// Gaussian-weighted average. Weights are renormalized near the ends so the
/// stroke is not pulled toward the origin.
pub fn gaussian(points: &[Vector2<f64>], sigma: f64) -> Vec<Vector2<f64>> {
    if points.len() < 3 || sigma <= 0.0 {
        return points.to_vec();
    }
    let mut window = (6.0 * sigma) as usize;
    if window % 2 == 0 {
        window += 1;
    }
    let half = (window / 2) as isize;
    let kernel: Vec<f64> = (-half..=half)
        .map(|x| (-0.5 * (x as f64 / sigma).powi(2)).exp())
        .collect();

    let n = points.len() as isize;
    (0..n)
        .map(|i| {
            let mut acc = Vector2::zeros();
            let mut weight = 0.0;
            for (k, w) in kernel.iter().enumerate() {
                let j = i + k as isize - half;
                if (0..n).contains(&j) {
                    acc += points[j as usize] * *w;
                    weight += w;
                }
            }
            acc / weight
        })
        .collect()
}

/// Least-squares polynomial smoothing. Points within half a window of either
/// end are evaluated on the polynomial fitted to the first or last window.
pub fn savitzky_golay(points: &[Vector2<f64>], window: usize, order: usize) -> Vec<Vector2<f64>> {
    let mut window = window.max(order + 2);
    if window % 2 == 0 {
        window += 1;
    }
    if points.len() < window {
        return points.to_vec();
    }

    let half = (window / 2) as f64;
    let design = DMatrix::from_fn(window, order + 1, |r, c| (r as f64 - half).powi(c as i32));
    let Some(normal_inv) = (design.transpose() * &design).try_inverse() else {
        return points.to_vec();
    };
    // Row j of `fit` maps a window of samples onto polynomial coefficient j.
    let fit = normal_inv * design.transpose();

    let n = points.len();
    (0..n)
        .map(|i| {
            let start = i.saturating_sub(window / 2).min(n - window);
            let t = i as f64 - start as f64 - half;
            let mut value = Vector2::zeros();
            for (offset, p) in points[start..start + window].iter().enumerate() {
                let weight: f64 = (0..=order).map(|j| fit[(j, offset)] * t.powi(j as i32)).sum();
                value += *p * weight;
            }
            value
        })
        .collect()
}

pub fn kalman(
    points: &[Vector2<f64>],
    process_variance: f64,
    measurement_variance: f64,
) -> Vec<Vector2<f64>> {
    let Some(first) = points.first() else {
        return Vec::new();
    };
    if points.len() < 2 {
        return points.to_vec();
    }
    let mut filter = KalmanFilter::new(*first, process_variance, measurement_variance);
    points
        .iter()
        .map(|p| {
            filter.predict();
            filter.update(*p);
            filter.position()
        })
        .collect()
}

/// Uniform Catmull-Rom spline through `points`, sampled at
/// `samples` positions evenly spaced along the polyline length. Ends are
/// extended by reflection so the curve starts and stops on the first and
/// last sample. A stroke with no length falls back to `gaussian`.
pub fn catmull_rom(points: &[Vector2<f64>], samples: usize) -> Vec<Vector2<f64>> {
    let n = points.len();
    if n < 4 || samples < 2 {
        return points.to_vec();
    }

    let mut knots = Vec::with_capacity(n);
    knots.push(0.0);
    for pair in points.windows(2) {
        let last = knots[knots.len() - 1];
        knots.push(last + (pair[1] - pair[0]).norm());
    }
    let total = knots[n - 1];
    if total <= f64::EPSILON {
        return gaussian(points, 1.5);
    }

    let control = |i: isize| -> Vector2<f64> {
        if i < 0 {
            points[0] * 2.0 - points[1]
        } else if i as usize >= n {
            points[n - 1] * 2.0 - points[n - 2]
        } else {
            points[i as usize]
        }
    };

    let mut segment = 0;
    (0..samples)
        .map(|k| {
            let u = total * k as f64 / (samples - 1) as f64;
            while segment + 2 < n && knots[segment + 1] < u {
                segment += 1;
            }
            let length = knots[segment + 1] - knots[segment];
            let s = if length > 0.0 {
                ((u - knots[segment]) / length).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let i = segment as isize;
            let (p0, p1, p2, p3) = (control(i - 1), control(i), control(i + 1), control(i + 2));
            (p1 * 2.0
                + (p2 - p0) * s
                + (p0 * 2.0 - p1 * 5.0 + p2 * 4.0 - p3) * (s * s)
                + (p1 * 3.0 - p0 - p2 * 3.0 + p3) * (s * s * s))
                * 0.5
        })
        .collect()
}

/// Ramer-Douglas-Peucker simplification.
pub fn douglas_peucker(points: &[Vector2<f64>], epsilon: f64) -> Vec<Vector2<f64>> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let first = points[0];
    let last = points[points.len() - 1];

    let (index, max_distance) = points[1..points.len() - 1]
        .iter()
        .enumerate()
        .map(|(i, p)| (i + 1, perpendicular_distance(p, &first, &last)))
        .fold((0, 0.0), |best, cur| if cur.1 > best.1 { cur } else { best });

    if max_distance > epsilon {
        let mut left = douglas_peucker(&points[..=index], epsilon);
        let right = douglas_peucker(&points[index..], epsilon);
        left.pop();
        left.extend(right);
        left
    } else {
        vec![first, last]
    }
}

fn perpendicular_distance(p: &Vector2<f64>, start: &Vector2<f64>, end: &Vector2<f64>) -> f64 {
    let line = end - start;
    let length = line.norm();
    if length == 0.0 {
        return (p - start).norm();
    }
    let rel = p - start;
    (line.x * rel.y - line.y * rel.x).abs() / length
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(n: usize) -> Vec<Vector2<f64>> {
        (0..n).map(|i| Vector2::new(i as f64 * 10.0, i as f64 * 5.0)).collect()
    }

    fn zigzag(n: usize) -> Vec<Vector2<f64>> {
        (0..n)
            .map(|i| Vector2::new(i as f64 * 10.0, if i % 2 == 0 { 0.0 } else { 8.0 }))
            .collect()
    }

    fn roughness(points: &[Vector2<f64>]) -> f64 {
        points.windows(3).map(|w| (w[0] - 2.0 * w[1] + w[2]).norm()).sum()
    }

    #[test]
    fn test_remove_duplicates() {
        let points = vec![
            Vector2::new(0.0, 0.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(3.0, 0.0),
            Vector2::new(3.5, 0.0),
        ];
        let filtered = remove_duplicates(&points, 2.0);
        assert_eq!(filtered, vec![Vector2::new(0.0, 0.0), Vector2::new(3.0, 0.0)]);
    }

    #[test]
    fn test_short_input_unchanged() {
        let points = line(3);
        assert_eq!(moving_average(&points, 5), points);
        assert_eq!(savitzky_golay(&points, 7, 3), points);
        assert_eq!(douglas_peucker(&points[..2], 1.0), points[..2].to_vec());
    }

    #[test]
    fn test_gaussian_keeps_line_in_place() {
        // Away from the ends an evenly spaced line is a fixed point.
        let points = line(12);
        let smoothed = gaussian(&points, 1.5);
        for i in 4..8 {
            assert!((smoothed[i] - points[i]).norm() < 1e-9);
        }
        // Ends stay on the segment instead of collapsing toward zero.
        assert!(smoothed[0].x >= 0.0 && smoothed[0].x < points[2].x);
    }

    #[test]
    fn test_savitzky_golay_preserves_cubic() {
        let points: Vec<Vector2<f64>> = (0..15)
            .map(|i| {
                let t = i as f64;
                Vector2::new(t, 0.1 * t * t * t - t * t + 2.0)
            })
            .collect();
        for (a, b) in savitzky_golay(&points, 7, 3).iter().zip(&points) {
            assert!((a - b).norm() < 1e-6, "{:?} vs {:?}", a, b);
        }
    }

    #[test]
    fn test_smoothers_reduce_roughness() {
        let points = zigzag(20);
        let before = roughness(&points);
        assert!(roughness(&moving_average(&points, 5)) < before);
        assert!(roughness(&gaussian(&points, 1.5)) < before);
        assert!(roughness(&savitzky_golay(&points, 7, 3)) < before);
    }

    #[test]
    fn test_kalman_tracks_measurements() {
        let points = line(30);
        let smoothed = kalman(&points, 1e-5, 1e-1);
        assert_eq!(smoothed.len(), points.len());
        let last = smoothed.last().unwrap();
        assert!((last - points.last().unwrap()).norm() < 1.0);
    }

    #[test]
    fn test_douglas_peucker_drops_collinear() {
        let points = line(10);
        assert_eq!(douglas_peucker(&points, 0.5), vec![points[0], points[9]]);

        let mut bent = line(5);
        bent.push(Vector2::new(40.0, 60.0));
        let simplified = douglas_peucker(&bent, 0.5);
        assert_eq!(simplified, vec![bent[0], bent[4], bent[5]]);
    }

    #[test]
    fn test_catmull_rom_passes_through_ends() {
        let points = zigzag(12);
        let curve = catmull_rom(&points, points.len());
        assert_eq!(curve.len(), points.len());
        assert!((curve[0] - points[0]).norm() < 1e-9);
        assert!((curve[11] - points[11]).norm() < 1e-9);
        assert!(curve.iter().all(|p| p.x >= -1e-9 && p.x <= 110.0 + 1e-9));
    }

    #[test]
    fn test_catmull_rom_keeps_line_straight() {
        let points = line(8);
        for p in catmull_rom(&points, 20) {
            assert!((p.y - p.x * 0.5).abs() < 1e-9, "{:?} left the line", p);
        }
    }

    #[test]
    fn test_catmull_rom_without_length_falls_back() {
        let points = vec![Vector2::new(3.0, 4.0); 6];
        let curve = catmull_rom(&points, 6);
        assert_eq!(curve.len(), 6);
        assert!(curve.iter().all(|p| (p - points[0]).norm() < 1e-9));
    }

    #[test]
    fn test_live_preview_needs_four_points() {
        let smoother = StrokeSmoother::new(SmoothingConfig::default());
        let points = zigzag(10);
        assert!(smoother.smooth_live(&points[..3]).is_empty());
        for n in 4..=10 {
            let preview = smoother.smooth_live(&points[..n]);
            assert_eq!(preview.len(), n);
        }
        assert!(roughness(&smoother.smooth_live(&points)) < roughness(&points));

        let off = StrokeSmoother::new(SmoothingConfig {
            real_time: false,
            ..Default::default()
        });
        assert!(off.smooth_live(&points).is_empty());
    }

    #[test]
    fn test_simplify_after_smoothing() {
        let smoother = StrokeSmoother::new(SmoothingConfig {
            method: SmoothingMethod::MovingAverage,
            simplify_epsilon: Some(1.0),
            ..Default::default()
        });
        let points = line(12);
        assert_eq!(smoother.smooth(&points).len(), 2);
    }

    #[test]
    fn test_disabled_smoother_passes_through() {
        let smoother = StrokeSmoother::new(SmoothingConfig {
            enabled: false,
            ..Default::default()
        });
        let points = zigzag(10);
        assert_eq!(smoother.smooth(&points), points);
    }

    #[test]
    fn test_multi_pass_smooths() {
        let smoother = StrokeSmoother::new(SmoothingConfig::default());
        let points = zigzag(20);
        let smoothed = smoother.smooth(&points);
        assert!(!smoothed.is_empty());
        assert!(roughness(&smoothed) < roughness(&points));
    }
}
