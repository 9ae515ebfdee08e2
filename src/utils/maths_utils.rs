pub fn mean_and_stddev(data: &[f64]) -> (f64, f64) {
    let count = data.len();
    if count == 0 {
        return (0.0, 0.0);
    }

    let sum: f64 = data.iter().sum();
    let mean = sum / count as f64;

    let variance: f64 = data
        .iter()
        .map(|value| {
            let diff = mean - *value;
            diff * diff
        })
        .sum::<f64>()
        / count as f64;

    (mean, variance.sqrt())
}

/// Least-squares slope of `data` against its index, expressed in degrees.
/// Values are normalised by their mean so the angle is scale-free.
pub fn linear_slope(data: &[f64]) -> f64 {
    let n = data.len();
    if n < 2 {
        return 0.0;
    }
    let (mean_y, _) = mean_and_stddev(data);
    if mean_y.abs() < f64::EPSILON {
        return 0.0;
    }

    let mean_x = (n - 1) as f64 / 2.0;
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in data.iter().enumerate() {
        let dx = i as f64 - mean_x;
        num += dx * (y / mean_y * 100.0 - 100.0);
        den += dx * dx;
    }
    (num / den).atan().to_degrees()
}

/// Percentage change from `from` to `to`. Zero when `from` is not positive.
#[inline]
pub fn pct_change(from: f64, to: f64) -> f64 {
    if from <= 0.0 {
        return 0.0;
    }
    (to - from) / from * 100.0
}
