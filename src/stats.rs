/// Statistics module
/// Normal distribution approximations and small sample statistics

use std::f64::consts::{PI, SQRT_2};

pub fn normal_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

/// Standard normal CDF via the Abramowitz & Stegun 7.1.26 erf approximation
/// (absolute error below 1.5e-7).
pub fn normal_cdf(x: f64) -> f64 {
    if x == 0.0 {
        return 0.5;
    }
    if x.is_nan() {
        return f64::NAN;
    }

    const A1: f64 = 0.254_829_592;
    const A2: f64 = -0.284_496_736;
    const A3: f64 = 1.421_413_741;
    const A4: f64 = -1.453_152_027;
    const A5: f64 = 1.061_405_429;
    const P: f64 = 0.327_591_1;

    let z = x.abs() / SQRT_2;
    let t = 1.0 / (1.0 + P * z);
    let erf = 1.0 - ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t * (-z * z).exp();

    if x > 0.0 {
        0.5 * (1.0 + erf)
    } else {
        0.5 * (1.0 - erf)
    }
}

/// Inverse standard normal CDF (Acklam's rational approximation).
///
/// Returns NaN outside the open interval (0, 1).
pub fn inverse_normal(p: f64) -> f64 {
    if !(p > 0.0 && p < 1.0) {
        return f64::NAN;
    }

    const A: [f64; 6] = [-39.696830, 220.946098, -275.928510, 138.357751, -30.664798, 2.506628];
    const B: [f64; 5] = [-54.476098, 161.585836, -155.698979, 66.801311, -13.280681];
    const C: [f64; 6] = [-0.007784894, -0.322396, -2.400758, -2.549732, 4.374664, 2.938163];
    const D: [f64; 4] = [0.007784695, 0.322467, 2.445134, 3.754408];
    const P_LOW: f64 = 0.02425;
    const P_HIGH: f64 = 1.0 - P_LOW;

    let tail = |q: f64| {
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };

    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        return tail(q);
    }
    if p > P_HIGH {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        return -tail(q);
    }

    let q = p - 0.5;
    let r = q * q;
    (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
        / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1); zero for fewer than two points
pub fn sample_std(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n - 1) as f64;
    var.max(0.0).sqrt()
}

/// Pearson correlation of two equally long series.
///
/// Degenerate inputs (one point, mismatched lengths, zero variance) give 0.
pub fn pearson_correlation(xs: &[f64], ys: &[f64]) -> f64 {
    if xs.len() != ys.len() || xs.len() <= 1 {
        return 0.0;
    }
    let mx = mean(xs);
    let my = mean(ys);
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mx;
        let dy = y - my;
        cov += dx * dy;
        vx += dx * dx;
        vy += dy * dy;
    }
    if vx <= 0.0 || vy <= 0.0 {
        return 0.0;
    }
    (cov / (vx.sqrt() * vy.sqrt())).clamp(-1.0, 1.0)
}
