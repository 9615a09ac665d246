//! Small descriptive statistics shared by the estimators.

use std::cmp::Ordering;

/// Arithmetic mean. Returns `None` for an empty slice.
pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    Some(data.iter().sum::<f64>() / data.len() as f64)
}

/// Population standard deviation (numpy's default `ddof = 0`).
pub fn std_dev(data: &[f64]) -> Option<f64> {
    let avg = mean(data)?;
    let var = data.iter().map(|&x| (x - avg) * (x - avg)).sum::<f64>() / data.len() as f64;
    Some(var.sqrt())
}

/// Median, averaging the two middle values for even lengths.
pub fn median(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Index of the first occurrence of the largest value. NaNs never win.
pub fn argmax(data: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &x) in data.iter().enumerate() {
        if x.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if x <= b => {}
            _ => best = Some((i, x)),
        }
    }
    best.map(|(i, _)| i)
}
