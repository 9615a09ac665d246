//! Peak picking and sub-sample refinement.

/// Finds local maxima in `data`.
///
/// A peak is a sample (or the middle of a flat plateau) strictly higher than
/// both neighbours. Peaks below `min_height` are discarded, then peaks closer
/// than `min_distance` samples to a higher peak are removed.
///
/// # Returns
/// * Peak indices in ascending order
pub fn find_peaks(data: &[f64], min_height: Option<f64>, min_distance: usize) -> Vec<usize> {
    let n = data.len();
    let mut peaks = Vec::new();
    if n < 3 {
        return peaks;
    }

    let mut i = 1;
    while i < n - 1 {
        if data[i - 1] < data[i] {
            let mut ahead = i + 1;
            while ahead < n - 1 && data[ahead] == data[i] {
                ahead += 1;
            }
            if data[ahead] < data[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
                continue;
            }
        }
        i += 1;
    }

    if let Some(height) = min_height {
        peaks.retain(|&p| data[p] >= height);
    }

    if min_distance > 1 && peaks.len() > 1 {
        peaks = select_by_distance(data, &peaks, min_distance);
    }
    peaks
}

/// Keeps the highest peaks so that no two kept peaks are closer than `distance`.
fn select_by_distance(data: &[f64], peaks: &[usize], distance: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..peaks.len()).collect();
    order.sort_by(|&a, &b| {
        data[peaks[b]]
            .partial_cmp(&data[peaks[a]])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = vec![true; peaks.len()];
    for &j in &order {
        if !keep[j] {
            continue;
        }
        for (k, flag) in keep.iter_mut().enumerate() {
            if k != j && *flag && peaks[j].abs_diff(peaks[k]) < distance {
                *flag = false;
            }
        }
    }

    peaks
        .iter()
        .zip(keep)
        .filter_map(|(&p, k)| k.then_some(p))
        .collect()
}

/// Sub-sample position of the vertex of the parabola through
/// `data[i-1]`, `data[i]`, `data[i+1]`.
///
/// Returns `i` unchanged at the edges or when the three points are collinear.
pub fn parabolic_vertex(data: &[f64], i: usize) -> f64 {
    if i == 0 || i + 1 >= data.len() {
        return i as f64;
    }
    let (y1, y2, y3) = (data[i - 1], data[i], data[i + 1]);
    let denominator = y1 - 2.0 * y2 + y3;
    if denominator.abs() < 1e-12 || !denominator.is_finite() {
        return i as f64;
    }
    let peak_shift = 0.5 * (y1 - y3) / denominator;
    if peak_shift.abs() > 1.0 {
        return i as f64;
    }
    i as f64 + peak_shift
}
