use ndarray::Array2;

/// Intensity-weighted centroid `(x, y)` of the whole cutout.
///
/// Raw pixel values are the weights; masked pixels are skipped. `None` when
/// the total weight is zero or not finite.
pub fn centroid_com(data: &Array2<f64>, mask: Option<&Array2<bool>>) -> Option<(f64, f64)> {
    let (mut total, mut sx, mut sy) = (0.0f64, 0.0f64, 0.0f64);
    for ((row, col), &v) in data.indexed_iter() {
        if mask.is_some_and(|m| m[[row, col]]) || !v.is_finite() {
            continue;
        }
        total += v;
        sx += v * col as f64;
        sy += v * row as f64;
    }
    if total == 0.0 || !total.is_finite() {
        return None;
    }
    Some((sx / total, sy / total))
}
