use ndarray::{Array1, ArrayView1};

/// Index of the largest entry.
/// Ties resolve to the lowest index; NaN never wins.
///
/// # Returns
/// * `Option<usize>` - `None` for an empty vector
#[inline]
pub fn argmax<N>(vec: ArrayView1<N>) -> Option<usize>
where
    N: PartialOrd + Copy,
{
    let mut best: Option<(usize, N)> = None;
    for (idx, &val) in vec.iter().enumerate() {
        match best {
            None if val.partial_cmp(&val).is_some() => best = Some((idx, val)),
            Some((_, b)) if val > b => best = Some((idx, val)),
            _ => {}
        }
    }
    best.map(|(idx, _)| idx)
}

/// Scale a vector so its entries sum to one, after adding `smooth` to each entry.
/// Returns zeros when the smoothed sum is not positive.
pub fn normalize(vec: ArrayView1<f64>, smooth: f64) -> Array1<f64> {
    let smoothed = vec.mapv(|v| v + smooth);
    let total = smoothed.sum();
    if total > 0.0 {
        smoothed / total
    } else {
        Array1::zeros(vec.len())
    }
}
