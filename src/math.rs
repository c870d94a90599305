//! Numerically stable softmax helpers.
//!
//! Both functions subtract the per-axis maximum before exponentiating.
//! 1-D inputs are reduced along axis 0 regardless of the `axis` argument;
//! otherwise `axis` must be a valid axis of `data`.

use ndarray::{ArrayD, Axis};

/// Softmax along `axis`.
pub fn softmax(data: &ArrayD<f32>, axis: usize) -> ArrayD<f32> {
    let axis = Axis(if data.ndim() == 1 { 0 } else { axis });

    let max = data
        .fold_axis(axis, f32::NEG_INFINITY, |m, &v| m.max(v))
        .insert_axis(axis);
    let exp = (data - &max).mapv(f32::exp);
    let sum = exp.sum_axis(axis).insert_axis(axis);

    exp / &sum
}

/// Log-softmax along `axis`.
pub fn log_softmax(data: &ArrayD<f32>, axis: usize) -> ArrayD<f32> {
    let axis = Axis(if data.ndim() == 1 { 0 } else { axis });

    let max = data
        .fold_axis(axis, f32::NEG_INFINITY, |m, &v| m.max(v))
        .insert_axis(axis);
    let shifted = data - &max;
    let log_sum = shifted
        .mapv(f32::exp)
        .sum_axis(axis)
        .mapv(f32::ln)
        .insert_axis(axis);

    &shifted - &log_sum
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn rows_sum_to_one() {
        let data = array![[1.0, 2.0, 3.0], [0.0, 0.0, 0.0]].into_dyn();

        let out = softmax(&data, 1);

        let row0: f32 = (0..3).map(|j| out[[0, j]]).sum();
        let row1: f32 = (0..3).map(|j| out[[1, j]]).sum();
        assert!(close(row0, 1.0));
        assert!(close(row1, 1.0));
        assert!(close(out[[1, 0]], 1.0 / 3.0));
    }

    #[test]
    fn large_values_do_not_overflow() {
        let data = array![[1000.0, 1001.0]].into_dyn();

        let out = softmax(&data, 1);

        assert!(out.iter().all(|v| v.is_finite()));
        assert!(close(out[[0, 0]] + out[[0, 1]], 1.0));
    }

    #[test]
    fn log_softmax_matches_softmax() {
        let data = array![[0.5, 1.5, -2.0], [3.0, 0.0, 1.0]].into_dyn();

        let log_out = log_softmax(&data, 1);
        let out = softmax(&data, 1);

        for i in 0..2 {
            for j in 0..3 {
                assert!(close(log_out[[i, j]].exp(), out[[i, j]]));
            }
        }
    }

    #[test]
    fn one_dimensional_input_uses_axis_zero() {
        let data = array![1.0, 2.0].into_dyn();

        let out = softmax(&data, 1);

        assert!(close(out[[0]] + out[[1]], 1.0));
    }
}
