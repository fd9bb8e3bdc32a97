// ============================================================
// Layer 4 - Field Normalisation
// ============================================================
// Raw field maps span many orders of magnitude, so each channel
// is optionally moved to log10 space and then standardised:
//
//   x' = (log10(x) - mean) / std
//
// mean and std come from a reference map file: the channel's
// own file unless another one is given. Using a fixed reference
// keeps train, valid and test on the same scale.

use ndarray::{Array3, Axis};
use serde::{Deserialize, Serialize};

/// Smallest value allowed into log10; empty pixels would give -inf.
const LOG_FLOOR: f32 = f32::MIN_POSITIVE;

/// Standardisation statistics of one field channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldStats {
    pub log10: bool,
    pub mean:  f64,
    pub std:   f64,
}

impl FieldStats {
    /// Mean and population standard deviation over every pixel of a
    /// `[maps, H, W]` reference stack.
    pub fn from_reference(reference: &Array3<f32>, log10: bool) -> Self {
        let transformed = reference.mapv(|v| pre_transform(v, log10) as f64);
        let mean = transformed.mean().unwrap_or(0.0);
        let std  = transformed.std(0.0);

        // A constant reference map would divide by zero
        let std = if std > 0.0 { std } else { 1.0 };
        Self { log10, mean, std }
    }

    /// Normalise a map stack in place.
    pub fn apply(&self, maps: &mut Array3<f32>) {
        maps.mapv_inplace(|v| ((pre_transform(v, self.log10) as f64 - self.mean) / self.std) as f32);
    }
}

/// Subtract each map's own mean (its monopole) from a `[maps, H, W]` stack.
pub fn remove_monopole(maps: &mut Array3<f32>) {
    for mut map in maps.axis_iter_mut(Axis(0)) {
        if let Some(mean) = map.mean() {
            map -= mean;
        }
    }
}

fn pre_transform(v: f32, log10: bool) -> f32 {
    if log10 { v.max(LOG_FLOOR).log10() } else { v }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array};

    fn stack(values: Vec<f32>) -> Array3<f32> {
        let n = values.len();
        Array::from_shape_vec((1, 1, n), values).unwrap()
    }

    #[test]
    fn test_standardised_reference_has_zero_mean_unit_std() {
        let mut maps = Array::from_shape_fn((4, 5, 5), |(m, i, j)| (1 + m * 25 + i * 5 + j) as f32);
        let stats = FieldStats::from_reference(&maps, false);
        assert!((stats.mean - 50.5).abs() < 1e-9);
        stats.apply(&mut maps);

        let out = maps.mapv(|v| v as f64);
        assert!(out.mean().unwrap().abs() < 1e-5);
        assert!((out.std(0.0) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_log_space_statistics() {
        let stats = FieldStats::from_reference(&stack(vec![1.0, 10.0, 100.0]), true);
        // log10 values are 0, 1, 2
        assert!((stats.mean - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_pixels_stay_finite() {
        let mut maps = stack(vec![0.0, 1.0, 2.0]);
        let stats = FieldStats::from_reference(&maps, true);
        stats.apply(&mut maps);
        assert!(maps.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_monopole_removal_is_per_map() {
        let mut maps = array![[[1.0f32, 3.0]], [[10.0, 20.0]]];
        remove_monopole(&mut maps);
        assert_eq!(maps, array![[[-1.0f32, 1.0]], [[-5.0, 5.0]]]);
    }

    #[test]
    fn test_constant_reference_does_not_divide_by_zero() {
        let mut maps = Array3::<f32>::from_elem((2, 2, 2), 3.0);
        let stats = FieldStats::from_reference(&maps, false);
        assert_eq!(stats.std, 1.0);
        stats.apply(&mut maps);
        assert!(maps.iter().all(|&v| v == 0.0));
    }
}
