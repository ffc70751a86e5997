//! Price statistics used by the engine

use statrs::statistics::Statistics;

/// Population standard deviation (divides by n, not n - 1).
///
/// Returns NaN for an empty slice.
pub fn population_std_dev(values: &[f64]) -> f64 {
    values.iter().population_std_dev()
}

/// Arithmetic mean. Returns NaN for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    values.iter().mean()
}

/// Highest value in the slice, `None` when empty
pub fn highest(values: &[f64]) -> Option<f64> {
    values
        .iter()
        .copied()
        .fold(None, |max, v| Some(max.map_or(v, |m: f64| m.max(v))))
}

/// Rolling population standard deviation over `period` samples
pub fn rolling_std_dev(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }

    (0..values.len())
        .map(|i| {
            if i + 1 < period {
                None
            } else {
                Some(population_std_dev(&values[i + 1 - period..=i]))
            }
        })
        .collect()
}
