use serde::{Deserialize, Serialize};

/// Min-max normalization to [0, 1]. Fit exclusively on the training
/// slice so no statistics leak from validation or future bars; the
/// transform itself is a pure function usable on any value afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinMaxScaler {
    min: f64,
    max: f64,
}

impl MinMaxScaler {
    pub fn fit(data: &[f64]) -> Self {
        let min = data.iter().copied().fold(f64::INFINITY, f64::min);
        let max = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Self { min, max }
    }

    fn span(&self) -> f64 {
        self.max - self.min
    }

    pub fn transform(&self, value: f64) -> f64 {
        if self.span() == 0.0 {
            return 0.5;
        }
        (value - self.min) / self.span()
    }

    pub fn transform_all(&self, data: &[f64]) -> Vec<f64> {
        data.iter().map(|&v| self.transform(v)).collect()
    }

    pub fn invert(&self, value: f64) -> f64 {
        if self.span() == 0.0 {
            return self.min;
        }
        value * self.span() + self.min
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_maps_fit_range_to_unit_interval() {
        let scaler = MinMaxScaler::fit(&[10.0, 20.0, 30.0]);

        assert_eq!(scaler.transform(10.0), 0.0);
        assert_eq!(scaler.transform(30.0), 1.0);
        assert_eq!(scaler.transform(20.0), 0.5);
    }

    #[test]
    fn invert_round_trips() {
        let scaler = MinMaxScaler::fit(&[42.5, 99.0, 63.1]);
        for v in [42.5, 55.0, 99.0, 120.0] {
            let back = scaler.invert(scaler.transform(v));
            assert!((back - v).abs() < 1e-9);
        }
    }

    #[test]
    fn values_outside_fit_range_extrapolate() {
        let scaler = MinMaxScaler::fit(&[0.0, 100.0]);
        assert_eq!(scaler.transform(150.0), 1.5);
        assert_eq!(scaler.transform(-50.0), -0.5);
    }

    #[test]
    fn degenerate_range_stays_finite() {
        let scaler = MinMaxScaler::fit(&[7.0, 7.0, 7.0]);
        assert_eq!(scaler.transform(7.0), 0.5);
        assert_eq!(scaler.invert(scaler.transform(7.0)), 7.0);
    }
}
