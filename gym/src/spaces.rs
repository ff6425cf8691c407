use tch::Tensor;

/// A finite set of actions `0..n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Discrete {
    pub n: i64,
}

impl Discrete {
    pub fn new(n: i64) -> Self {
        Self { n }
    }

    pub fn contains(&self, action: i64) -> bool {
        (0..self.n).contains(&action)
    }
}

/// A box in R^n with per-dimension bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxSpace {
    pub low: Vec<f32>,
    pub high: Vec<f32>,
}

impl BoxSpace {
    /// Symmetric box `[-high, high]`.
    pub fn symmetric(high: Vec<f32>) -> Self {
        let low = high.iter().map(|h| -h).collect();
        Self { low, high }
    }

    pub fn shape(&self) -> Vec<i64> {
        vec![self.high.len() as i64]
    }

    pub fn contains(&self, obs: &Tensor) -> bool {
        if obs.size() != self.shape() {
            return false;
        }
        self.low
            .iter()
            .zip(self.high.iter())
            .enumerate()
            .all(|(i, (low, high))| {
                let v = obs.double_value(&[i as i64]);
                v >= *low as f64 && v <= *high as f64
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discrete_contains() {
        let space = Discrete::new(2);
        assert!(space.contains(0));
        assert!(space.contains(1));
        assert!(!space.contains(2));
        assert!(!space.contains(-1));
    }

    #[test]
    fn box_contains_checks_bounds_and_shape() {
        let space = BoxSpace::symmetric(vec![1.0, 2.0]);
        assert!(space.contains(&Tensor::of_slice(&[0.5f32, -2.0])));
        assert!(!space.contains(&Tensor::of_slice(&[1.5f32, 0.0])));
        assert!(!space.contains(&Tensor::of_slice(&[0.0f32, 0.0, 0.0])));
    }
}
