use serde::{Deserialize, Serialize};

/// Number of samples a `SimpleEwma` roughly averages over.
pub const DEFAULT_AGE: f64 = 30.0;

/// Samples a `VariableEwma` collects before it reports anything.
pub const WARMUP_SAMPLES: u32 = 10;

pub trait MovingAverage: Send + Sync {
    fn add(&mut self, sample: f64);
    fn value(&self) -> f64;
    fn set(&mut self, value: f64);
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AverageKind {
    #[default]
    Simple,
    Variable,
}

impl AverageKind {
    pub fn build(self, age: f64) -> Box<dyn MovingAverage> {
        match self {
            AverageKind::Simple => Box::new(SimpleEwma::with_age(age)),
            AverageKind::Variable => Box::new(VariableEwma::with_age(age)),
        }
    }
}

fn decay_for(age: f64) -> f64 {
    // ages below one sample would make the weight exceed 1
    let age = if age.is_finite() && age >= 1.0 { age } else { DEFAULT_AGE };
    2.0 / (age + 1.0)
}

/// Exponential moving average seeded by its first sample.
#[derive(Clone, Debug)]
pub struct SimpleEwma {
    decay: f64,
    value: f64,
}

impl SimpleEwma {
    pub fn new() -> Self {
        Self::with_age(DEFAULT_AGE)
    }

    pub fn with_age(age: f64) -> Self {
        Self { decay: decay_for(age), value: 0.0 }
    }
}

impl Default for SimpleEwma {
    fn default() -> Self {
        Self::new()
    }
}

impl MovingAverage for SimpleEwma {
    fn add(&mut self, sample: f64) {
        if !sample.is_finite() {
            return;
        }
        if self.value == 0.0 {
            self.value = sample;
        } else {
            self.value = sample * self.decay + self.value * (1.0 - self.decay);
        }
    }

    fn value(&self) -> f64 {
        self.value
    }

    fn set(&mut self, value: f64) {
        if value.is_finite() {
            self.value = value;
        }
    }
}

/// Exponential moving average that reports zero until it has seen
/// `WARMUP_SAMPLES` samples, then starts from their arithmetic mean.
#[derive(Clone, Debug)]
pub struct VariableEwma {
    decay: f64,
    value: f64,
    count: u32,
}

impl VariableEwma {
    pub fn new() -> Self {
        Self::with_age(DEFAULT_AGE)
    }

    pub fn with_age(age: f64) -> Self {
        Self { decay: decay_for(age), value: 0.0, count: 0 }
    }

    pub fn is_warm(&self) -> bool {
        self.count >= WARMUP_SAMPLES
    }
}

impl Default for VariableEwma {
    fn default() -> Self {
        Self::new()
    }
}

impl MovingAverage for VariableEwma {
    fn add(&mut self, sample: f64) {
        if !sample.is_finite() {
            return;
        }
        if self.count < WARMUP_SAMPLES {
            self.count += 1;
            self.value += sample;
            if self.count == WARMUP_SAMPLES {
                self.value /= f64::from(WARMUP_SAMPLES);
            }
        } else {
            self.value = sample * self.decay + self.value * (1.0 - self.decay);
        }
    }

    fn value(&self) -> f64 {
        if self.is_warm() {
            self.value
        } else {
            0.0
        }
    }

    fn set(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.value = value;
        self.count = self.count.max(WARMUP_SAMPLES);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn simple_starts_at_zero() {
        let avg = SimpleEwma::new();
        assert_eq!(avg.value(), 0.0);
    }

    #[test]
    fn simple_seeds_with_first_sample() {
        let mut avg = SimpleEwma::new();
        avg.add(250.0);
        assert_eq!(avg.value(), 250.0);
    }

    #[test]
    fn simple_weights_new_samples_by_decay() {
        let mut avg = SimpleEwma::with_age(3.0); // decay 0.5
        avg.add(100.0);
        avg.add(200.0);
        assert!(close(avg.value(), 150.0));
        avg.add(0.0);
        assert!(close(avg.value(), 75.0));
    }

    #[test]
    fn simple_reseeds_while_zero() {
        let mut avg = SimpleEwma::with_age(3.0); // decay 0.5
        avg.add(0.0);
        assert_eq!(avg.value(), 0.0);
        avg.add(100.0);
        assert_eq!(avg.value(), 100.0);
        // a zero sample on a non-zero average decays it
        avg.add(0.0);
        assert!(close(avg.value(), 50.0));
        avg.add(0.0);
        assert!(close(avg.value(), 25.0));
    }

    #[test]
    fn simple_converges_to_constant_rate() {
        let mut avg = SimpleEwma::new();
        avg.add(5_000.0);
        for _ in 0..500 {
            avg.add(1_000.0);
        }
        assert!(close(avg.value(), 1_000.0));
    }

    #[test]
    fn simple_ignores_non_finite_samples() {
        let mut avg = SimpleEwma::new();
        avg.add(10.0);
        avg.add(f64::NAN);
        avg.add(f64::INFINITY);
        assert_eq!(avg.value(), 10.0);
    }

    #[test]
    fn invalid_age_falls_back_to_default() {
        let mut a = SimpleEwma::with_age(0.0);
        let mut b = SimpleEwma::new();
        for s in [10.0, 40.0, 5.0] {
            a.add(s);
            b.add(s);
        }
        assert_eq!(a.value(), b.value());
    }

    #[test]
    fn variable_reports_zero_until_warm() {
        let mut avg = VariableEwma::new();
        for i in 0..WARMUP_SAMPLES - 1 {
            avg.add(f64::from(i + 1));
            assert_eq!(avg.value(), 0.0);
        }
        avg.add(10.0);
        assert!(avg.is_warm());
        assert!(close(avg.value(), 5.5));
    }

    #[test]
    fn variable_converges_to_constant_rate() {
        let mut avg = VariableEwma::new();
        for _ in 0..500 {
            avg.add(42.0);
        }
        assert!(close(avg.value(), 42.0));
    }

    #[test]
    fn set_overrides_value() {
        let mut avg = VariableEwma::new();
        avg.set(7.0);
        assert_eq!(avg.value(), 7.0);
        let mut avg = SimpleEwma::new();
        avg.set(3.0);
        avg.add(3.0);
        assert_eq!(avg.value(), 3.0);
    }

    #[test]
    fn kind_builds_matching_engine() {
        let mut simple = AverageKind::Simple.build(DEFAULT_AGE);
        simple.add(9.0);
        assert_eq!(simple.value(), 9.0);
        let mut variable = AverageKind::Variable.build(DEFAULT_AGE);
        variable.add(9.0);
        assert_eq!(variable.value(), 0.0);
    }
}
