use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const BASE_TEMPERATURE: f64 = 80.0;
const TEMPERATURE_SPAN: f64 = 20.0;

/// Synthetic engine temperature in the [80, 100) range.
#[derive(Debug)]
pub struct EngineTemperatureSensor {
    rng: StdRng,
    temperature: f64
}

impl EngineTemperatureSensor {
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    #[cfg(test)]
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        EngineTemperatureSensor {
            rng,
            temperature: 0.0
        }
    }

    /// Samples a new reading and returns it.
    pub fn read(&mut self) -> f64 {
        self.temperature = BASE_TEMPERATURE + self.rng.gen::<f64>() * TEMPERATURE_SPAN;
        self.temperature
    }
}
