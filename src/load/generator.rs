//! Load Generator - Requested concurrency as a function of elapsed time

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

use super::{LoadPattern, LoadTestConfig, SPIKE_WINDOW_SECS};

/// Pure mapping from elapsed seconds to requested load
#[derive(Debug, Clone)]
pub struct LoadGenerator {
    config: LoadTestConfig,
}

impl LoadGenerator {
    pub fn new(config: LoadTestConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LoadTestConfig {
        &self.config
    }

    /// Requested load at `elapsed_secs`.
    ///
    /// Step, Ramp and Wave are clamped to `[initial_load, max_load]`. Random is
    /// drawn from an RNG seeded by the config seed and the whole elapsed
    /// second, so repeated calls agree.
    pub fn current_load(&self, elapsed_secs: f64) -> u32 {
        let c = &self.config;
        let elapsed = if elapsed_secs.is_finite() {
            elapsed_secs.max(0.0)
        } else {
            0.0
        };
        let initial = c.initial_load;
        let max = c.max_load.max(initial);

        match c.pattern {
            LoadPattern::Constant => initial,
            LoadPattern::Step => {
                let steps = (elapsed / c.step_duration_secs).floor();
                let load = initial as f64 + steps * c.step_size as f64;
                clamp_load(load, initial, max)
            }
            LoadPattern::Ramp => {
                let load = initial as f64 + elapsed * c.ramp_rate;
                clamp_load(load.floor(), initial, max)
            }
            LoadPattern::Wave => {
                let phase = (2.0 * PI * elapsed / c.wave_period_secs).sin();
                let load = initial as f64 + (max - initial) as f64 * (1.0 + phase) / 2.0;
                clamp_load(load.round(), initial, max)
            }
            LoadPattern::Spike => {
                let in_spike = c
                    .spike_times_secs
                    .iter()
                    .any(|t| (elapsed - t).abs() <= SPIKE_WINDOW_SECS);
                if in_spike {
                    c.spike_height
                } else {
                    initial
                }
            }
            LoadPattern::Random => {
                let second = elapsed.floor() as u64;
                let mut rng = SmallRng::seed_from_u64(
                    c.random_seed ^ second.wrapping_mul(0x9E37_79B9_7F4A_7C15),
                );
                rng.gen_range(initial..=max)
            }
        }
    }
}

fn clamp_load(load: f64, initial: u32, max: u32) -> u32 {
    if !load.is_finite() {
        return initial;
    }
    load.clamp(initial as f64, max as f64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator(config: LoadTestConfig) -> LoadGenerator {
        LoadGenerator::new(config)
    }

    #[test]
    fn step_reaches_fifty_at_two_minutes() {
        let gen = generator(
            LoadTestConfig::new(LoadPattern::Step)
                .with_loads(10, 100)
                .with_step(10, 30.0),
        );
        assert_eq!(gen.current_load(0.0), 10);
        assert_eq!(gen.current_load(29.9), 10);
        assert_eq!(gen.current_load(30.0), 20);
        assert_eq!(gen.current_load(120.0), 50);
        assert_eq!(gen.current_load(10_000.0), 100);
    }

    #[test]
    fn ramp_caps_at_max() {
        let gen = generator(
            LoadTestConfig::new(LoadPattern::Ramp)
                .with_loads(2, 20)
                .with_ramp_rate(0.5),
        );
        assert_eq!(gen.current_load(0.0), 2);
        assert_eq!(gen.current_load(10.0), 7);
        assert_eq!(gen.current_load(1_000.0), 20);
    }

    #[test]
    fn wave_oscillates_between_bounds() {
        let gen = generator(
            LoadTestConfig::new(LoadPattern::Wave)
                .with_loads(10, 30)
                .with_wave_period(40.0),
        );
        assert_eq!(gen.current_load(0.0), 20);
        assert_eq!(gen.current_load(10.0), 30);
        assert_eq!(gen.current_load(30.0), 10);
    }

    #[test]
    fn spike_window_is_plus_minus_five_seconds() {
        let gen = generator(
            LoadTestConfig::new(LoadPattern::Spike)
                .with_loads(5, 50)
                .with_spikes(vec![60.0, 150.0], 50),
        );
        assert_eq!(gen.current_load(0.0), 5);
        assert_eq!(gen.current_load(54.9), 5);
        assert_eq!(gen.current_load(55.0), 50);
        assert_eq!(gen.current_load(65.0), 50);
        assert_eq!(gen.current_load(65.1), 5);
        assert_eq!(gen.current_load(150.0), 50);
    }

    #[test]
    fn random_is_reproducible_and_bounded() {
        let config = LoadTestConfig::new(LoadPattern::Random)
            .with_loads(3, 9)
            .with_random_seed(1234);
        let a = generator(config.clone());
        let b = generator(config);

        for s in 0..100 {
            let t = s as f64 + 0.25;
            let load = a.current_load(t);
            assert!((3..=9).contains(&load));
            assert_eq!(load, b.current_load(t));
            assert_eq!(load, a.current_load(s as f64));
        }
    }

    #[test]
    fn bounded_patterns_stay_in_range() {
        for pattern in [LoadPattern::Step, LoadPattern::Ramp, LoadPattern::Wave] {
            let config = LoadTestConfig::new(pattern)
                .with_loads(4, 40)
                .with_step(7, 3.0)
                .with_ramp_rate(1.7)
                .with_wave_period(13.0)
                .with_duration_secs(600);
            let gen = generator(config);

            let mut t = 0.0;
            while t <= 600.0 {
                let load = gen.current_load(t);
                assert!((4..=40).contains(&load), "{} at {}: {}", pattern, t, load);
                t += 0.5;
            }
        }
    }

    #[test]
    fn negative_or_nan_elapsed_treated_as_zero() {
        let gen = generator(
            LoadTestConfig::new(LoadPattern::Ramp)
                .with_loads(1, 10)
                .with_ramp_rate(1.0),
        );
        assert_eq!(gen.current_load(-5.0), 1);
        assert_eq!(gen.current_load(f64::NAN), 1);
    }

    #[test]
    fn constant_ignores_time() {
        let gen = generator(LoadTestConfig::new(LoadPattern::Constant).with_loads(6, 60));
        assert_eq!(gen.current_load(0.0), 6);
        assert_eq!(gen.current_load(9_999.0), 6);
    }
}
