use crate::error::{Result, SimError};
use rand::prelude::*;
use rand::rngs::SmallRng;
use rand_distr::{Gamma, Normal};

const BINOMIAL_RESOLUTION: i64 = 1000;

/// Binomial(param, 1/2) shifted to be centred at zero, only for the even
/// parameters 0, 2, 4 and 6 (support sizes 1, 3, 5 and 7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftedBinomial {
    param: u8,
}

impl ShiftedBinomial {
    pub fn new(param: i64) -> Result<ShiftedBinomial> {
        match param {
            0 | 2 | 4 | 6 => Ok(ShiftedBinomial { param: param as u8 }),
            _ => Err(SimError::InvalidBinomialParameter(param)),
        }
    }

    pub fn half_width(&self) -> i32 {
        i32::from(self.param) / 2
    }

    pub fn probability(&self, offset: i32) -> f64 {
        let k = self.half_width();
        if offset.abs() > k {
            return 0.0;
        }
        let n = u32::from(self.param);
        let mut ways = 1.0;
        for i in 0..(k + offset) as u32 {
            ways = ways * f64::from(n - i) / f64::from(i + 1);
        }
        ways / f64::from(1u32 << n)
    }

    /// Walks the table from the tails inwards (-3, 3, -2, 2, -1, 1) and
    /// returns 0 when nothing matched.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> i32 {
        if self.param == 0 {
            return 0;
        }
        let r = rng.gen_range(1..=BINOMIAL_RESOLUTION);
        let mut threshold = 0;
        for n in (1..=3).rev() {
            for offset in [-n, n] {
                threshold += (BINOMIAL_RESOLUTION as f64 * self.probability(offset)) as i64;
                if r < threshold {
                    return offset;
                }
            }
        }
        0
    }
}

/// How a day is scattered around its configured mean.
///
/// Configuration encodes this as a single "selector" number: a negative
/// selector means a normal distribution whose standard deviation is the
/// magnitude, anything else is a shifted-binomial parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DayOffset {
    Binomial(ShiftedBinomial),
    Normal { stdev: f64 },
}

impl DayOffset {
    pub fn from_selector(selector: f64) -> Result<DayOffset> {
        if selector < 0.0 {
            Ok(DayOffset::Normal { stdev: -selector })
        } else {
            Ok(DayOffset::Binomial(ShiftedBinomial::new(selector as i64)?))
        }
    }

    pub fn sample_day(&self, mean: f64, sampler: &mut Sampler) -> Result<i32> {
        match self {
            DayOffset::Binomial(binomial) => Ok(mean as i32 + binomial.sample(sampler.rng())),
            DayOffset::Normal { stdev } => Ok(sampler.normal(mean, *stdev)?.round() as i32),
        }
    }
}

pub struct Sampler {
    rng: SmallRng,
}

impl Sampler {
    pub fn seeded(seed: u64) -> Sampler {
        Sampler {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn rng(&mut self) -> &mut SmallRng {
        &mut self.rng
    }

    /// A zero scale is a point mass at zero (e.g. an R0 of 0).
    pub fn gamma(&mut self, shape: f64, scale: f64) -> Result<f64> {
        if scale == 0.0 {
            return Ok(0.0);
        }
        let distr = Gamma::new(shape, scale).map_err(|e| {
            SimError::Distribution(format!("gamma(shape={}, scale={}): {}", shape, scale, e))
        })?;
        Ok(distr.sample(&mut self.rng))
    }

    pub fn normal(&mut self, mean: f64, stdev: f64) -> Result<f64> {
        let distr = Normal::new(mean, stdev).map_err(|e| {
            SimError::Distribution(format!("normal(mean={}, stdev={}): {}", mean, stdev, e))
        })?;
        Ok(distr.sample(&mut self.rng))
    }

    pub fn uniform(&mut self, low: f64, high: f64) -> f64 {
        if low >= high {
            return low;
        }
        self.rng.gen_range(low..high)
    }

    pub fn uniform_int(&mut self, low: i32, high: i32) -> i32 {
        if low >= high {
            return low;
        }
        self.rng.gen_range(low..=high)
    }

    pub fn index(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len)
    }

    /// True with probability `percent`%. Values outside 0..=100 saturate.
    pub fn chance(&mut self, percent: f64) -> bool {
        self.uniform(0.0, 100.0) < percent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_float_eq::*;

    #[test]
    fn binomial_rejects_odd_and_large_parameters() {
        for bad in [-2, 1, 3, 5, 7, 8, 100] {
            assert!(matches!(
                ShiftedBinomial::new(bad),
                Err(SimError::InvalidBinomialParameter(p)) if p == bad
            ));
        }
        for good in [0, 2, 4, 6] {
            assert!(ShiftedBinomial::new(good).is_ok());
        }
    }

    #[test]
    fn binomial_table_matches_closed_form() {
        let b = ShiftedBinomial::new(6).unwrap();
        assert_float_absolute_eq!(b.probability(-3), 0.015625);
        assert_float_absolute_eq!(b.probability(2), 0.09375);
        assert_float_absolute_eq!(b.probability(1), 0.234375);
        assert_float_absolute_eq!(b.probability(0), 0.3125);
        assert_float_absolute_eq!(b.probability(4), 0.0);

        let b = ShiftedBinomial::new(4).unwrap();
        assert_float_absolute_eq!(b.probability(-2), 0.0625);
        assert_float_absolute_eq!(b.probability(0), 0.375);

        let b = ShiftedBinomial::new(2).unwrap();
        assert_float_absolute_eq!(b.probability(1), 0.25);
        assert_float_absolute_eq!(b.probability(0), 0.5);
        for param in [0, 2, 4, 6] {
            let b = ShiftedBinomial::new(param).unwrap();
            let total: f64 = (-3..=3).map(|n| b.probability(n)).sum();
            assert_float_absolute_eq!(total, 1.0);
        }
    }

    #[test]
    fn binomial_draws_stay_in_support() {
        let mut sampler = Sampler::seeded(7);
        for param in [0, 2, 4, 6] {
            let b = ShiftedBinomial::new(param).unwrap();
            let k = b.half_width();
            let mut counts = vec![0usize; 7];
            for _ in 0..20000 {
                let x = b.sample(sampler.rng());
                assert!(x.abs() <= k, "{} outside support for {}", x, param);
                counts[(x + 3) as usize] += 1;
            }
            let p0 = counts[3] as f64 / 20000.;
            assert!((p0 - b.probability(0)).abs() < 0.02, "p0={} param={}", p0, param);
        }
    }

    #[test]
    fn zero_parameter_uses_no_randomness() {
        let mut a = Sampler::seeded(3);
        let mut b = Sampler::seeded(3);
        let zero = ShiftedBinomial::new(0).unwrap();
        for _ in 0..10 {
            assert_eq!(zero.sample(a.rng()), 0);
        }
        assert_eq!(a.rng().next_u64(), b.rng().next_u64());
    }

    #[test]
    fn negative_selector_means_normal() {
        assert_eq!(
            DayOffset::from_selector(-3.0).unwrap(),
            DayOffset::Normal { stdev: 3.0 }
        );
        assert_eq!(
            DayOffset::from_selector(4.0).unwrap(),
            DayOffset::Binomial(ShiftedBinomial::new(4).unwrap())
        );
        assert!(DayOffset::from_selector(3.0).is_err());
    }

    #[test]
    fn binomial_offset_truncates_mean() {
        let mut sampler = Sampler::seeded(11);
        let offset = DayOffset::from_selector(0.0).unwrap();
        assert_eq!(offset.sample_day(12.9, &mut sampler).unwrap(), 12);
        let offset = DayOffset::from_selector(2.0).unwrap();
        for _ in 0..100 {
            let day = offset.sample_day(12.0, &mut sampler).unwrap();
            assert!((11..=13).contains(&day));
        }
    }

    #[test]
    fn normal_offset_is_centred() {
        let mut sampler = Sampler::seeded(5);
        let offset = DayOffset::from_selector(-2.0).unwrap();
        let mean = (0..10000)
            .map(|_| offset.sample_day(20.0, &mut sampler).unwrap() as f64)
            .sum::<f64>()
            / 10000.;
        assert!((mean - 20.0).abs() < 0.1, "mean={}", mean);
    }

    #[test]
    fn chance_saturates() {
        let mut sampler = Sampler::seeded(1);
        for _ in 0..1000 {
            assert!(sampler.chance(100.0));
            assert!(!sampler.chance(0.0));
            assert!(sampler.chance(250.0));
            assert!(!sampler.chance(-5.0));
            assert!(!sampler.chance(f64::NAN));
        }
        let hits = (0..10000).filter(|_| sampler.chance(30.0)).count();
        assert!((2800..3200).contains(&hits), "hits={}", hits);
    }

    #[test]
    fn gamma_with_zero_scale_is_zero() {
        let mut sampler = Sampler::seeded(1);
        assert_float_absolute_eq!(sampler.gamma(0.1, 0.0).unwrap(), 0.0);
        assert!(sampler.gamma(0.0, 1.0).is_err());
        let mean = (0..20000).map(|_| sampler.gamma(2.0, 3.0).unwrap()).sum::<f64>() / 20000.;
        assert!((mean - 6.0).abs() < 0.2, "mean={}", mean);
    }

    #[test]
    fn same_seed_same_stream() {
        let mut a = Sampler::seeded(42);
        let mut b = Sampler::seeded(42);
        for _ in 0..50 {
            assert_eq!(a.uniform_int(0, 1000), b.uniform_int(0, 1000));
        }
    }
}
