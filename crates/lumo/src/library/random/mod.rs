//! `random`: seeded pseudo-random numbers, distributions and sampling.
//!
//! All draws come from one MT19937 stream per library instance, so a guest
//! that seeds the generator gets a reproducible sequence.

pub mod mt;

use std::f64::consts::PI;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine as _;

use self::mt::MersenneTwister;
use super::{ret, CallArgs, Exports, Library};
use crate::error::{Error, Result};
use crate::value::RawValue;

type Ret = Result<Option<RawValue>>;

const TWO_PI: f64 = 2.0 * PI;

#[derive(Debug, Clone)]
pub struct Random {
    mt: MersenneTwister,
    gauss_next: Option<f64>,
}

impl Random {
    pub fn new(seed: u32) -> Self {
        Random {
            mt: MersenneTwister::new(seed),
            gauss_next: None,
        }
    }

    pub fn seed(&mut self, seed: u32) {
        self.mt.seed(seed);
        self.gauss_next = None;
    }

    pub fn random(&mut self) -> f64 {
        self.mt.next_f64()
    }

    /// Integer of `k` random bits, `k` at most 64.
    pub fn getrandbits(&mut self, k: u32) -> Result<u64> {
        if k > 64 {
            return Err(Error::distribution("getrandbits", "k must be in 0..=64"));
        }
        let mut result = 0u64;
        let mut bits = 0;
        while bits < k {
            let take = (k - bits).min(32);
            let word = self.mt.next_u32() as u64 & ((1u64 << take) - 1);
            result |= word << bits;
            bits += take;
        }
        Ok(result)
    }

    pub fn randbytes(&mut self, n: usize) -> Vec<u8> {
        (0..n).map(|_| (self.mt.next_u32() & 0xff) as u8).collect()
    }

    pub fn randrange(&mut self, start: f64, stop: f64, step: f64) -> Result<f64> {
        if step == 0.0 {
            return Err(Error::distribution("randrange", "step must not be zero"));
        }
        let width = stop - start;
        let n = if step > 0.0 {
            ((width + step - 1.0) / step).floor()
        } else {
            ((width + step + 1.0) / step).floor()
        };
        if n <= 0.0 {
            return Err(Error::distribution("randrange", format!("empty range ({start}, {stop}, {step})")));
        }
        Ok(start + step * (self.random() * n).floor())
    }

    pub fn randint(&mut self, a: f64, b: f64) -> Result<f64> {
        self.randrange(a, b + 1.0, 1.0)
    }

    pub fn uniform(&mut self, a: f64, b: f64) -> f64 {
        a + (b - a) * self.random()
    }

    pub fn triangular(&mut self, low: f64, high: f64, mode: f64) -> f64 {
        if high == low {
            return low;
        }
        let u = self.random();
        let c = (mode - low) / (high - low);
        if u < c {
            low + (u * (high - low) * (mode - low)).sqrt()
        } else {
            high - ((1.0 - u) * (high - low) * (high - mode)).sqrt()
        }
    }

    /// Box-Muller; the second variate of each pair is kept for the next call.
    pub fn gauss(&mut self, mu: f64, sigma: f64) -> f64 {
        if let Some(z) = self.gauss_next.take() {
            return mu + z * sigma;
        }
        let (u1, u2) = loop {
            let u1 = self.random();
            let u2 = self.random();
            if u1 > f64::EPSILON {
                break (u1, u2);
            }
        };
        let mag = (-2.0 * u1.ln()).sqrt();
        self.gauss_next = Some(mag * (TWO_PI * u2).sin());
        mu + mag * (TWO_PI * u2).cos() * sigma
    }

    pub fn lognormvariate(&mut self, mu: f64, sigma: f64) -> f64 {
        self.gauss(mu, sigma).exp()
    }

    pub fn expovariate(&mut self, lambd: f64) -> Result<f64> {
        if lambd <= 0.0 {
            return Err(Error::distribution("expovariate", "lambd must be > 0"));
        }
        Ok(-(1.0 - self.random()).ln() / lambd)
    }

    pub fn gammavariate(&mut self, alpha: f64, beta: f64) -> Result<f64> {
        if alpha <= 0.0 || beta <= 0.0 {
            return Err(Error::distribution("gammavariate", "alpha and beta must be > 0"));
        }
        Ok(self.standard_gamma(alpha) * beta)
    }

    // Marsaglia-Tsang for alpha > 1; smaller shapes are boosted by one.
    fn standard_gamma(&mut self, alpha: f64) -> f64 {
        if alpha == 1.0 {
            return -(1.0 - self.random()).ln();
        }
        if alpha < 1.0 {
            let boost = (1.0 - self.random()).powf(1.0 / alpha);
            return self.standard_gamma(alpha + 1.0) * boost;
        }
        let d = alpha - 1.0 / 3.0;
        let c = 1.0 / (9.0 * d).sqrt();
        loop {
            let (x, v) = loop {
                let x = self.gauss(0.0, 1.0);
                let v = 1.0 + c * x;
                if v > 0.0 {
                    break (x, v * v * v);
                }
            };
            let u = self.random();
            if u < 1.0 - 0.0331 * x.powi(4) || u.ln() < 0.5 * x * x + d * (1.0 - v + v.ln()) {
                return d * v;
            }
        }
    }

    pub fn betavariate(&mut self, alpha: f64, beta: f64) -> Result<f64> {
        if alpha <= 0.0 || beta <= 0.0 {
            return Err(Error::distribution("betavariate", "alpha and beta must be > 0"));
        }
        let y1 = self.standard_gamma(alpha);
        let y2 = self.standard_gamma(beta);
        if y1 + y2 == 0.0 {
            return Ok(0.0);
        }
        Ok(y1 / (y1 + y2))
    }

    pub fn paretovariate(&mut self, alpha: f64) -> Result<f64> {
        if alpha <= 0.0 {
            return Err(Error::distribution("paretovariate", "alpha must be > 0"));
        }
        Ok((1.0 - self.random()).powf(-1.0 / alpha))
    }

    pub fn weibullvariate(&mut self, alpha: f64, beta: f64) -> Result<f64> {
        if alpha <= 0.0 || beta <= 0.0 {
            return Err(Error::distribution("weibullvariate", "alpha and beta must be > 0"));
        }
        Ok(beta * (-(1.0 - self.random()).ln()).powf(1.0 / alpha))
    }

    pub fn vonmisesvariate(&mut self, mu: f64, kappa: f64) -> f64 {
        if kappa <= 1e-6 {
            return mu + TWO_PI * self.random();
        }
        let a = 1.0 + (1.0 + 4.0 * kappa * kappa).sqrt();
        let b = (a - (2.0 * a).sqrt()) / (2.0 * kappa);
        let r = (1.0 + b * b) / (2.0 * b);
        loop {
            let z = (PI * self.random()).cos();
            let f = (1.0 + r * z) / (r + z);
            let c = kappa * (r - f);
            let u2 = self.random();
            if u2 < c * (2.0 - c) || u2 <= c * (1.0 - c).exp() {
                let theta = if self.random() > 0.5 { f.acos() } else { -f.acos() };
                return (mu + theta + TWO_PI) % TWO_PI;
            }
        }
    }

    fn index(&mut self, len: usize) -> usize {
        ((self.random() * len as f64) as usize).min(len - 1)
    }

    pub fn choice<T: Copy>(&mut self, items: &[T]) -> Result<T> {
        if items.is_empty() {
            return Err(Error::distribution("choice", "cannot choose from an empty sequence"));
        }
        Ok(items[self.index(items.len())])
    }

    /// `k` draws with replacement, weighted by relative or cumulative weights.
    pub fn choices<T: Copy>(
        &mut self,
        population: &[T],
        weights: Option<&[f64]>,
        cum_weights: Option<&[f64]>,
        k: usize,
    ) -> Result<Vec<T>> {
        let n = population.len();
        if n == 0 {
            return Err(Error::distribution("choices", "population is empty"));
        }
        let cumulative: Vec<f64> = match (weights, cum_weights) {
            (Some(_), Some(_)) => {
                return Err(Error::distribution(
                    "choices",
                    "cannot specify both weights and cumulative weights",
                ))
            }
            (None, None) => return Ok((0..k).map(|_| population[self.index(n)]).collect()),
            (Some(weights), None) => weights
                .iter()
                .scan(0.0, |total, w| {
                    *total += w;
                    Some(*total)
                })
                .collect(),
            (None, Some(cum)) => cum.to_vec(),
        };
        if cumulative.len() != n {
            return Err(Error::distribution("choices", "weights must match the population length"));
        }
        let total = cumulative[n - 1];
        if !(total > 0.0 && total.is_finite()) {
            return Err(Error::distribution("choices", "total of weights must be finite and > 0"));
        }
        Ok((0..k)
            .map(|_| {
                let r = self.random() * total;
                let i = cumulative.partition_point(|&c| c <= r).min(n - 1);
                population[i]
            })
            .collect())
    }

    /// Fisher-Yates.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.index(i + 1);
            items.swap(i, j);
        }
    }

    /// `k` distinct positions drawn without replacement.
    pub fn sample<T: Copy>(&mut self, population: &[T], k: usize) -> Result<Vec<T>> {
        if k > population.len() {
            return Err(Error::distribution("sample", "sample larger than population"));
        }
        let mut pool = population.to_vec();
        Ok((0..k)
            .map(|_| {
                let i = self.index(pool.len());
                pool.remove(i)
            })
            .collect())
    }
}

impl Default for Random {
    fn default() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        Random::new(millis as u32)
    }
}

fn count(function: &'static str, k: i32) -> Result<usize> {
    usize::try_from(k).map_err(|_| Error::distribution(function, "k must be non-negative"))
}

impl Library for Random {
    const NAME: &'static str = "random";

    fn register(exports: &mut Exports<Self>) {
        exports
            .func("seed", |rng, args| {
                rng.seed(args.int(0)? as u32);
                Ok(None)
            })
            .func("getstate", |rng, args| {
                let state = rng.mt.to_json()?;
                args.ret_str(&state)
            })
            .func("setstate", |rng, args| {
                rng.mt = MersenneTwister::from_json(&args.str(0)?)?;
                rng.gauss_next = None;
                Ok(None)
            })
            .func("random", |rng, _| ret(rng.random()))
            .func("getrandbits", |rng, args| {
                let k = u32::try_from(args.int(0)?)
                    .map_err(|_| Error::distribution("getrandbits", "k must be non-negative"))?;
                ret(rng.getrandbits(k)? as f64)
            })
            .func("randbytes", |rng, args| {
                let n = count("randbytes", args.int(0)?)?;
                let encoded = base64::engine::general_purpose::STANDARD.encode(rng.randbytes(n));
                args.ret_str(&encoded)
            })
            .func("randrange", |rng, args| {
                ret(rng.randrange(args.num(0)?, args.num(1)?, args.num(2)?)?)
            })
            .func("randint", |rng, args| ret(rng.randint(args.num(0)?, args.num(1)?)?))
            .func("uniform", |rng, args| ret(rng.uniform(args.num(0)?, args.num(1)?)))
            .func("triangular", |rng, args| {
                ret(rng.triangular(args.num(0)?, args.num(1)?, args.num(2)?))
            })
            .func("gauss", |rng, args| ret(rng.gauss(args.num(0)?, args.num(1)?)))
            .func("normalvariate", |rng, args| ret(rng.gauss(args.num(0)?, args.num(1)?)))
            .func("lognormvariate", |rng, args| {
                ret(rng.lognormvariate(args.num(0)?, args.num(1)?))
            })
            .func("expovariate", |rng, args| ret(rng.expovariate(args.num(0)?)?))
            .func("gammavariate", |rng, args| {
                ret(rng.gammavariate(args.num(0)?, args.num(1)?)?)
            })
            .func("betavariate", |rng, args| {
                ret(rng.betavariate(args.num(0)?, args.num(1)?)?)
            })
            .func("paretovariate", |rng, args| ret(rng.paretovariate(args.num(0)?)?))
            .func("weibullvariate", |rng, args| {
                ret(rng.weibullvariate(args.num(0)?, args.num(1)?)?)
            })
            .func("vonmisesvariate", |rng, args| {
                ret(rng.vonmisesvariate(args.num(0)?, args.num(1)?))
            })
            .func("choice", |rng, args| ret(rng.choice(&args.int_array(0)?)?))
            .func("choices", choices)
            .func("shuffle", |rng, args| {
                let mut items = args.int_array(0)?;
                rng.shuffle(&mut items);
                args.ret_int_array(items)
            })
            .func("sample", |rng, args| {
                let population = args.int_array(0)?;
                let k = count("sample", args.int(1)?)?;
                let picked = rng.sample(&population, k)?;
                args.ret_int_array(picked)
            });
    }
}

fn choices(rng: &mut Random, args: &mut CallArgs<'_>) -> Ret {
    let population = args.int_array(0)?;
    let weights = args.opt_num_array(1)?;
    let cum_weights = args.opt_num_array(2)?;
    let k = count("choices", args.int(3)?)?;
    let picked = rng.choices(&population, weights.as_deref(), cum_weights.as_deref(), k)?;
    args.ret_int_array(picked)
}
