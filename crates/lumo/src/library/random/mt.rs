//! MT19937, the 32-bit Mersenne Twister.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const N: usize = 624;
const M: usize = 397;
const MATRIX_A: u32 = 0x9908_b0df;
const UPPER_MASK: u32 = 0x8000_0000;
const LOWER_MASK: u32 = 0x7fff_ffff;

/// Generator state. Serializes as `{"state": [..624 words], "index": n}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MersenneTwister {
    state: Vec<u32>,
    index: usize,
}

impl MersenneTwister {
    pub fn new(seed: u32) -> Self {
        let mut mt = MersenneTwister {
            state: vec![0; N],
            index: N,
        };
        mt.seed(seed);
        mt
    }

    pub fn seed(&mut self, seed: u32) {
        self.state[0] = seed;
        for i in 1..N {
            let prev = self.state[i - 1];
            self.state[i] = 1_812_433_253u32
                .wrapping_mul(prev ^ (prev >> 30))
                .wrapping_add(i as u32);
        }
        self.index = N;
    }

    pub fn next_u32(&mut self) -> u32 {
        if self.index >= N {
            self.twist();
        }
        let mut y = self.state[self.index];
        self.index += 1;
        y ^= y >> 11;
        y ^= (y << 7) & 0x9d2c_5680;
        y ^= (y << 15) & 0xefc6_0000;
        y ^ (y >> 18)
    }

    /// Uniform float in `[0, 1)` with 32-bit resolution.
    pub fn next_f64(&mut self) -> f64 {
        self.next_u32() as f64 * (1.0 / 4_294_967_296.0)
    }

    fn twist(&mut self) {
        let mag = |y: u32| if y & 1 == 0 { 0 } else { MATRIX_A };
        for kk in 0..N {
            let y = (self.state[kk] & UPPER_MASK) | (self.state[(kk + 1) % N] & LOWER_MASK);
            self.state[kk] = self.state[(kk + M) % N] ^ (y >> 1) ^ mag(y);
        }
        self.index = 0;
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::capability("getstate", e))
    }

    /// Restore state written by [`to_json`](Self::to_json).
    pub fn from_json(text: &str) -> Result<Self> {
        let mt: MersenneTwister =
            serde_json::from_str(text).map_err(|e| Error::capability("setstate", e))?;
        if mt.state.len() != N || mt.index > N {
            return Err(Error::capability(
                "setstate",
                format!("expected {N} state words and index <= {N}"),
            ));
        }
        Ok(mt)
    }
}
