//! HyperLogLog cardinality sketch
//!
//! Sketches are mergeable property values: merging takes the register-wise
//! maximum, which is associative and commutative, so partial sketches built
//! on different partitions combine to the same result in any order.

use serde::{Deserialize, Serialize};

use crate::CoreError;

const MIN_PRECISION: u8 = 4;
const MAX_PRECISION: u8 = 16;

/// Default precision (1024 registers)
pub const DEFAULT_PRECISION: u8 = 10;

/// A HyperLogLog sketch estimating the number of distinct items offered
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HyperLogLog {
    precision: u8,
    registers: Vec<u8>,
}

impl Default for HyperLogLog {
    fn default() -> Self {
        Self {
            precision: DEFAULT_PRECISION,
            registers: vec![0; 1 << DEFAULT_PRECISION],
        }
    }
}

impl HyperLogLog {
    /// Create an empty sketch with the given precision
    pub fn new(precision: u8) -> Result<Self, CoreError> {
        if !(MIN_PRECISION..=MAX_PRECISION).contains(&precision) {
            return Err(CoreError::Schema(format!(
                "HyperLogLog precision must be between {} and {}, got {}",
                MIN_PRECISION, MAX_PRECISION, precision
            )));
        }
        Ok(Self {
            precision,
            registers: vec![0; 1 << precision],
        })
    }

    /// Rebuild a sketch from raw registers
    pub fn from_registers(precision: u8, registers: Vec<u8>) -> Result<Self, CoreError> {
        let mut sketch = Self::new(precision)?;
        if registers.len() != sketch.registers.len() {
            return Err(CoreError::Serialisation(format!(
                "HyperLogLog with precision {} needs {} registers, got {}",
                precision,
                sketch.registers.len(),
                registers.len()
            )));
        }
        sketch.registers = registers;
        Ok(sketch)
    }

    /// Precision (log2 of the register count)
    #[inline]
    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// Raw registers
    #[inline]
    pub fn registers(&self) -> &[u8] {
        &self.registers
    }

    /// Offer raw bytes to the sketch
    pub fn offer_bytes(&mut self, bytes: &[u8]) {
        let hash = mix64(fnv1a64(bytes));
        let p = u32::from(self.precision);
        let index = (hash >> (64 - p)) as usize;
        let remaining = (hash << p) | (1 << (p - 1));
        let rank = (remaining.leading_zeros() + 1) as u8;
        if rank > self.registers[index] {
            self.registers[index] = rank;
        }
    }

    /// Offer a string to the sketch
    pub fn offer(&mut self, item: &str) {
        self.offer_bytes(item.as_bytes());
    }

    /// Merge another sketch into this one
    pub fn merge(&mut self, other: &HyperLogLog) -> Result<(), CoreError> {
        if self.precision != other.precision {
            return Err(CoreError::operation(format!(
                "cannot merge HyperLogLog sketches with precisions {} and {}",
                self.precision, other.precision
            )));
        }
        for (mine, theirs) in self.registers.iter_mut().zip(&other.registers) {
            if *theirs > *mine {
                *mine = *theirs;
            }
        }
        Ok(())
    }

    /// Estimated number of distinct items offered
    pub fn cardinality(&self) -> u64 {
        let m = self.registers.len() as f64;
        let alpha = match self.registers.len() {
            16 => 0.673,
            32 => 0.697,
            64 => 0.709,
            _ => 0.7213 / (1.0 + 1.079 / m),
        };
        let sum: f64 = self
            .registers
            .iter()
            .map(|r| 2f64.powi(-i32::from(*r)))
            .sum();
        let estimate = alpha * m * m / sum;
        let zeros = self.registers.iter().filter(|r| **r == 0).count();
        if estimate <= 2.5 * m && zeros > 0 {
            (m * (m / zeros as f64).ln()).round() as u64
        } else {
            estimate.round() as u64
        }
    }
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

// splitmix64 finaliser; FNV alone leaves the high bits poorly distributed
fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
