//! MiMC block cipher in Miyaguchi-Preneel mode over a prime field.
//!
//! Parameters follow gnark's `MiMC` for the BLS12-381 scalar field so the hop
//! circuit and the native code agree on every hop key: exponent 5, 111 rounds,
//! round constants from an iterated Keccak-256 chain seeded with `"seed"`.

use ark_ff::PrimeField;
use sha3::{Digest, Keccak256};

pub const MIMC_SEED: &[u8] = b"seed";
pub const MIMC_ROUNDS: usize = 111;

#[derive(Clone, Debug)]
pub struct Mimc<F: PrimeField> {
    constants: Vec<F>,
}

impl<F: PrimeField> Mimc<F> {
    /// Round constants: `rnd_0 = keccak(seed)`, `c_i = keccak(rnd_i)`, each
    /// reduced big-endian into the field and fed forward as the next input.
    pub fn new(seed: &[u8], rounds: usize) -> Self {
        let mut rnd: [u8; 32] = Keccak256::digest(seed).into();
        let constants = (0..rounds)
            .map(|_| {
                rnd = Keccak256::digest(rnd).into();
                F::from_be_bytes_mod_order(&rnd)
            })
            .collect();
        Self { constants }
    }

    pub fn gnark() -> Self {
        Self::new(MIMC_SEED, MIMC_ROUNDS)
    }

    pub fn rounds(&self) -> usize {
        self.constants.len()
    }

    fn encrypt(&self, mut message: F, key: F) -> F {
        for constant in &self.constants {
            let tmp = message + key + constant;
            let sq = tmp.square();
            message = sq.square() * tmp;
        }
        message + key
    }

    /// `h_0 = 0`, `h_{i+1} = E_{h_i}(x_i) + h_i + x_i`.
    pub fn hash(&self, inputs: &[F]) -> F {
        inputs.iter().fold(F::zero(), |h, x| self.encrypt(*x, h) + h + x)
    }
}
