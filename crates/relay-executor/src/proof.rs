//! the two shapes every request carries verbatim from the client's
//! ZK-proving step: the Groth16 proof itself and the public-inputs vector
//! the circuit bound to (SPEC_FULL.md §4.5).

use field_hash::Fr;

use crate::error::{RelayError, Result};

/// a Groth16 proof in the on-chain verifier's serialization: exactly 8
/// field elements (SPEC_FULL.md §4.5 "Shape" gate).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proof(pub [Fr; 8]);

impl Proof {
    pub fn from_vec(elements: Vec<Fr>) -> Result<Self> {
        let len = elements.len();
        let arr: [Fr; 8] = elements.try_into().map_err(|_| RelayError::ProofShape(len))?;
        Ok(Proof(arr))
    }

    pub fn as_slice(&self) -> &[Fr; 8] {
        &self.0
    }
}

/// the ordered vector of field elements the circuit actually bound to,
/// checked against the request's plaintext fields by the public-inputs
/// consistency gate when supplied.
pub type PublicInputs = Vec<Fr>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_length() {
        let short = vec![Fr::zero(); 7];
        assert!(matches!(Proof::from_vec(short), Err(RelayError::ProofShape(7))));
    }

    #[test]
    fn accepts_exactly_eight() {
        let eight = vec![Fr::zero(); 8];
        assert!(Proof::from_vec(eight).is_ok());
    }
}
