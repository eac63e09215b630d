//! the seven ordered, fail-fast policy gates (SPEC_FULL.md §4.5). Every
//! submission and every `/relay/simulate` dry-run runs the same gates in
//! the same order so "would this pass" and "did this pass" never diverge.

use chain_client::rpc::ChainClient;
use chain_client::{abi::AbiValue, Address};
use field_hash::Fr;
use pool_state::Pool;

use crate::error::{RelayError, Result};
use crate::proof::PublicInputs;
use crate::request::RelayRequest;

pub const MAX_MEMO_BYTES: usize = 1024;
pub const MAX_BATCH_SIZE: usize = 100;
/// default fee ceiling, 0.5% expressed in basis points.
pub const DEFAULT_FEE_CEILING_BPS: u32 = 50;

#[derive(Clone, Debug)]
pub struct FeePolicy {
    pub min_fee_floor: u128,
    pub ceiling_bps: u32,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            min_fee_floor: 0,
            ceiling_bps: DEFAULT_FEE_CEILING_BPS,
        }
    }
}

/// field-element embedding of a 20-byte address: left-padded with zeros,
/// always canonical since 2^160 < the BN254 scalar modulus.
pub fn fr_from_address(address: Address) -> Fr {
    let mut buf = [0u8; 32];
    buf[12..].copy_from_slice(&address.0);
    Fr::from_bytes_be(&buf).expect("20-byte address always embeds canonically")
}

/// field-element embedding of a base-unit amount.
pub fn fr_from_amount(amount: u128) -> Fr {
    let mut buf = [0u8; 32];
    buf[16..].copy_from_slice(&amount.to_be_bytes());
    Fr::from_bytes_be(&buf).expect("u128 amount always embeds canonically")
}

fn check_positions(public_inputs: &PublicInputs, expected: &[Fr]) -> Result<()> {
    if public_inputs.len() < expected.len() {
        return Err(RelayError::PublicInputsShape {
            got: public_inputs.len(),
            expected: expected.len(),
        });
    }
    for (i, (got, want)) in public_inputs.iter().zip(expected.iter()).enumerate() {
        if got != want {
            return Err(RelayError::PublicInputsMismatch { index: i });
        }
    }
    Ok(())
}

// --- gate 1: relay availability -----------------------------------------

pub fn gate_availability(native_balance: u128, gas_floor: u128) -> Result<()> {
    if native_balance < gas_floor {
        return Err(RelayError::RelayerUnavailable(format!(
            "native balance {native_balance} below gas floor {gas_floor}"
        )));
    }
    Ok(())
}

// --- gate 2: shape --------------------------------------------------------

pub fn gate_shape(request: &RelayRequest) -> Result<()> {
    for memo in request.memos() {
        if memo.len() > MAX_MEMO_BYTES {
            return Err(RelayError::MemoTooLarge(memo.len()));
        }
    }

    if request.is_batch() {
        let n = request.proof_count();
        if n == 0 || n > MAX_BATCH_SIZE {
            return Err(RelayError::BatchSizeOutOfRange(n));
        }
        let roots_len = request.roots().len();
        let nullifiers_len = request.nullifiers().len();
        if roots_len != n || nullifiers_len != n {
            return Err(RelayError::ArrayLengthMismatch(format!(
                "proofs={n} roots={roots_len} nullifiers={nullifiers_len}"
            )));
        }
        if let RelayRequest::BatchUnshield(r) = request {
            if r.amounts.len() != n || r.change_commitments.len() != n {
                return Err(RelayError::ArrayLengthMismatch(format!(
                    "proofs={n} amounts={} changeCommitments={}",
                    r.amounts.len(),
                    r.change_commitments.len()
                )));
            }
        }
    }

    if let RelayRequest::TransferMulti(r) = request {
        if !(2..=5).contains(&r.num_inputs) {
            return Err(RelayError::ArrayLengthMismatch(format!(
                "numInputs {} outside 2..=5",
                r.num_inputs
            )));
        }
        if r.roots.len() != 5 || r.nullifiers.len() != 5 {
            return Err(RelayError::ArrayLengthMismatch(format!(
                "transferMulti roots/nullifiers must be fixed-size 5, got {}/{}",
                r.roots.len(),
                r.nullifiers.len()
            )));
        }
    }

    for amount in request.amounts() {
        if amount == 0 {
            return Err(RelayError::InvalidAmount);
        }
    }

    Ok(())
}

// --- gate 3: public-inputs consistency ------------------------------------

/// the expected positional layout the circuit bound to, per operation
/// (SPEC_FULL.md §4.5 / DESIGN.md "public-inputs ordering"). Batch
/// operations are checked per proof against that proof's own root and
/// nullifier only — the batch-shared fields (recipient, token, relayer,
/// total fee) aren't bound into any single proof's public inputs.
pub fn gate_public_inputs(request: &RelayRequest) -> Result<()> {
    let expected_per_proof: Vec<Vec<Fr>> = match request {
        RelayRequest::Unshield(r) => vec![vec![
            r.root,
            r.nullifier_hash,
            fr_from_address(r.recipient),
            fr_from_amount(r.amount),
            r.change_commitment,
            fr_from_address(r.relayer),
        ]],
        RelayRequest::Transfer(r) => vec![vec![
            r.root,
            r.nullifier_hash,
            r.output_commitment_1,
            r.output_commitment_2,
            fr_from_address(r.relayer),
        ]],
        RelayRequest::TransferMulti(r) => {
            let n = r.num_inputs as usize;
            let mut v = r.roots[..n].to_vec();
            v.extend_from_slice(&r.nullifiers[..n]);
            v.push(r.output_commitment_1);
            v.push(r.output_commitment_2);
            v.push(fr_from_address(r.relayer));
            vec![v]
        }
        RelayRequest::Swap(r) => vec![vec![
            r.root,
            r.input_nullifier,
            r.output_commitment_1,
            r.output_commitment_2,
            fr_from_address(r.token_in),
            fr_from_address(r.token_out),
        ]],
        RelayRequest::BatchTransfer(r) => r
            .roots
            .iter()
            .zip(r.nullifiers.iter())
            .map(|(root, nf)| vec![*root, *nf])
            .collect(),
        RelayRequest::BatchUnshield(r) => r
            .roots
            .iter()
            .zip(r.nullifiers.iter())
            .zip(r.amounts.iter())
            .zip(r.change_commitments.iter())
            .map(|(((root, nf), amount), change)| vec![*root, *nf, fr_from_amount(*amount), *change])
            .collect(),
    };

    for (maybe_inputs, expected) in request.public_inputs().iter().zip(expected_per_proof.iter()) {
        if let Some(inputs) = maybe_inputs {
            check_positions(inputs, expected)?;
        }
    }
    Ok(())
}

// --- gate 4: root known ----------------------------------------------------

pub async fn gate_root_known<C: ChainClient>(chain: &C, pool: Address, roots: &[Fr]) -> Result<()> {
    for root in roots {
        let selector = chain_client::abi::encode_call("isKnownRoot(bytes32)", &[AbiValue::Bytes32(root.to_bytes_be())]);
        let result = chain.call(pool, &selector).await?;
        let known = result.last().copied().unwrap_or(0) != 0;
        if !known {
            return Err(RelayError::UnknownRoot(*root));
        }
    }
    Ok(())
}

// --- gate 5: nullifier unspent ----------------------------------------------

pub fn gate_nullifier_unspent(pool: &Pool, nullifiers: &[Fr]) -> Result<()> {
    for nf in nullifiers {
        if pool.is_nullifier_spent(*nf) {
            return Err(RelayError::NullifierAlreadySpent(*nf));
        }
    }
    Ok(())
}

// --- gate 6: fee sanity ------------------------------------------------------

pub fn gate_fee_sanity(request: &RelayRequest, policy: &FeePolicy) -> Result<()> {
    // swap carries no relay fee (SPEC_FULL.md §4.5 dispatch table).
    if matches!(request, RelayRequest::Swap(_)) {
        return Ok(());
    }

    let fee = request.fee().ok_or(RelayError::MissingFee)?;
    let floor = policy.min_fee_floor;

    let amounts = request.amounts();
    let ceiling = if amounts.is_empty() {
        u128::MAX
    } else {
        let basis: u128 = amounts.iter().sum();
        (basis.saturating_mul(policy.ceiling_bps as u128) / 10_000).max(floor)
    };

    if fee < floor || fee > ceiling {
        return Err(RelayError::FeeOutOfRange { fee, floor, ceiling });
    }
    Ok(())
}

// --- gate 7: token support --------------------------------------------------

pub async fn gate_token_support<C: ChainClient>(chain: &C, pool: Address, tokens: &[Address]) -> Result<()> {
    for token in tokens {
        let selector = chain_client::abi::encode_call("supportedTokens(address)", &[AbiValue::Address(*token)]);
        match chain.call(pool, &selector).await {
            Ok(result) => {
                let supported = result.last().copied().unwrap_or(0) != 0;
                if !supported {
                    return Err(RelayError::UnsupportedToken(*token));
                }
            }
            // the chain refused the state-override view call; let the
            // contract revert at submission time and translate that error
            // instead (SPEC_FULL.md §4.5 "Skip the view call...").
            Err(chain_client::ChainClientError::Rpc { .. }) => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::UnshieldRequest;
    use crate::proof::Proof;

    fn base_unshield() -> UnshieldRequest {
        UnshieldRequest {
            pool: Address([1u8; 20]),
            proof: Proof([Fr::zero(); 8]),
            public_inputs: None,
            root: Fr::from_u64(1),
            nullifier_hash: Fr::from_u64(2),
            recipient: Address([2u8; 20]),
            token: Address::NATIVE,
            amount: 1000,
            change_commitment: Fr::zero(),
            relayer: Address([3u8; 20]),
            fee: Some(5),
        }
    }

    #[test]
    fn shape_rejects_zero_amount() {
        let mut r = base_unshield();
        r.amount = 0;
        assert!(matches!(gate_shape(&RelayRequest::Unshield(r)), Err(RelayError::InvalidAmount)));
    }

    #[test]
    fn shape_rejects_oversize_memo() {
        let req = RelayRequest::Transfer(crate::request::TransferRequest {
            pool: Address([1u8; 20]),
            proof: Proof([Fr::zero(); 8]),
            public_inputs: None,
            root: Fr::zero(),
            nullifier_hash: Fr::zero(),
            output_commitment_1: Fr::zero(),
            output_commitment_2: Fr::zero(),
            relayer: Address([3u8; 20]),
            fee: Some(1),
            memo_1: vec![0u8; 1025],
            memo_2: vec![],
        });
        assert!(matches!(gate_shape(&req), Err(RelayError::MemoTooLarge(1025))));
    }

    #[test]
    fn fee_sanity_requires_explicit_fee() {
        let mut r = base_unshield();
        r.fee = None;
        let policy = FeePolicy::default();
        assert!(matches!(
            gate_fee_sanity(&RelayRequest::Unshield(r), &policy),
            Err(RelayError::MissingFee)
        ));
    }

    #[test]
    fn fee_sanity_enforces_ceiling() {
        let mut r = base_unshield();
        r.amount = 1000;
        r.fee = Some(1000); // 100%, way above 0.5%
        let policy = FeePolicy::default();
        assert!(matches!(
            gate_fee_sanity(&RelayRequest::Unshield(r), &policy),
            Err(RelayError::FeeOutOfRange { .. })
        ));
    }

    #[test]
    fn public_inputs_pass_when_consistent() {
        let mut r = base_unshield();
        r.public_inputs = Some(vec![
            r.root,
            r.nullifier_hash,
            fr_from_address(r.recipient),
            fr_from_amount(r.amount),
            r.change_commitment,
            fr_from_address(r.relayer),
        ]);
        assert!(gate_public_inputs(&RelayRequest::Unshield(r)).is_ok());
    }

    #[test]
    fn public_inputs_reject_mismatch() {
        let mut r = base_unshield();
        r.public_inputs = Some(vec![
            Fr::from_u64(999), // wrong root
            r.nullifier_hash,
            fr_from_address(r.recipient),
            fr_from_amount(r.amount),
            r.change_commitment,
            fr_from_address(r.relayer),
        ]);
        assert!(matches!(
            gate_public_inputs(&RelayRequest::Unshield(r)),
            Err(RelayError::PublicInputsMismatch { index: 0 })
        ));
    }

    #[test]
    fn nullifier_gate_rejects_spent() {
        let mut pool = Pool::new(Address([1u8; 20]), Default::default());
        pool_state::apply_event(
            &mut pool,
            pool_state::PoolEvent::Unshield(pool_state::UnshieldEvent {
                nullifier_hash: Fr::from_u64(7),
                recipient: Address([2u8; 20]),
                token: Address::NATIVE,
                amount: 1,
                relayer: Address([3u8; 20]),
                fee: 0,
                timestamp: 1,
                block_number: 1,
                log_index: 0,
                tx_hash: chain_client::TxHash([0u8; 32]),
            }),
        )
        .unwrap();
        assert!(matches!(
            gate_nullifier_unspent(&pool, &[Fr::from_u64(7)]),
            Err(RelayError::NullifierAlreadySpent(_))
        ));
    }
}
