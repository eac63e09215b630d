//! decodes the four pool events plus `LeafInserted` out of raw chain logs
//! (spec.md §6 "bit-exactly"). Each event has a fixed, known shape, so
//! this is hand-rolled word-at-a-time slicing rather than a general ABI
//! decoder — the inverse of `chain_client::abi`'s encoder, covering only
//! the layouts the contract actually emits.

use chain_client::{topics, Address, LogEntry};
use field_hash::Fr;
use pool_state::{PoolEvent, ShieldEvent, SwapEvent, TransferEvent, UnshieldEvent};

use crate::error::{IndexerError, Result};

fn malformed(event: &'static str, reason: impl Into<String>) -> IndexerError {
    IndexerError::MalformedLog {
        event,
        reason: reason.into(),
    }
}

fn word_at(data: &[u8], event: &'static str, index: usize) -> Result<[u8; 32]> {
    let start = index * 32;
    data.get(start..start + 32)
        .map(|s| s.try_into().expect("slice of len 32"))
        .ok_or_else(|| malformed(event, format!("data too short for word {index}")))
}

fn u64_from_word(word: [u8; 32]) -> u64 {
    u64::from_be_bytes(word[24..32].try_into().expect("8 bytes"))
}

fn u128_from_word(word: [u8; 32]) -> u128 {
    u128::from_be_bytes(word[16..32].try_into().expect("16 bytes"))
}

fn address_from_word(word: [u8; 32]) -> Address {
    let mut out = [0u8; 20];
    out.copy_from_slice(&word[12..32]);
    Address(out)
}

fn fr_from_topic(event: &'static str, topics: &[[u8; 32]], index: usize) -> Result<Fr> {
    let raw = topics
        .get(index)
        .ok_or_else(|| malformed(event, format!("missing topic {index}")))?;
    Fr::from_bytes_be(raw).map_err(|_| malformed(event, format!("topic {index} is not a valid field element")))
}

fn address_from_topic(event: &'static str, topics: &[[u8; 32]], index: usize) -> Result<Address> {
    let raw = topics
        .get(index)
        .ok_or_else(|| malformed(event, format!("missing topic {index}")))?;
    Ok(address_from_word(*raw))
}

/// reads a dynamic `bytes` value whose head word at `head_index` holds the
/// byte offset (relative to the start of `data`) of its length-prefixed tail.
fn dynamic_bytes(data: &[u8], event: &'static str, head_index: usize) -> Result<Vec<u8>> {
    let offset = u64_from_word(word_at(data, event, head_index)?) as usize;
    let len_word: [u8; 32] = data
        .get(offset..offset + 32)
        .ok_or_else(|| malformed(event, "dynamic bytes offset out of range"))?
        .try_into()
        .expect("slice of len 32");
    let len = u64_from_word(len_word) as usize;
    data.get(offset + 32..offset + 32 + len)
        .map(|s| s.to_vec())
        .ok_or_else(|| malformed(event, "dynamic bytes length out of range"))
}

/// decode one raw chain log into a [`PoolEvent`], dispatching on topic0.
/// Returns `Ok(None)` for a `LeafInserted` log (consumed only by the relay
/// executor's receipt scan, not by indexing) and `Err(UnknownTopic)` for
/// anything else — a filter should never deliver those, but defense in
/// depth costs nothing here.
pub fn decode_log(log: &LogEntry) -> Result<Option<PoolEvent>> {
    let topic0 = *log
        .topics
        .first()
        .ok_or_else(|| malformed("unknown", "log has no topics"))?;

    if topic0 == topics::shield() {
        decode_shield(log).map(Some)
    } else if topic0 == topics::transfer() {
        decode_transfer(log).map(Some)
    } else if topic0 == topics::unshield() {
        decode_unshield(log).map(Some)
    } else if topic0 == topics::swap() {
        decode_swap(log).map(Some)
    } else if topic0 == topics::leaf_inserted() {
        Ok(None)
    } else {
        Err(IndexerError::UnknownTopic(hex::encode(topic0)))
    }
}

fn decode_shield(log: &LogEntry) -> Result<PoolEvent> {
    const E: &str = "Shield";
    let commitment = fr_from_topic(E, &log.topics, 1)?;
    let leaf_index = u64_from_word(*log.topics.get(2).ok_or_else(|| malformed(E, "missing leafIndex topic"))?);
    let token = address_from_topic(E, &log.topics, 3)?;
    let amount = u128_from_word(word_at(&log.data, E, 0)?);
    let timestamp = u64_from_word(word_at(&log.data, E, 1)?);

    Ok(PoolEvent::Shield(ShieldEvent {
        commitment,
        leaf_index,
        token,
        amount,
        timestamp,
        block_number: log.block_number,
        log_index: log.log_index,
        tx_hash: log.transaction_hash,
    }))
}

fn decode_transfer(log: &LogEntry) -> Result<PoolEvent> {
    const E: &str = "Transfer";
    let nullifier_hash = fr_from_topic(E, &log.topics, 1)?;
    let leaf_index_1 = u64_from_word(*log.topics.get(2).ok_or_else(|| malformed(E, "missing leafIndex1 topic"))?);
    let leaf_index_2 = u64_from_word(*log.topics.get(3).ok_or_else(|| malformed(E, "missing leafIndex2 topic"))?);

    let output_commitment_1 = Fr::from_bytes_be(&word_at(&log.data, E, 0)?)
        .map_err(|_| malformed(E, "outputCommitment1 is not a valid field element"))?;
    let output_commitment_2 = Fr::from_bytes_be(&word_at(&log.data, E, 1)?)
        .map_err(|_| malformed(E, "outputCommitment2 is not a valid field element"))?;
    let encrypted_memo_1 = dynamic_bytes(&log.data, E, 2)?;
    let encrypted_memo_2 = dynamic_bytes(&log.data, E, 3)?;
    let timestamp = u64_from_word(word_at(&log.data, E, 4)?);

    Ok(PoolEvent::Transfer(TransferEvent {
        nullifier_hash,
        output_commitment_1,
        output_commitment_2,
        leaf_index_1,
        leaf_index_2,
        encrypted_memo_1,
        encrypted_memo_2,
        timestamp,
        block_number: log.block_number,
        log_index: log.log_index,
        tx_hash: log.transaction_hash,
    }))
}

fn decode_unshield(log: &LogEntry) -> Result<PoolEvent> {
    const E: &str = "Unshield";
    let nullifier_hash = fr_from_topic(E, &log.topics, 1)?;
    let recipient = address_from_topic(E, &log.topics, 2)?;
    let token = address_from_topic(E, &log.topics, 3)?;

    let amount = u128_from_word(word_at(&log.data, E, 0)?);
    let relayer = address_from_word(word_at(&log.data, E, 1)?);
    let fee = u128_from_word(word_at(&log.data, E, 2)?);
    let timestamp = u64_from_word(word_at(&log.data, E, 3)?);

    Ok(PoolEvent::Unshield(UnshieldEvent {
        nullifier_hash,
        recipient,
        token,
        amount,
        relayer,
        fee,
        timestamp,
        block_number: log.block_number,
        log_index: log.log_index,
        tx_hash: log.transaction_hash,
    }))
}

fn decode_swap(log: &LogEntry) -> Result<PoolEvent> {
    const E: &str = "Swap";
    let input_nullifier = fr_from_topic(E, &log.topics, 1)?;
    let token_in = address_from_topic(E, &log.topics, 2)?;
    let token_out = address_from_topic(E, &log.topics, 3)?;

    let output_commitment = Fr::from_bytes_be(&word_at(&log.data, E, 0)?)
        .map_err(|_| malformed(E, "outputCommitment is not a valid field element"))?;
    let amount_in = u128_from_word(word_at(&log.data, E, 1)?);
    let amount_out = u128_from_word(word_at(&log.data, E, 2)?);
    let encrypted_memo = dynamic_bytes(&log.data, E, 3)?;
    let timestamp = u64_from_word(word_at(&log.data, E, 4)?);

    Ok(PoolEvent::Swap(SwapEvent {
        input_nullifier,
        output_commitment,
        token_in,
        token_out,
        amount_in,
        amount_out,
        encrypted_memo,
        timestamp,
        block_number: log.block_number,
        log_index: log.log_index,
        tx_hash: log.transaction_hash,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_client::TxHash;

    fn word_u64(v: u64) -> [u8; 32] {
        let mut w = [0u8; 32];
        w[24..].copy_from_slice(&v.to_be_bytes());
        w
    }

    fn word_u128(v: u128) -> [u8; 32] {
        let mut w = [0u8; 32];
        w[16..].copy_from_slice(&v.to_be_bytes());
        w
    }

    fn word_addr(a: Address) -> [u8; 32] {
        let mut w = [0u8; 32];
        w[12..].copy_from_slice(&a.0);
        w
    }

    #[test]
    fn decodes_shield_event() {
        let commitment = Fr::from_u64(42);
        let token = Address([7u8; 20]);
        let log = LogEntry {
            address: Address::NATIVE,
            topics: vec![topics::shield(), commitment.to_bytes_be(), word_u64(3), word_addr(token)],
            data: [word_u128(1000), word_u64(99)].concat(),
            block_number: 10,
            log_index: 0,
            transaction_hash: TxHash([1u8; 32]),
            removed: false,
        };

        let event = decode_log(&log).unwrap().unwrap();
        match event {
            PoolEvent::Shield(e) => {
                assert_eq!(e.commitment, commitment);
                assert_eq!(e.leaf_index, 3);
                assert_eq!(e.token, token);
                assert_eq!(e.amount, 1000);
                assert_eq!(e.timestamp, 99);
            }
            _ => panic!("expected Shield"),
        }
    }

    #[test]
    fn decodes_transfer_event_with_memos() {
        let nullifier = Fr::from_u64(1);
        let out1 = Fr::from_u64(2);
        let out2 = Fr::from_u64(3);
        let memo1 = vec![0xaa, 0xbb];
        let memo2 = vec![0xcc];

        // head: out1(32) out2(32) offset1(32) offset2(32) timestamp(32) = 160 bytes.
        let head_len = 160;
        let mut data = Vec::new();
        data.extend_from_slice(&out1.to_bytes_be());
        data.extend_from_slice(&out2.to_bytes_be());
        let offset1 = head_len;
        data.extend_from_slice(&word_u64(offset1 as u64));
        let mut tail1 = word_u64(memo1.len() as u64).to_vec();
        tail1.extend_from_slice(&memo1);
        while tail1.len() % 32 != 0 {
            tail1.push(0);
        }
        let offset2 = offset1 + tail1.len();
        data.extend_from_slice(&word_u64(offset2 as u64));
        data.extend_from_slice(&word_u64(500));
        data.extend_from_slice(&tail1);
        let mut tail2 = word_u64(memo2.len() as u64).to_vec();
        tail2.extend_from_slice(&memo2);
        while tail2.len() % 32 != 0 {
            tail2.push(0);
        }
        data.extend_from_slice(&tail2);

        let log = LogEntry {
            address: Address::NATIVE,
            topics: vec![topics::transfer(), nullifier.to_bytes_be(), word_u64(0), word_u64(1)],
            data,
            block_number: 1,
            log_index: 0,
            transaction_hash: TxHash([2u8; 32]),
            removed: false,
        };

        let event = decode_log(&log).unwrap().unwrap();
        match event {
            PoolEvent::Transfer(e) => {
                assert_eq!(e.nullifier_hash, nullifier);
                assert_eq!(e.output_commitment_1, out1);
                assert_eq!(e.output_commitment_2, out2);
                assert_eq!(e.leaf_index_1, 0);
                assert_eq!(e.leaf_index_2, 1);
                assert_eq!(e.encrypted_memo_1, memo1);
                assert_eq!(e.encrypted_memo_2, memo2);
                assert_eq!(e.timestamp, 500);
            }
            _ => panic!("expected Transfer"),
        }
    }

    #[test]
    fn leaf_inserted_decodes_to_none() {
        let log = LogEntry {
            address: Address::NATIVE,
            topics: vec![topics::leaf_inserted(), [0u8; 32], word_u64(0)],
            data: vec![0u8; 32],
            block_number: 1,
            log_index: 0,
            transaction_hash: TxHash([3u8; 32]),
            removed: false,
        };
        assert!(decode_log(&log).unwrap().is_none());
    }

    #[test]
    fn unknown_topic_is_rejected() {
        let log = LogEntry {
            address: Address::NATIVE,
            topics: vec![[0xffu8; 32]],
            data: vec![],
            block_number: 1,
            log_index: 0,
            transaction_hash: TxHash([4u8; 32]),
            removed: false,
        };
        assert!(matches!(decode_log(&log), Err(IndexerError::UnknownTopic(_))));
    }
}
