//! the closed set of custom Solidity errors the pool contract can revert
//! with, keyed by their 4-byte selector (SPEC_FULL.md §4.5 "Error
//! decoding"). Anything outside this set surfaces with `name: None` and
//! the raw selector.

use crate::error::ContractRevert;

struct Entry {
    signature: &'static str,
    explanation: &'static str,
}

const TABLE: &[Entry] = &[
    Entry { signature: "InvalidProof()", explanation: "the Groth16 proof did not verify against the given public inputs" },
    Entry { signature: "NullifierAlreadySpent(bytes32)", explanation: "one of the nullifiers has already been spent on-chain" },
    Entry { signature: "InvalidAmount()", explanation: "a zero or out-of-range amount was supplied" },
    Entry { signature: "InvalidRecipient()", explanation: "the recipient address is the zero address or otherwise rejected" },
    Entry { signature: "TransferFailed()", explanation: "the underlying token transfer reverted or returned false" },
    Entry { signature: "CommitmentAlreadyExists(bytes32)", explanation: "an output commitment collides with one already in the tree" },
    Entry { signature: "InsufficientPoolBalance()", explanation: "the pool does not hold enough of the requested token to pay out" },
    Entry { signature: "UnsupportedToken(address)", explanation: "the token is not registered as supported by this pool" },
    Entry { signature: "Unauthorized()", explanation: "the caller is not permitted to invoke this function" },
    Entry { signature: "InvalidSwapRate()", explanation: "the realized swap output fell outside the allowed rate band" },
];

fn selector_of(signature: &str) -> [u8; 4] {
    chain_client::abi::selector(signature)
}

/// looks up a revert's 4-byte selector against the known custom-error
/// table, falling back to an unrecognized-selector entry.
pub fn decode_revert(selector: [u8; 4], revert_data: &[u8]) -> ContractRevert {
    for entry in TABLE {
        if selector_of(entry.signature) == selector {
            let name = entry.signature.split('(').next().unwrap_or(entry.signature);
            return ContractRevert {
                selector,
                name: Some(leak_name(name)),
                explanation: entry.explanation.to_string(),
            };
        }
    }
    ContractRevert {
        selector,
        name: None,
        explanation: format!("{} bytes of unrecognized revert data", revert_data.len()),
    }
}

/// every entry is one of the 10 fixed signatures above, so this never
/// grows unbounded; it buys us a `&'static str` in `ContractRevert`
/// without threading a lifetime through every caller.
fn leak_name(name: &str) -> &'static str {
    match name {
        "InvalidProof" => "InvalidProof",
        "NullifierAlreadySpent" => "NullifierAlreadySpent",
        "InvalidAmount" => "InvalidAmount",
        "InvalidRecipient" => "InvalidRecipient",
        "TransferFailed" => "TransferFailed",
        "CommitmentAlreadyExists" => "CommitmentAlreadyExists",
        "InsufficientPoolBalance" => "InsufficientPoolBalance",
        "UnsupportedToken" => "UnsupportedToken",
        "Unauthorized" => "Unauthorized",
        "InvalidSwapRate" => "InvalidSwapRate",
        _ => "Unknown",
    }
}

/// extracts the 4-byte selector from raw `eth_call`/receipt revert data,
/// if it's at least that long.
pub fn selector_from_revert_data(data: &[u8]) -> Option<[u8; 4]> {
    if data.len() < 4 {
        return None;
    }
    let mut sel = [0u8; 4];
    sel.copy_from_slice(&data[..4]);
    Some(sel)
}
