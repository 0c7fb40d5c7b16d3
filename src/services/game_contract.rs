//! Moon or Doom contract call encoding

use crate::types::Side;
use alloy::primitives::{Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

sol! {
    function enterMoon(uint256 epoch) external payable;
    function enterDoom(uint256 epoch) external payable;
    function claim(uint256[] epochs) external payable;
}

/// Calldata entering `round_id` on `side`
pub fn enter_calldata(side: Side, round_id: u64) -> Bytes {
    let epoch = U256::from(round_id);
    let encoded = match side {
        Side::Moon => enterMoonCall { epoch }.abi_encode(),
        Side::Doom => enterDoomCall { epoch }.abi_encode(),
    };
    Bytes::from(encoded)
}

/// Calldata claiming the payout of a single round
pub fn claim_calldata(round_id: u64) -> Bytes {
    let call = claimCall {
        epochs: vec![U256::from(round_id)],
    };
    Bytes::from(call.abi_encode())
}
