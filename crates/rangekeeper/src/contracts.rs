//! Addresses and method-name constants for the contracts the agent talks
//! to. Dispatch is by method name against an opaque address — ABI
//! binding/decoding is deliberately out of this crate's scope; a real
//! binary wires these through an ABI resolver when constructing
//! [`crate::chain::RpcChain`].

use alloy_primitives::Address;
use serde::Deserialize;

/// Pool-specific and protocol addresses, all configuration-injected at
/// startup.
#[derive(Debug, Clone, Deserialize)]
pub struct ContractAddresses {
    pub pool: Address,
    pub token0: Address,
    pub token1: Address,
    pub position_manager: Address,
    pub router: Address,
    pub gauge: Address,
    pub farming_center: Address,
    /// The farming program's primary and bonus reward tokens. Two of the
    /// four `IncentiveKey` fields the farming center hashes into an
    /// incentive id; `pool` supplies the third, and the fourth (`nonce`)
    /// is always read from on-chain `deposits(tokenId)` rather than
    /// configured (see `Supervisor::read_incentive`).
    pub reward_token: Address,
    pub bonus_reward_token: Address,
}

pub mod methods {
    // NonfungiblePositionManager
    pub const POSITIONS: &str = "positions";
    pub const MINT: &str = "mint";
    pub const DECREASE_LIQUIDITY: &str = "decreaseLiquidity";
    pub const COLLECT: &str = "collect";
    pub const BURN: &str = "burn";
    pub const MULTICALL: &str = "multicall";

    // Router
    pub const SWAP_EXACT_TOKENS_FOR_TOKENS: &str = "swapExactTokensForTokens";

    // Algebra-style pool
    pub const SAFELY_GET_STATE_OF_AMM: &str = "safelyGetStateOfAMM";

    // Gauge
    pub const DEPOSIT: &str = "deposit";

    // Farming center
    pub const DEPOSITS: &str = "deposits";
    pub const EXIT_FARMING: &str = "exitFarming";
    pub const CLAIM_REWARD: &str = "claimReward";

    // ERC-20
    pub const APPROVE: &str = "approve";
    pub const ALLOWANCE: &str = "allowance";
    pub const BALANCE_OF: &str = "balanceOf";

    // ERC-721
    pub const OWNER_OF: &str = "ownerOf";
    pub const GET_APPROVED: &str = "getApproved";
}

/// The zero-address `Transfer` topic used to locate a freshly minted
/// NFT's token id inside a `Mint` receipt's logs.
pub const TRANSFER_EVENT_SIGNATURE: &str =
    "Transfer(address,address,uint256)";
