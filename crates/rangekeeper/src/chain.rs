//! The `Chain` collaborator: low-level RPC, signing, nonce management,
//! and receipt polling live behind this trait. The core only ever calls
//! `call`/`send`/`wait`/`parse_logs` against an opaque contract address
//! and a method name — it never inspects an ABI.
//!
//! [`RpcChain`] is the one concrete implementation, built on
//! `alloy-provider`/`alloy-signer-local` over a plain JSON-RPC endpoint.

use crate::contracts::methods;
use crate::error::{CoreError, CoreResult};
use alloy_consensus::{SignableTransaction, Signed, TxEip1559, TxEnvelope};
use alloy_eips::eip2718::Encodable2718;
use alloy_network::TxSigner;
use alloy_primitives::{keccak256, Address, Bytes, TxKind, B256, U256};
use alloy_provider::Provider;
use alloy_rpc_types_eth::TransactionRequest;
use async_trait::async_trait;
use std::time::Duration;

/// A dynamically-typed argument or return value, standing in for
/// ABI-decoded values without the core depending on an ABI-binding crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Address(Address),
    Uint(U256),
    Int(i128),
    Bool(bool),
    Bytes(Bytes),
    FixedBytes(B256),
    Tuple(Vec<Value>),
    Array(Vec<Value>),
}

impl Value {
    pub fn as_address(&self) -> CoreResult<Address> {
        match self {
            Value::Address(a) => Ok(*a),
            _ => Err(CoreError::Validation("expected address value".into())),
        }
    }

    pub fn as_uint(&self) -> CoreResult<U256> {
        match self {
            Value::Uint(u) => Ok(*u),
            _ => Err(CoreError::Validation("expected uint value".into())),
        }
    }

    pub fn as_int(&self) -> CoreResult<i128> {
        match self {
            Value::Int(i) => Ok(*i),
            _ => Err(CoreError::Validation("expected int value".into())),
        }
    }

    pub fn as_tuple(&self) -> CoreResult<&[Value]> {
        match self {
            Value::Tuple(v) => Ok(v),
            _ => Err(CoreError::Validation("expected tuple value".into())),
        }
    }
}

/// Options accompanying a `send`.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub gas_limit: Option<u64>,
    /// Relative priority in `[0, 1]`; a higher value asks for a richer
    /// priority fee. The core never needs more granularity than this.
    pub priority: f64,
}

#[derive(Debug, Clone)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone)]
pub struct Receipt {
    pub tx_hash: B256,
    pub status: TxStatus,
    pub gas_used: u64,
    pub effective_gas_price: U256,
    pub logs: Vec<Log>,
}

impl Receipt {
    pub fn gas_cost(&self) -> U256 {
        U256::from(self.gas_used) * self.effective_gas_price
    }
}

/// A decoded log entry, the result of `parse_logs`.
#[derive(Debug, Clone)]
pub struct DecodedLog {
    pub address: Address,
    pub values: Vec<Value>,
}

/// The interface the core consumes for every on-chain interaction. Every
/// method is a potential suspension point; `wait` carries an implicit
/// per-transaction timeout (default 5 minutes) that the implementation
/// maps to [`CoreError::Transient`].
#[async_trait]
pub trait Chain: Send + Sync {
    async fn call(&self, contract: Address, method: &str, args: &[Value]) -> CoreResult<Vec<Value>>;

    async fn send(
        &self,
        contract: Address,
        method: &str,
        args: &[Value],
        opts: SendOptions,
    ) -> CoreResult<B256>;

    async fn wait(&self, tx_hash: B256) -> CoreResult<Receipt>;

    fn parse_logs(&self, receipt: &Receipt, event_signature: &str) -> CoreResult<Vec<DecodedLog>>;
}

/// Default per-transaction confirmation timeout.
pub const DEFAULT_TX_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Production `Chain` implementation over a plain JSON-RPC / WebSocket
/// endpoint. Holds a single wallet — one agent process trades from one
/// wallet.
pub struct RpcChain<P> {
    provider: P,
    signer: alloy_signer_local::PrivateKeySigner,
    chain_id: u64,
    tx_timeout: Duration,
}

impl<P> RpcChain<P>
where
    P: alloy_provider::Provider + Send + Sync,
{
    pub fn new(provider: P, signer: alloy_signer_local::PrivateKeySigner, chain_id: u64) -> Self {
        Self {
            provider,
            signer,
            chain_id,
            tx_timeout: DEFAULT_TX_TIMEOUT,
        }
    }

    pub fn wallet_address(&self) -> Address {
        self.signer.address()
    }

    pub fn with_tx_timeout(mut self, timeout: Duration) -> Self {
        self.tx_timeout = timeout;
        self
    }
}

/// Default gas limit used when a send doesn't carry its own estimate and
/// `eth_estimateGas` can't be reached; generous enough for the multicall
/// sequences this crate submits.
const DEFAULT_GAS_LIMIT: u64 = 600_000;

/// Solidity ABI encode/decode for the fixed set of methods this crate
/// ever calls. Every shape here is either a flat list of static words or
/// the single dynamic `bytes[]` multicall argument — never a general
/// nested ABI type — because method-name dispatch against opaque
/// contracts is the seam the core is written against; this module is
/// where that seam meets real calldata.
mod abi {
    use super::*;

    pub fn selector(signature: &str) -> [u8; 4] {
        let hash = keccak256(signature.as_bytes());
        [hash[0], hash[1], hash[2], hash[3]]
    }

    /// Signature string used only to derive the selector; argument
    /// encoding is driven by the `Value` list itself, not by this string.
    pub fn method_signature(method: &str) -> CoreResult<&'static str> {
        match method {
            methods::APPROVE => Ok("approve(address,uint256)"),
            methods::ALLOWANCE => Ok("allowance(address,address)"),
            methods::BALANCE_OF => Ok("balanceOf(address)"),
            methods::OWNER_OF => Ok("ownerOf(uint256)"),
            methods::GET_APPROVED => Ok("getApproved(uint256)"),
            methods::DEPOSIT => Ok("deposit(uint256)"),
            methods::DEPOSITS => Ok("deposits(uint256)"),
            methods::POSITIONS => Ok("positions(uint256)"),
            methods::SAFELY_GET_STATE_OF_AMM => Ok("safelyGetStateOfAMM()"),
            methods::MINT => {
                Ok("mint(address,address,int24,int24,uint256,uint256,uint256,uint256,address,uint256)")
            }
            methods::SWAP_EXACT_TOKENS_FOR_TOKENS => {
                Ok("swapExactTokensForTokens(address,address,uint256,uint256,uint256)")
            }
            methods::EXIT_FARMING => Ok("exitFarming((address,address,address,uint256),uint256)"),
            methods::CLAIM_REWARD => Ok("claimReward(address)"),
            methods::DECREASE_LIQUIDITY => {
                Ok("decreaseLiquidity(uint256,uint256,uint256,uint256,uint256)")
            }
            methods::COLLECT => Ok("collect(uint256,address,uint256,uint256)"),
            methods::BURN => Ok("burn(uint256)"),
            methods::MULTICALL => Ok("multicall(bytes[])"),
            other => Err(CoreError::Validation(format!("unknown method {other}"))),
        }
    }

    fn encode_word(value: &Value) -> CoreResult<[u8; 32]> {
        match value {
            Value::Address(a) => {
                let mut word = [0u8; 32];
                word[12..].copy_from_slice(a.as_slice());
                Ok(word)
            }
            Value::Uint(u) => Ok(u.to_be_bytes::<32>()),
            Value::Bool(b) => {
                let mut word = [0u8; 32];
                word[31] = *b as u8;
                Ok(word)
            }
            Value::Int(i) => {
                let mut word = if *i < 0 { [0xffu8; 32] } else { [0u8; 32] };
                word[16..].copy_from_slice(&i.to_be_bytes());
                Ok(word)
            }
            Value::FixedBytes(b) => Ok(b.0),
            Value::Tuple(_) | Value::Bytes(_) | Value::Array(_) => {
                Err(CoreError::Validation("value has no single-word encoding".into()))
            }
        }
    }

    /// Flattens a flat argument list into calldata words, inlining any
    /// nested tuple. Every tuple this crate ever builds (the
    /// `IncentiveKey` passed to `exitFarming`) is entirely static, so ABI
    /// encoding it is just concatenating its members in order.
    pub fn encode_args(args: &[Value]) -> CoreResult<Vec<u8>> {
        let mut out = Vec::with_capacity(args.len() * 32);
        for arg in args {
            encode_into(arg, &mut out)?;
        }
        Ok(out)
    }

    fn encode_into(value: &Value, out: &mut Vec<u8>) -> CoreResult<()> {
        if let Value::Tuple(members) = value {
            for member in members {
                encode_into(member, out)?;
            }
            Ok(())
        } else {
            out.extend_from_slice(&encode_word(value)?);
            Ok(())
        }
    }

    /// `multicall(bytes[])` is the one dynamic shape this crate submits.
    /// `calls` are already-encoded (selector + args) inner calldatas.
    pub fn encode_multicall(calls: &[Vec<u8>]) -> Vec<u8> {
        let mut out = selector("multicall(bytes[])").to_vec();
        out.extend_from_slice(&U256::from(32u64).to_be_bytes::<32>());
        out.extend_from_slice(&U256::from(calls.len() as u64).to_be_bytes::<32>());

        let head_len = calls.len() * 32;
        let mut offsets = Vec::with_capacity(calls.len());
        let mut tail = Vec::new();
        for call in calls {
            offsets.push(head_len + tail.len());
            tail.extend_from_slice(&U256::from(call.len() as u64).to_be_bytes::<32>());
            tail.extend_from_slice(call);
            let padding = (32 - (call.len() % 32)) % 32;
            tail.extend(std::iter::repeat(0u8).take(padding));
        }
        for offset in offsets {
            out.extend_from_slice(&U256::from(offset as u64).to_be_bytes::<32>());
        }
        out.extend_from_slice(&tail);
        out
    }

    pub fn decode_words(data: &[u8]) -> Vec<[u8; 32]> {
        data.chunks_exact(32)
            .map(|chunk| {
                let mut word = [0u8; 32];
                word.copy_from_slice(chunk);
                word
            })
            .collect()
    }

    pub fn word_to_address(word: &[u8; 32]) -> Address {
        Address::from_slice(&word[12..])
    }

    pub fn word_to_uint(word: &[u8; 32]) -> U256 {
        U256::from_be_bytes(*word)
    }

    /// Lower 16 bytes reinterpreted as `i128`, the inverse of
    /// `encode_word`'s sign-extension for the signed values this crate
    /// ever sends or receives (tick indices).
    pub fn word_to_int(word: &[u8; 32]) -> i128 {
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&word[16..]);
        i128::from_be_bytes(bytes)
    }
}

impl<P> RpcChain<P>
where
    P: alloy_provider::Provider + Send + Sync,
{
    fn encode_send(&self, method: &str, args: &[Value]) -> CoreResult<Bytes> {
        if method == methods::MULTICALL {
            let items = match args.first() {
                Some(Value::Array(items)) => items,
                _ => return Err(CoreError::Validation("multicall requires an array argument".into())),
            };
            let mut encoded_calls = Vec::with_capacity(items.len());
            for item in items {
                let tuple = match item {
                    Value::Tuple(t) => t.as_slice(),
                    _ => return Err(CoreError::Validation("multicall entry must be a tuple".into())),
                };
                let (name_value, inner_args) = tuple
                    .split_first()
                    .ok_or_else(|| CoreError::Validation("multicall entry is empty".into()))?;
                let name = match name_value {
                    Value::Bytes(b) => std::str::from_utf8(b)
                        .map_err(|_| CoreError::Validation("multicall method name is not utf8".into()))?,
                    _ => return Err(CoreError::Validation("multicall entry missing method name".into())),
                };
                let inner_sig = abi::method_signature(name)?;
                let mut call = abi::selector(inner_sig).to_vec();
                call.extend(abi::encode_args(inner_args)?);
                encoded_calls.push(call);
            }
            Ok(abi::encode_multicall(&encoded_calls).into())
        } else {
            let sig = abi::method_signature(method)?;
            let mut calldata = abi::selector(sig).to_vec();
            calldata.extend(abi::encode_args(args)?);
            Ok(calldata.into())
        }
    }

    fn decode_call(&self, method: &str, raw: &[u8]) -> CoreResult<Vec<Value>> {
        let words = abi::decode_words(raw);
        let word = |idx: usize| {
            words
                .get(idx)
                .ok_or_else(|| CoreError::Transient(format!("{method}() response missing word {idx}")))
        };
        match method {
            methods::ALLOWANCE | methods::BALANCE_OF => {
                Ok(vec![Value::Uint(abi::word_to_uint(word(0)?))])
            }
            methods::OWNER_OF | methods::GET_APPROVED => {
                Ok(vec![Value::Address(abi::word_to_address(word(0)?))])
            }
            methods::DEPOSITS => {
                // Projects whichever word carries the incentive id/nonce;
                // the core re-derives it on every call rather than trusting
                // a cached value.
                Ok(vec![Value::Uint(abi::word_to_uint(word(0)?))])
            }
            methods::POSITIONS => {
                // Real `positions()` returns 11 static fields; liquidity
                // sits at word index 6, tokensOwed0/1 at 9/10. Re-project
                // into the 3-field shape the withdraw/mint primitives
                // consume.
                Ok(vec![Value::Tuple(vec![
                    Value::Uint(abi::word_to_uint(word(6)?)),
                    Value::Uint(abi::word_to_uint(word(9)?)),
                    Value::Uint(abi::word_to_uint(word(10)?)),
                ])])
            }
            methods::SAFELY_GET_STATE_OF_AMM => Ok(vec![
                Value::Uint(abi::word_to_uint(word(0)?)),
                Value::Int(abi::word_to_int(word(1)?)),
                Value::Uint(abi::word_to_uint(word(2)?)),
                Value::Uint(abi::word_to_uint(word(3)?)),
                Value::Uint(abi::word_to_uint(word(4)?)),
                Value::Int(abi::word_to_int(word(5)?)),
                Value::Int(abi::word_to_int(word(6)?)),
            ]),
            other => Err(CoreError::Validation(format!("call() not supported for {other}"))),
        }
    }
}

#[async_trait]
impl<P> Chain for RpcChain<P>
where
    P: alloy_provider::Provider + Send + Sync,
{
    async fn call(&self, contract: Address, method: &str, args: &[Value]) -> CoreResult<Vec<Value>> {
        let sig = abi::method_signature(method)?;
        let mut calldata = abi::selector(sig).to_vec();
        calldata.extend(abi::encode_args(args)?);
        let tx = TransactionRequest::default()
            .to(contract)
            .input(Bytes::from(calldata).into())
            .from(self.signer.address());
        let raw = self
            .provider
            .call(&tx)
            .await
            .map_err(|err| CoreError::Transient(err.to_string()))?;
        self.decode_call(method, &raw)
    }

    async fn send(
        &self,
        contract: Address,
        method: &str,
        args: &[Value],
        opts: SendOptions,
    ) -> CoreResult<B256> {
        let calldata = self.encode_send(method, args)?;

        let nonce = self
            .provider
            .get_transaction_count(self.signer.address())
            .await
            .map_err(|err| CoreError::Transient(err.to_string()))?;
        let fees = self
            .provider
            .estimate_eip1559_fees()
            .await
            .map_err(|err| CoreError::Transient(err.to_string()))?;
        let priority_bonus = 1.0 + opts.priority.clamp(0.0, 1.0);
        let max_priority_fee_per_gas =
            ((fees.max_priority_fee_per_gas as f64) * priority_bonus) as u128;

        let gas_limit = match opts.gas_limit {
            Some(limit) => limit,
            None => {
                let estimate_tx = TransactionRequest::default()
                    .to(contract)
                    .input(calldata.clone().into())
                    .from(self.signer.address());
                match self.provider.estimate_gas(&estimate_tx).await {
                    Ok(estimated) => estimated + estimated / 5,
                    Err(_) => DEFAULT_GAS_LIMIT,
                }
            }
        };

        let mut tx = TxEip1559 {
            chain_id: self.chain_id,
            nonce,
            gas_limit,
            max_fee_per_gas: fees.max_fee_per_gas,
            max_priority_fee_per_gas,
            to: TxKind::Call(contract),
            value: U256::ZERO,
            access_list: Default::default(),
            input: calldata,
        };
        let signature = self
            .signer
            .sign_transaction(&mut tx)
            .await
            .map_err(|err| CoreError::Transient(err.to_string()))?;
        let tx_hash = tx.signature_hash();
        let signed = TxEnvelope::Eip1559(Signed::new_unchecked(tx, signature, tx_hash));
        let raw_tx = signed.encoded_2718();

        let pending = self
            .provider
            .send_raw_transaction(&raw_tx)
            .await
            .map_err(|err| CoreError::Transient(err.to_string()))?;
        Ok(*pending.tx_hash())
    }

    async fn wait(&self, tx_hash: B256) -> CoreResult<Receipt> {
        let deadline = tokio::time::Instant::now() + self.tx_timeout;
        loop {
            match self.provider.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => return Ok(convert_receipt(receipt)),
                Ok(None) => {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(CoreError::Transient(format!(
                            "timed out waiting for confirmation of {tx_hash}"
                        )));
                    }
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
                Err(err) => return Err(CoreError::Transient(err.to_string())),
            }
        }
    }

    fn parse_logs(&self, receipt: &Receipt, event_signature: &str) -> CoreResult<Vec<DecodedLog>> {
        let topic0 = keccak256(event_signature.as_bytes());
        let mut out = Vec::new();
        for log in &receipt.logs {
            if log.topics.first() != Some(&topic0) {
                continue;
            }
            let mut values = Vec::new();
            for topic in log.topics.iter().skip(1) {
                values.push(Value::Uint(U256::from_be_bytes(topic.0)));
            }
            for word in log.data.chunks_exact(32) {
                let mut w = [0u8; 32];
                w.copy_from_slice(word);
                values.push(Value::Uint(U256::from_be_bytes(w)));
            }
            out.push(DecodedLog {
                address: log.address,
                values,
            });
        }
        Ok(out)
    }
}

fn convert_receipt(receipt: alloy_rpc_types_eth::TransactionReceipt) -> Receipt {
    let status = if receipt.status() {
        TxStatus::Success
    } else {
        TxStatus::Failed
    };
    let logs = receipt
        .inner
        .logs()
        .iter()
        .map(|log| Log {
            address: log.address(),
            topics: log.topics().to_vec(),
            data: log.data().data.clone(),
        })
        .collect();
    Receipt {
        tx_hash: receipt.transaction_hash,
        status,
        gas_used: receipt.gas_used as u64,
        effective_gas_price: U256::from(receipt.effective_gas_price),
        logs,
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use parking_lot::Mutex;

    /// An in-memory `Chain` used by workflow/supervisor unit tests. Each
    /// expected call is consumed in FIFO order; panics loudly on a
    /// mismatch so a misordered primitive fails fast.
    pub struct FakeChain {
        pub calls: Mutex<Vec<(Address, String, Vec<Value>)>>,
        pub call_responses: Mutex<Vec<CoreResult<Vec<Value>>>>,
        pub sends: Mutex<Vec<(Address, String, Vec<Value>)>>,
        pub send_responses: Mutex<Vec<CoreResult<B256>>>,
        pub wait_responses: Mutex<Vec<CoreResult<Receipt>>>,
        pub parse_logs_responses: Mutex<Vec<CoreResult<Vec<DecodedLog>>>>,
    }

    impl FakeChain {
        pub fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                call_responses: Mutex::new(Vec::new()),
                sends: Mutex::new(Vec::new()),
                send_responses: Mutex::new(Vec::new()),
                wait_responses: Mutex::new(Vec::new()),
                parse_logs_responses: Mutex::new(Vec::new()),
            }
        }

        pub fn push_call_response(&self, resp: CoreResult<Vec<Value>>) {
            self.call_responses.lock().push(resp);
        }

        pub fn push_send_response(&self, resp: CoreResult<B256>) {
            self.send_responses.lock().push(resp);
        }

        pub fn push_wait_response(&self, resp: CoreResult<Receipt>) {
            self.wait_responses.lock().push(resp);
        }

        pub fn push_parse_logs_response(&self, resp: CoreResult<Vec<DecodedLog>>) {
            self.parse_logs_responses.lock().push(resp);
        }
    }

    #[async_trait]
    impl Chain for FakeChain {
        async fn call(
            &self,
            contract: Address,
            method: &str,
            args: &[Value],
        ) -> CoreResult<Vec<Value>> {
            self.calls
                .lock()
                .push((contract, method.to_string(), args.to_vec()));
            let mut responses = self.call_responses.lock();
            if responses.is_empty() {
                return Ok(Vec::new());
            }
            responses.remove(0)
        }

        async fn send(
            &self,
            contract: Address,
            method: &str,
            args: &[Value],
            _opts: SendOptions,
        ) -> CoreResult<B256> {
            self.sends
                .lock()
                .push((contract, method.to_string(), args.to_vec()));
            let mut responses = self.send_responses.lock();
            if responses.is_empty() {
                return Ok(B256::ZERO);
            }
            responses.remove(0)
        }

        async fn wait(&self, _tx_hash: B256) -> CoreResult<Receipt> {
            let mut responses = self.wait_responses.lock();
            if responses.is_empty() {
                return Ok(Receipt {
                    tx_hash: B256::ZERO,
                    status: TxStatus::Success,
                    gas_used: 21_000,
                    effective_gas_price: U256::from(1_000_000_000u64),
                    logs: Vec::new(),
                });
            }
            responses.remove(0)
        }

        fn parse_logs(
            &self,
            _receipt: &Receipt,
            _event_signature: &str,
        ) -> CoreResult<Vec<DecodedLog>> {
            let mut responses = self.parse_logs_responses.lock();
            if responses.is_empty() {
                return Ok(Vec::new());
            }
            responses.remove(0)
        }
    }
}

#[cfg(test)]
mod abi_tests {
    use super::abi;
    use super::*;

    #[test]
    fn selector_is_stable_and_method_specific() {
        let a = abi::selector("approve(address,uint256)");
        let b = abi::selector("allowance(address,address)");
        assert_ne!(a, b);
        assert_eq!(a, abi::selector("approve(address,uint256)"));
    }

    #[test]
    fn encode_args_flattens_a_static_tuple_inline() {
        let args = vec![
            Value::Tuple(vec![
                Value::Address(Address::ZERO),
                Value::Uint(U256::from(7u64)),
            ]),
            Value::Uint(U256::from(1u64)),
        ];
        let encoded = abi::encode_args(&args).unwrap();
        assert_eq!(encoded.len(), 3 * 32);
        assert_eq!(&encoded[64..96], U256::from(7u64).to_be_bytes::<32>().as_slice());
        assert_eq!(&encoded[96..128], U256::from(1u64).to_be_bytes::<32>().as_slice());
    }

    #[test]
    fn encode_multicall_offsets_point_past_the_head() {
        let calls = vec![vec![1u8, 2, 3], vec![4u8; 40]];
        let encoded = abi::encode_multicall(&calls);
        // selector(4) + array offset word(32) + length word(32) + 2 offset words(64)
        assert!(encoded.len() > 4 + 32 + 32 + 64);
        let length_word = &encoded[4 + 32..4 + 64];
        assert_eq!(abi::word_to_uint(length_word.try_into().unwrap()), U256::from(2u64));
    }

    #[test]
    fn word_round_trips_address_and_signed_tick() {
        let addr = Address::from([7u8; 20]);
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(addr.as_slice());
        assert_eq!(abi::word_to_address(&word), addr);

        let mut neg = [0xffu8; 32];
        neg[16..].copy_from_slice(&(-100i128).to_be_bytes());
        assert_eq!(abi::word_to_int(&neg), -100);
    }
}
