//! ERC-20 stablecoin contract handle.
//!
//! Only the three calls the payment flow needs are encoded: `balanceOf`,
//! `decimals` and `transfer`.

use crate::provider::{ChainRpc, ProviderError, TransactionRequest};
use stablepay_sdk::{Address, TxHash, U256};
use std::sync::Arc;

pub(crate) const BALANCE_OF: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];
pub(crate) const DECIMALS: [u8; 4] = [0x31, 0x3c, 0xe5, 0x67];
pub(crate) const TRANSFER: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// The stablecoin deployed on one chain, reached through the wallet.
#[derive(Clone)]
pub struct StablecoinContract {
    address: Address,
    chain_id: u64,
    rpc: Arc<dyn ChainRpc>,
}

impl std::fmt::Debug for StablecoinContract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StablecoinContract")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .finish()
    }
}

impl StablecoinContract {
    pub fn new(address: Address, chain_id: u64, rpc: Arc<dyn ChainRpc>) -> Self {
        Self {
            address,
            chain_id,
            rpc,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub async fn balance_of(&self, owner: Address) -> Result<U256, ProviderError> {
        let request = TransactionRequest {
            from: None,
            to: self.address,
            data: encode_call(BALANCE_OF, &[encode_address(owner)]),
            gas: None,
        };
        let output = self.rpc.call(&request).await?;
        decode_u256(&output)
    }

    pub async fn decimals(&self) -> Result<u32, ProviderError> {
        let request = TransactionRequest {
            from: None,
            to: self.address,
            data: DECIMALS.to_vec(),
            gas: None,
        };
        let output = self.rpc.call(&request).await?;
        let value = decode_u256(&output)?;
        if value > U256::from(u8::MAX) {
            return Err(ProviderError::InvalidResponse(format!(
                "decimals() returned {value}"
            )));
        }
        Ok(value.as_u32())
    }

    /// The unsigned `transfer(to, amount)` transaction from `from`.
    pub fn transfer_request(
        &self,
        from: Address,
        to: Address,
        amount: U256,
        gas: Option<u64>,
    ) -> TransactionRequest {
        TransactionRequest {
            from: Some(from),
            to: self.address,
            data: encode_call(TRANSFER, &[encode_address(to), encode_u256(amount)]),
            gas,
        }
    }

    pub async fn estimate_transfer_gas(
        &self,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<u64, ProviderError> {
        self.rpc
            .estimate_gas(&self.transfer_request(from, to, amount, None))
            .await
    }

    pub async fn transfer(
        &self,
        from: Address,
        to: Address,
        amount: U256,
        gas_limit: u64,
    ) -> Result<TxHash, ProviderError> {
        self.rpc
            .send_transaction(&self.transfer_request(from, to, amount, Some(gas_limit)))
            .await
    }
}

// ---------------------------------------------------------------------------
// ABI encoding
// ---------------------------------------------------------------------------

fn encode_call(selector: [u8; 4], words: &[[u8; 32]]) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + 32 * words.len());
    data.extend_from_slice(&selector);
    for word in words {
        data.extend_from_slice(word);
    }
    data
}

fn encode_address(address: Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

fn encode_u256(value: U256) -> [u8; 32] {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    word
}

fn decode_u256(output: &[u8]) -> Result<U256, ProviderError> {
    if output.len() < 32 {
        return Err(ProviderError::InvalidResponse(format!(
            "expected a 32-byte word, got {} bytes",
            output.len()
        )));
    }
    Ok(U256::from_big_endian(&output[..32]))
}

/// Function selector of a call payload, if it has one.
pub fn selector_of(data: &[u8]) -> Option<[u8; 4]> {
    data.get(..4).and_then(|s| s.try_into().ok())
}

#[cfg(test)]
pub(crate) fn encode_word(value: U256) -> Vec<u8> {
    encode_u256(value).to_vec()
}
