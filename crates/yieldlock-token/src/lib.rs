//! Fungible token interface used uniformly for LP, wrapped and reward tokens.

pub mod ledger;

pub use ledger::TokenLedger;

use async_trait::async_trait;
use std::sync::Arc;
use yieldlock_types::{Address, Amount, Result};

/// Balance query, transfer, transfer-from and approve.
///
/// The caller identity is explicit: `transfer` moves the caller's own balance and
/// `transfer_from` spends an allowance granted to `spender`.
#[async_trait]
pub trait FungibleToken: Send + Sync {
    fn address(&self) -> Address;

    fn symbol(&self) -> &str;

    async fn balance_of(&self, account: Address) -> Amount;

    async fn total_supply(&self) -> Amount;

    async fn allowance(&self, owner: Address, spender: Address) -> Amount;

    async fn transfer(&self, caller: Address, to: Address, amount: Amount) -> Result<()>;

    async fn transfer_from(
        &self,
        spender: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<()>;

    async fn approve(&self, owner: Address, spender: Address, amount: Amount) -> Result<()>;
}

/// Tokens the protocol issues itself (deposit tokens, wrapped CRV).
#[async_trait]
pub trait MintableToken: FungibleToken {
    async fn mint(&self, caller: Address, to: Address, amount: Amount) -> Result<()>;

    async fn burn(&self, caller: Address, from: Address, amount: Amount) -> Result<()>;
}

pub type SharedToken = Arc<dyn FungibleToken>;
