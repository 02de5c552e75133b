use crate::{FungibleToken, MintableToken};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};
use yieldlock_types::{Address, Amount, PermissionTable, ProtocolError, Reassign, Result, Role};

#[derive(Debug, Default)]
struct LedgerState {
    balances: HashMap<Address, Amount>,
    allowances: HashMap<(Address, Address), Amount>,
    total_supply: Amount,
}

impl LedgerState {
    fn balance(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn move_balance(&mut self, from: Address, to: Address, amount: Amount) -> Result<()> {
        let available = self.balance(&from);
        if available < amount {
            return Err(ProtocolError::InsufficientBalance {
                account: from,
                available,
                needed: amount,
            });
        }
        self.balances.insert(from, available - amount);
        let credited = self
            .balance(&to)
            .checked_add(amount)
            .ok_or(ProtocolError::MathOverflow)?;
        self.balances.insert(to, credited);
        Ok(())
    }
}

/// In-memory token ledger.
///
/// Balances, allowances and supply live behind one lock so every transfer is atomic. The
/// `Operator` role is the minter; it is unset for tokens the protocol does not issue.
pub struct TokenLedger {
    address: Address,
    symbol: String,
    permissions: PermissionTable,
    state: RwLock<LedgerState>,
}

impl TokenLedger {
    pub fn new(symbol: impl Into<String>, minter: Address) -> Self {
        let symbol = symbol.into();
        let address = Address::derive(&format!("token:{}", symbol));
        Self::with_address(address, symbol, minter)
    }

    pub fn with_address(address: Address, symbol: impl Into<String>, minter: Address) -> Self {
        Self {
            address,
            symbol: symbol.into(),
            permissions: PermissionTable::new().with(Role::Operator, minter, Reassign::Holder),
            state: RwLock::new(LedgerState::default()),
        }
    }

    pub fn minter(&self) -> Option<Address> {
        self.permissions.holder(Role::Operator)
    }

    pub fn set_minter(&self, caller: Address, minter: Address) -> Result<()> {
        self.permissions.reassign(Role::Operator, caller, minter)
    }
}

#[async_trait]
impl FungibleToken for TokenLedger {
    fn address(&self) -> Address {
        self.address
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }

    async fn balance_of(&self, account: Address) -> Amount {
        self.state.read().await.balance(&account)
    }

    async fn total_supply(&self) -> Amount {
        self.state.read().await.total_supply
    }

    async fn allowance(&self, owner: Address, spender: Address) -> Amount {
        let state = self.state.read().await;
        state.allowances.get(&(owner, spender)).copied().unwrap_or(0)
    }

    async fn transfer(&self, caller: Address, to: Address, amount: Amount) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        if to.is_zero() {
            return Err(ProtocolError::invalid("transfer to zero address"));
        }
        let mut state = self.state.write().await;
        state.move_balance(caller, to, amount)?;

        debug!(
            token = %self.symbol,
            from = %caller,
            to = %to,
            amount,
            "Token transferred"
        );
        Ok(())
    }

    async fn transfer_from(
        &self,
        spender: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        if to.is_zero() {
            return Err(ProtocolError::invalid("transfer to zero address"));
        }
        let mut state = self.state.write().await;
        let allowed = state.allowances.get(&(from, spender)).copied().unwrap_or(0);
        if allowed < amount {
            return Err(ProtocolError::InsufficientAllowance {
                owner: from,
                spender,
                allowed,
                needed: amount,
            });
        }
        state.move_balance(from, to, amount)?;
        if allowed != Amount::MAX {
            state.allowances.insert((from, spender), allowed - amount);
        }

        debug!(
            token = %self.symbol,
            spender = %spender,
            from = %from,
            to = %to,
            amount,
            "Token transferred from allowance"
        );
        Ok(())
    }

    async fn approve(&self, owner: Address, spender: Address, amount: Amount) -> Result<()> {
        let mut state = self.state.write().await;
        state.allowances.insert((owner, spender), amount);
        Ok(())
    }
}

#[async_trait]
impl MintableToken for TokenLedger {
    async fn mint(&self, caller: Address, to: Address, amount: Amount) -> Result<()> {
        self.permissions.require(Role::Operator, caller)?;
        if to.is_zero() {
            return Err(ProtocolError::invalid("mint to zero address"));
        }
        let mut state = self.state.write().await;
        let supply = state
            .total_supply
            .checked_add(amount)
            .ok_or(ProtocolError::MathOverflow)?;
        let balance = state.balance(&to) + amount;
        state.total_supply = supply;
        state.balances.insert(to, balance);

        info!(
            token = %self.symbol,
            to = %to,
            amount,
            total_supply = supply,
            "💰 Tokens minted"
        );
        Ok(())
    }

    async fn burn(&self, caller: Address, from: Address, amount: Amount) -> Result<()> {
        self.permissions.require(Role::Operator, caller)?;
        let mut state = self.state.write().await;
        let available = state.balance(&from);
        if available < amount {
            return Err(ProtocolError::InsufficientBalance {
                account: from,
                available,
                needed: amount,
            });
        }
        state.balances.insert(from, available - amount);
        state.total_supply -= amount;

        info!(
            token = %self.symbol,
            from = %from,
            amount,
            total_supply = state.total_supply,
            "💸 Tokens burned"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn accounts() -> (Address, Address, Address) {
        (
            Address::derive("minter"),
            Address::derive("alice"),
            Address::derive("bob"),
        )
    }

    #[tokio::test]
    async fn test_mint_transfer_burn() {
        let (minter, alice, bob) = accounts();
        let token = TokenLedger::new("LP", minter);

        token.mint(minter, alice, 100).await.unwrap();
        token.transfer(alice, bob, 40).await.unwrap();
        assert_eq!(token.balance_of(alice).await, 60);
        assert_eq!(token.balance_of(bob).await, 40);

        token.burn(minter, bob, 40).await.unwrap();
        assert_eq!(token.balance_of(bob).await, 0);
        assert_eq!(token.total_supply().await, 60);
    }

    #[tokio::test]
    async fn test_only_minter_can_mint() {
        let (minter, alice, _) = accounts();
        let token = TokenLedger::new("LP", minter);
        assert!(matches!(
            token.mint(alice, alice, 1).await,
            Err(ProtocolError::Unauthorized { .. })
        ));
        assert_eq!(token.total_supply().await, 0);
    }

    #[tokio::test]
    async fn test_transfer_from_consumes_allowance() {
        let (minter, alice, bob) = accounts();
        let token = TokenLedger::new("LP", minter);
        token.mint(minter, alice, 100).await.unwrap();

        assert!(matches!(
            token.transfer_from(bob, alice, bob, 10).await,
            Err(ProtocolError::InsufficientAllowance { .. })
        ));

        token.approve(alice, bob, 30).await.unwrap();
        token.transfer_from(bob, alice, bob, 25).await.unwrap();
        assert_eq!(token.allowance(alice, bob).await, 5);
        assert_eq!(token.balance_of(bob).await, 25);
    }

    #[tokio::test]
    async fn test_insufficient_balance_leaves_state_untouched() {
        let (minter, alice, bob) = accounts();
        let token = TokenLedger::new("LP", minter);
        token.mint(minter, alice, 10).await.unwrap();
        assert!(matches!(
            token.transfer(alice, bob, 11).await,
            Err(ProtocolError::InsufficientBalance { .. })
        ));
        assert_eq!(token.balance_of(alice).await, 10);
        assert_eq!(token.balance_of(bob).await, 0);
    }

    #[tokio::test]
    async fn test_minter_handover() {
        let (minter, alice, _) = accounts();
        let token = TokenLedger::new("LP", minter);
        token.set_minter(minter, alice).unwrap();
        assert_eq!(token.minter(), Some(alice));
        assert!(token.mint(minter, alice, 1).await.is_err());
        token.mint(alice, alice, 1).await.unwrap();
    }

    #[derive(Debug, Clone)]
    enum Op {
        Mint(usize, Amount),
        Burn(usize, Amount),
        Transfer(usize, usize, Amount),
        Pull(usize, usize, Amount, Amount),
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..3, 0u128..1_000).prop_map(|(a, v)| Op::Mint(a, v)),
            (0usize..3, 0u128..1_000).prop_map(|(a, v)| Op::Burn(a, v)),
            (0usize..3, 0usize..3, 0u128..1_000).prop_map(|(a, b, v)| Op::Transfer(a, b, v)),
            (0usize..3, 0usize..3, 0u128..1_000, 0u128..1_000)
                .prop_map(|(a, b, allowed, v)| Op::Pull(a, b, allowed, v)),
        ]
    }

    // Property: balances always sum to the supply, which moves only by minting and burning
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn prop_supply_is_conserved(ops in prop::collection::vec(arb_op(), 1..50)) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let minter = Address::derive("minter");
                let holders: Vec<Address> =
                    (0..3).map(|i| Address::derive(&format!("holder-{}", i))).collect();
                let token = TokenLedger::new("LP", minter);
                let mut expected: Amount = 0;

                for op in ops {
                    match op {
                        Op::Mint(a, v) => {
                            if token.mint(minter, holders[a], v).await.is_ok() {
                                expected += v;
                            }
                        }
                        Op::Burn(a, v) => {
                            if token.burn(minter, holders[a], v).await.is_ok() {
                                expected -= v;
                            }
                        }
                        Op::Transfer(a, b, v) => {
                            let _ = token.transfer(holders[a], holders[b], v).await;
                        }
                        Op::Pull(a, b, allowed, v) => {
                            token.approve(holders[a], holders[b], allowed).await.unwrap();
                            let _ = token.transfer_from(holders[b], holders[a], holders[b], v).await;
                        }
                    }

                    let mut sum = 0;
                    for holder in &holders {
                        sum += token.balance_of(*holder).await;
                    }
                    prop_assert_eq!(sum, token.total_supply().await);
                    prop_assert_eq!(token.total_supply().await, expected);
                }
                Ok(())
            })?;
        }
    }
}
