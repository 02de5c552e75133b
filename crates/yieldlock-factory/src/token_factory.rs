use std::sync::Arc;
use tracing::info;
use yieldlock_token::{FungibleToken, TokenLedger};
use yieldlock_types::{Address, PermissionTable, Reassign, Result, Role};

/// Builds per-pool deposit tokens whose only minter is the operator.
pub struct TokenFactory {
    address: Address,
    permissions: PermissionTable,
}

impl TokenFactory {
    pub fn new(operator: Address) -> Self {
        Self {
            address: Address::derive("token-factory"),
            permissions: PermissionTable::new().with(Role::Operator, operator, Reassign::Holder),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn create_deposit_token(
        &self,
        caller: Address,
        lp: &dyn FungibleToken,
    ) -> Result<Arc<TokenLedger>> {
        self.permissions.require(Role::Operator, caller)?;
        let address = Address::derive_child(&self.address, &format!("deposit:{}", lp.address()));
        let token = TokenLedger::with_address(address, format!("yl{}", lp.symbol()), caller);
        info!(lp = %lp.address(), token = %address, symbol = token.symbol(), "🏗️ Deposit token created");
        Ok(Arc::new(token))
    }
}
