use crate::{Address, PoolId};
use thiserror::Error;

/// Protocol operation result type
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors surfaced by every Yieldlock component.
///
/// Guard violations are checked before any state is touched. A collaborator failing part way
/// through an operation unwinds the token and share movements made before it, so an `Err`
/// leaves balances as they were; rewards already paid to the caller stay paid. `External`
/// carries failures raised by the escrow, gauge or other collaborators without rewording
/// them.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Unauthorized: {caller} does not hold {role}")]
    Unauthorized { role: String, caller: Address },

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Pool {0} is closed")]
    PoolIsClosed(PoolId),

    #[error("System is shut down")]
    Shutdown,

    #[error("Already initialized")]
    AlreadyInitialized,

    #[error("Not initialized")]
    NotInitialized,

    #[error("Stash factory produced no usable stash for pool {0}")]
    InvalidStash(PoolId),

    #[error("Pool not found: {0}")]
    PoolNotFound(PoolId),

    #[error("Insufficient balance for {account}: has {available}, needs {needed}")]
    InsufficientBalance {
        account: Address,
        available: u128,
        needed: u128,
    },

    #[error("Insufficient allowance from {owner} to {spender}: allowed {allowed}, needs {needed}")]
    InsufficientAllowance {
        owner: Address,
        spender: Address,
        allowed: u128,
        needed: u128,
    },

    #[error("Extra reward limit reached: {max}")]
    TooManyExtraRewards { max: usize },

    #[error("Math overflow")]
    MathOverflow,

    #[error("Component dropped: {0}")]
    ComponentUnavailable(&'static str),

    #[error(transparent)]
    External(#[from] anyhow::Error),
}

impl ProtocolError {
    pub fn unauthorized(role: impl Into<String>, caller: Address) -> Self {
        Self::Unauthorized {
            role: role.into(),
            caller,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidParameters(reason.into())
    }
}
