use std::sync::Arc;
use yieldlock_gauge::{
    DelegateRegistry, Gauge, MemoryDelegateRegistry, MemoryGauge, MemoryGaugeController,
    MemoryMinter, MemoryVotingEscrow, VotingEscrow, MAX_LOCK_TIME,
};
use yieldlock_proxy::{VoterProxy, DELEGATE_SPACE};
use yieldlock_token::{FungibleToken, MintableToken, SharedToken, TokenLedger};
use yieldlock_types::{Address, Clock, ManualClock, ProtocolError, WEEK};

struct Fixture {
    clock: Arc<ManualClock>,
    admin: Address,
    operator: Address,
    depositor: Address,
    crv: Arc<TokenLedger>,
    lp: Arc<TokenLedger>,
    gauge: Arc<MemoryGauge>,
    escrow: Arc<MemoryVotingEscrow>,
    registry: Arc<MemoryDelegateRegistry>,
    proxy: VoterProxy,
}

async fn fixture(allow_proxy: bool) -> Fixture {
    let clock = Arc::new(ManualClock::new(100 * WEEK));
    let admin = Address::derive("admin");
    let operator = Address::derive("booster");
    let depositor = Address::derive("crv-depositor");

    let crv = Arc::new(TokenLedger::new("CRV", Address::derive("minter")));
    let minter = Arc::new(MemoryMinter::new(crv.clone()));
    let lp = Arc::new(TokenLedger::new("LP", admin));
    let gauge = Arc::new(MemoryGauge::new("pool-0", lp.clone(), 10, clock.clone()));
    let escrow = Arc::new(MemoryVotingEscrow::new(crv.clone(), clock.clone(), true));
    let registry = Arc::new(MemoryDelegateRegistry::new());

    let proxy = VoterProxy::new(
        admin,
        crv.clone(),
        escrow.clone(),
        minter,
        Arc::new(MemoryGaugeController::new()),
        registry.clone(),
    );
    proxy.set_operator(admin, operator).unwrap();
    proxy.set_depositor(admin, depositor).unwrap();
    if allow_proxy {
        escrow.allow(proxy.address()).await;
    }

    Fixture {
        clock,
        admin,
        operator,
        depositor,
        crv,
        lp,
        gauge,
        escrow,
        registry,
        proxy,
    }
}

#[tokio::test]
async fn test_deposit_and_withdraw_through_gauge() {
    let f = fixture(true).await;
    let lp: SharedToken = f.lp.clone();
    f.lp.mint(f.admin, f.proxy.address(), 500).await.unwrap();

    let staked = f.proxy.deposit(f.operator, &lp, f.gauge.as_ref()).await.unwrap();
    assert_eq!(staked, 500);
    assert_eq!(f.proxy.balance_of_pool(f.gauge.as_ref()).await, 500);

    f.proxy
        .withdraw(f.operator, &lp, f.gauge.as_ref(), 200)
        .await
        .unwrap();
    assert_eq!(f.lp.balance_of(f.operator).await, 200);
    assert_eq!(f.gauge.balance_of(f.proxy.address()).await, 300);

    let rest = f
        .proxy
        .withdraw_all(f.operator, &lp, f.gauge.as_ref())
        .await
        .unwrap();
    assert_eq!(rest, 300);
    assert_eq!(f.lp.balance_of(f.operator).await, 500);
}

#[tokio::test]
async fn test_gauge_calls_require_operator_or_depositor() {
    let f = fixture(true).await;
    let lp: SharedToken = f.lp.clone();
    let stranger = Address::derive("stranger");

    assert!(matches!(
        f.proxy.deposit(stranger, &lp, f.gauge.as_ref()).await,
        Err(ProtocolError::Unauthorized { .. })
    ));
    assert!(f.proxy.deposit(f.depositor, &lp, f.gauge.as_ref()).await.is_ok());
    assert!(matches!(
        f.proxy.claim_crv(f.depositor, f.gauge.as_ref()).await,
        Err(ProtocolError::Unauthorized { .. })
    ));
}

#[tokio::test]
async fn test_claim_crv_forwards_minted_emission() {
    let f = fixture(true).await;
    let lp: SharedToken = f.lp.clone();
    f.lp.mint(f.admin, f.proxy.address(), 100).await.unwrap();
    f.proxy.deposit(f.operator, &lp, f.gauge.as_ref()).await.unwrap();

    f.clock.advance(60);
    let claimed = f.proxy.claim_crv(f.operator, f.gauge.as_ref()).await.unwrap();
    assert_eq!(claimed, 600);
    assert_eq!(f.crv.balance_of(f.operator).await, 600);
    assert_eq!(f.crv.balance_of(f.proxy.address()).await, 0);
}

#[tokio::test]
async fn test_lock_lifecycle() {
    let f = fixture(true).await;
    f.crv.mint(Address::derive("minter"), f.proxy.address(), 1_000).await.unwrap();

    let unlock = f.clock.now() + 2 * WEEK;
    f.proxy.create_lock(f.depositor, 600, unlock).await.unwrap();
    f.proxy.increase_amount(f.depositor, 400).await.unwrap();
    assert_eq!(f.proxy.locked().await.amount, 1_000);
    assert!(f.proxy.voting_power().await > 0);

    f.proxy
        .increase_time(f.depositor, f.clock.now() + MAX_LOCK_TIME)
        .await
        .unwrap();
    assert!(f.proxy.release(f.depositor).await.is_err());

    f.clock.advance(MAX_LOCK_TIME + WEEK);
    let released = f.proxy.release(f.depositor).await.unwrap();
    assert_eq!(released, 1_000);
    assert_eq!(f.crv.balance_of(f.depositor).await, 1_000);
    assert_eq!(f.escrow.locked(f.proxy.address()).await.amount, 0);
}

#[tokio::test]
async fn test_escrow_rejection_passes_through_unmodified() {
    let f = fixture(false).await;
    f.crv.mint(Address::derive("minter"), f.proxy.address(), 10).await.unwrap();

    let err = f
        .proxy
        .create_lock(f.depositor, 10, f.clock.now() + MAX_LOCK_TIME)
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::External(_)));
    assert_eq!(err.to_string(), "Smart contract depositors not allowed");
}

#[tokio::test]
async fn test_refused_crv_returns_only_to_depositor() {
    let f = fixture(false).await;
    f.crv.mint(Address::derive("minter"), f.proxy.address(), 10).await.unwrap();
    assert!(f
        .proxy
        .create_lock(f.depositor, 10, f.clock.now() + MAX_LOCK_TIME)
        .await
        .is_err());

    assert!(matches!(
        f.proxy.return_crv(f.operator, 10).await,
        Err(ProtocolError::Unauthorized { .. })
    ));
    f.proxy.return_crv(f.depositor, 10).await.unwrap();
    assert_eq!(f.crv.balance_of(f.depositor).await, 10);
    assert_eq!(f.crv.balance_of(f.proxy.address()).await, 0);
}

#[tokio::test]
async fn test_delegation_round_trip() {
    let f = fixture(true).await;
    let delegate = Address::derive("delegate");

    f.proxy
        .delegate_voting_power(f.operator, delegate)
        .await
        .unwrap();
    assert_eq!(
        f.registry.delegation(f.proxy.address(), DELEGATE_SPACE).await,
        Some(delegate)
    );

    f.proxy.clear_delegation(f.operator).await.unwrap();
    assert_eq!(
        f.registry.delegation(f.proxy.address(), DELEGATE_SPACE).await,
        None
    );
    assert!(f.proxy.clear_delegation(f.operator).await.is_err());
}

#[tokio::test]
async fn test_roles_are_owner_assigned() {
    let f = fixture(true).await;
    let other = Address::derive("other");
    assert!(f.proxy.set_operator(f.operator, other).is_err());
    f.proxy.set_operator(f.admin, other).unwrap();
    assert_eq!(f.proxy.role(yieldlock_types::Role::Operator), Some(other));
}
