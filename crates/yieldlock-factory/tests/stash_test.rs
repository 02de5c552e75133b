use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use yieldlock_factory::{
    ExtraRewardStash, RewardFactory, RewardHook, StashFactory, StashInit, StashOperator,
    StashTemplate,
};
use yieldlock_gauge::{Gauge, MemoryGauge};
use yieldlock_rewards::{BaseRewardPool, PoolOperator, RewardParams};
use yieldlock_token::{FungibleToken, MintableToken, SharedToken, TokenLedger};
use yieldlock_types::{Address, Amount, EventBus, ManualClock, PoolId, ProtocolError, Result};

struct NoopPool;

#[async_trait]
impl PoolOperator for NoopPool {
    async fn withdraw_to(&self, _: Address, _: PoolId, _: Amount, _: Address) -> Result<()> {
        Ok(())
    }
}

/// Stands in for the controller: claims the gauge position held by `proxy` into the stash.
struct MockBooster {
    gauge: Arc<MemoryGauge>,
    proxy: Address,
    ledger: Arc<BaseRewardPool>,
    reward_manager: Address,
    claims: AtomicUsize,
}

#[async_trait]
impl StashOperator for MockBooster {
    async fn claim_rewards(&self, caller: Address, _pid: PoolId) -> Result<()> {
        self.claims.fetch_add(1, Ordering::SeqCst);
        self.gauge.claim_rewards(self.proxy, caller).await?;
        Ok(())
    }

    async fn reward_ledger(&self, _pid: PoolId) -> Result<Arc<BaseRewardPool>> {
        Ok(self.ledger.clone())
    }

    fn reward_manager(&self) -> Option<Address> {
        Some(self.reward_manager)
    }
}

struct CountingHook {
    calls: AtomicUsize,
}

#[async_trait]
impl RewardHook for CountingHook {
    async fn on_reward_claim(&self, _stash: Address, _pid: PoolId) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("hook source unavailable")
    }
}

struct Setup {
    clock: Arc<ManualClock>,
    admin: Address,
    booster_address: Address,
    reward_manager: Address,
    extra_token: Arc<TokenLedger>,
    deposit_token: Arc<TokenLedger>,
    gauge: Arc<MemoryGauge>,
    booster: Arc<MockBooster>,
    reward_factory: Arc<RewardFactory>,
    stash_factory: StashFactory,
}

async fn setup(template: Option<StashTemplate>) -> Setup {
    let clock = Arc::new(ManualClock::new(1_000_000));
    let events = EventBus::new();
    let admin = Address::derive("admin");
    let booster_address = Address::derive("booster");
    let reward_manager = Address::derive("reward-manager");
    let proxy = Address::derive("voter-proxy");

    let crv = Arc::new(TokenLedger::new("CRV", admin));
    let lp = Arc::new(TokenLedger::new("LP", admin));
    let extra_token = Arc::new(TokenLedger::new("SNX", admin));
    let deposit_token = Arc::new(TokenLedger::new("ylLP", admin));
    let gauge = Arc::new(MemoryGauge::new("pool-0", lp.clone(), 0, clock.clone()));
    gauge.add_reward_token(extra_token.clone()).await;

    lp.mint(admin, proxy, 1_000).await.unwrap();
    lp.approve(proxy, gauge.address(), 1_000).await.unwrap();
    gauge.deposit(proxy, 1_000).await.unwrap();

    let reward_factory = Arc::new(RewardFactory::new(
        booster_address,
        crv.clone(),
        RewardParams::default(),
        clock.clone(),
        events,
    ));
    let noop: Weak<dyn PoolOperator> = Weak::<NoopPool>::new();
    let ledger = reward_factory
        .create_crv_rewards(booster_address, 0, deposit_token.clone(), noop)
        .unwrap();

    let booster = Arc::new(MockBooster {
        gauge: gauge.clone(),
        proxy,
        ledger,
        reward_manager,
        claims: AtomicUsize::new(0),
    });

    let stash_factory = StashFactory::new(admin, booster_address, reward_factory.clone());
    stash_factory.set_template(admin, template).await.unwrap();

    Setup {
        clock,
        admin,
        booster_address,
        reward_manager,
        extra_token,
        deposit_token,
        gauge,
        booster,
        reward_factory,
        stash_factory,
    }
}

impl Setup {
    async fn stash(&self) -> Arc<ExtraRewardStash> {
        let handle: Weak<dyn StashOperator> = Arc::downgrade(&self.booster) as Weak<dyn StashOperator>;
        let stash = self
            .stash_factory
            .create_stash(self.booster_address, 0, self.gauge.clone(), handle)
            .await
            .unwrap()
            .expect("template configured");
        self.reward_factory
            .set_access(self.booster_address, stash.address(), true)
            .await
            .unwrap();
        stash
    }

    async fn credit_gauge(&self, amount: Amount) {
        self.extra_token
            .mint(self.admin, self.gauge.address(), amount)
            .await
            .unwrap();
        self.gauge
            .credit_reward(self.extra_token.address(), self.booster.proxy, amount)
            .await;
    }
}

#[tokio::test]
async fn test_no_template_yields_no_stash() {
    let s = setup(None).await;
    let handle: Weak<dyn StashOperator> = Arc::downgrade(&s.booster) as Weak<dyn StashOperator>;
    let stash = s
        .stash_factory
        .create_stash(s.booster_address, 0, s.gauge.clone(), handle)
        .await
        .unwrap();
    assert!(stash.is_none());
}

#[tokio::test]
async fn test_only_operator_creates_stash() {
    let s = setup(Some(StashTemplate::default())).await;
    let handle: Weak<dyn StashOperator> = Arc::downgrade(&s.booster) as Weak<dyn StashOperator>;
    assert!(matches!(
        s.stash_factory
            .create_stash(s.admin, 0, s.gauge.clone(), handle)
            .await,
        Err(ProtocolError::Unauthorized { .. })
    ));
}

#[tokio::test]
async fn test_second_initialize_rejected() {
    let s = setup(Some(StashTemplate::default())).await;
    let stash = s.stash().await;
    assert!(stash.is_initialized().await);

    let handle: Weak<dyn StashOperator> = Arc::downgrade(&s.booster) as Weak<dyn StashOperator>;
    let again = stash
        .initialize(
            s.stash_factory.address(),
            StashInit {
                pid: 1,
                operator: s.admin,
                operator_handle: handle,
                gauge: s.gauge.clone(),
                reward_factory: s.reward_factory.clone(),
            },
        )
        .await;
    assert!(matches!(again, Err(ProtocolError::AlreadyInitialized)));
    assert_eq!(stash.pid().await, Some(0));
}

#[tokio::test]
async fn test_claim_registers_and_forwards_gauge_rewards() {
    let s = setup(Some(StashTemplate::default())).await;
    let stash = s.stash().await;
    let alice = Address::derive("alice");

    // Alice staked before the secondary ledger existed
    s.deposit_token
        .mint(s.admin, alice, 100)
        .await
        .unwrap();
    let ledger = s.booster.ledger.clone();
    s.deposit_token
        .approve(alice, ledger.address(), 100)
        .await
        .unwrap();
    ledger.stake(alice, 100).await.unwrap();

    s.credit_gauge(604_800).await;
    stash.claim_rewards(s.booster_address).await.unwrap();
    assert_eq!(s.booster.claims.load(Ordering::SeqCst), 1);
    assert_eq!(stash.token_count().await, 1);
    assert_eq!(s.extra_token.balance_of(stash.address()).await, 604_800);

    let forwarded = stash.process_stash(s.booster_address).await.unwrap();
    assert_eq!(forwarded, vec![(s.extra_token.address(), 604_800)]);

    let (_, extra) = stash.token_rewards().await.remove(0);
    assert_eq!(extra.balance_of(alice).await, 100);
    assert_eq!(ledger.extra_rewards_length().await, 1);

    s.clock.advance(1_000);
    ledger.get_reward(alice).await.unwrap();
    assert_eq!(s.extra_token.balance_of(alice).await, 1_000);
}

#[tokio::test]
async fn test_stash_gates() {
    let s = setup(Some(StashTemplate::default())).await;
    let stash = s.stash().await;
    let token: SharedToken = s.extra_token.clone();

    assert!(matches!(
        stash.process_stash(s.admin).await,
        Err(ProtocolError::Unauthorized { .. })
    ));
    assert!(matches!(
        stash.set_extra_reward(s.booster_address, token.clone()).await,
        Err(ProtocolError::Unauthorized { .. })
    ));

    stash
        .set_extra_reward(s.reward_manager, token.clone())
        .await
        .unwrap();
    // Registering twice keeps one entry
    stash.set_extra_reward(s.reward_manager, token).await.unwrap();
    assert_eq!(stash.token_count().await, 1);

    stash
        .clear_extra_reward(s.reward_manager, s.extra_token.address())
        .await
        .unwrap();
    assert_eq!(stash.token_count().await, 0);
}

#[tokio::test]
async fn test_token_cap_from_template() {
    let s = setup(Some(StashTemplate {
        version: 3,
        max_tokens: 1,
    }))
    .await;
    let stash = s.stash().await;
    let other: SharedToken = Arc::new(TokenLedger::new("OTHER", s.admin));

    stash
        .set_extra_reward(s.reward_manager, s.extra_token.clone())
        .await
        .unwrap();
    assert!(matches!(
        stash.set_extra_reward(s.reward_manager, other).await,
        Err(ProtocolError::TooManyExtraRewards { max: 1 })
    ));

    stash.clear_extra_rewards(s.reward_manager).await.unwrap();
    assert_eq!(stash.token_count().await, 0);
}

#[tokio::test]
async fn test_failing_hook_does_not_abort_claim() {
    let s = setup(Some(StashTemplate::default())).await;
    let stash = s.stash().await;
    let hook = Arc::new(CountingHook {
        calls: AtomicUsize::new(0),
    });

    assert!(stash
        .set_reward_hook(s.admin, Some(hook.clone() as Arc<dyn RewardHook>))
        .await
        .is_err());
    stash
        .set_reward_hook(s.reward_manager, Some(hook.clone() as Arc<dyn RewardHook>))
        .await
        .unwrap();

    stash.claim_rewards(s.booster_address).await.unwrap();
    assert_eq!(hook.calls.load(Ordering::SeqCst), 1);
    assert_eq!(s.booster.claims.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_token_rewards_need_access() {
    let s = setup(Some(StashTemplate::default())).await;
    let stranger = Address::derive("stranger");
    let token: SharedToken = s.extra_token.clone();
    let result = s
        .reward_factory
        .create_token_rewards(stranger, token, &s.booster.ledger, stranger)
        .await;
    assert!(matches!(result, Err(ProtocolError::Unauthorized { .. })));

    assert!(s
        .reward_factory
        .set_access(stranger, stranger, true)
        .await
        .is_err());
}
