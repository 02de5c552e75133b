use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use yieldlock_rewards::{
    BaseRewardPool, PoolOperator, QueueOutcome, RewardParams, VirtualRewardPool,
};
use yieldlock_token::{FungibleToken, MintableToken, TokenLedger};
use yieldlock_types::events::drain;
use yieldlock_types::{
    Address, Amount, EventBus, ManualClock, PoolId, ProtocolError, ProtocolEvent, Result,
};

#[derive(Default)]
struct RecordingOperator {
    calls: Mutex<Vec<(Address, PoolId, Amount, Address)>>,
    refuse: AtomicBool,
}

#[async_trait]
impl PoolOperator for RecordingOperator {
    async fn withdraw_to(
        &self,
        caller: Address,
        pid: PoolId,
        amount: Amount,
        to: Address,
    ) -> Result<()> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(ProtocolError::invalid("gauge withdrawal refused"));
        }
        self.calls.lock().await.push((caller, pid, amount, to));
        Ok(())
    }
}

struct Setup {
    clock: Arc<ManualClock>,
    events: EventBus,
    admin: Address,
    booster: Address,
    reward_manager: Address,
    crv: Arc<TokenLedger>,
    deposit_token: Arc<TokenLedger>,
    operator: Arc<RecordingOperator>,
    pool: Arc<BaseRewardPool>,
}

fn setup_with(params: RewardParams) -> Setup {
    let clock = Arc::new(ManualClock::new(1_000_000));
    let events = EventBus::new();
    let admin = Address::derive("admin");
    let booster = Address::derive("booster");
    let reward_manager = Address::derive("reward-factory");
    let crv = Arc::new(TokenLedger::new("CRV", admin));
    let deposit_token = Arc::new(TokenLedger::new("yl-LP", admin));
    let operator = Arc::new(RecordingOperator::default());
    let weak: Weak<dyn PoolOperator> = Arc::downgrade(&operator) as Weak<dyn PoolOperator>;

    let pool = Arc::new(BaseRewardPool::new(
        0,
        deposit_token.clone(),
        crv.clone(),
        booster,
        reward_manager,
        weak,
        params,
        clock.clone(),
        events.clone(),
    ));

    Setup {
        clock,
        events,
        admin,
        booster,
        reward_manager,
        crv,
        deposit_token,
        operator,
        pool,
    }
}

fn setup() -> Setup {
    setup_with(RewardParams::default())
}

impl Setup {
    async fn stake(&self, account: Address, amount: Amount) {
        self.deposit_token
            .mint(self.admin, account, amount)
            .await
            .unwrap();
        self.deposit_token
            .approve(account, self.pool.address(), amount)
            .await
            .unwrap();
        self.pool.stake(account, amount).await.unwrap();
    }

    async fn fund(&self, amount: Amount) -> QueueOutcome {
        self.crv
            .mint(self.admin, self.pool.address(), amount)
            .await
            .unwrap();
        self.pool
            .queue_new_rewards(self.booster, amount)
            .await
            .unwrap()
    }

    fn extra(&self, symbol: &str) -> (Arc<TokenLedger>, Arc<VirtualRewardPool>) {
        let token = Arc::new(TokenLedger::new(symbol, self.admin));
        let extra = Arc::new(VirtualRewardPool::new(
            0,
            self.pool.address(),
            token.clone(),
            self.booster,
            RewardParams::default(),
            self.clock.clone(),
            self.events.clone(),
        ));
        (token, extra)
    }
}

#[tokio::test]
async fn test_stake_and_withdraw_track_shares() {
    let s = setup();
    let (alice, bob) = (Address::derive("alice"), Address::derive("bob"));
    let mut rx = s.events.subscribe();

    s.stake(alice, 70).await;
    s.stake(bob, 30).await;
    s.pool.withdraw(alice, 20, false).await.unwrap();

    assert_eq!(s.pool.balance_of(alice).await, 50);
    assert_eq!(s.pool.total_supply().await, 80);
    assert_eq!(s.deposit_token.balance_of(alice).await, 20);
    assert_eq!(s.deposit_token.balance_of(s.pool.address()).await, 80);

    let names: Vec<&str> = drain(&mut rx).iter().map(|e| e.event.name()).collect();
    assert_eq!(names, vec!["Staked", "Staked", "Withdrawn"]);
}

#[tokio::test]
async fn test_zero_amounts_rejected() {
    let s = setup();
    let alice = Address::derive("alice");
    assert!(matches!(
        s.pool.stake(alice, 0).await,
        Err(ProtocolError::InvalidAmount)
    ));
    assert!(matches!(
        s.pool.withdraw(alice, 0, false).await,
        Err(ProtocolError::InvalidAmount)
    ));
}

#[tokio::test]
async fn test_rewards_split_by_share() {
    let s = setup();
    let (alice, bob) = (Address::derive("alice"), Address::derive("bob"));
    s.stake(alice, 75).await;
    s.stake(bob, 25).await;

    assert_eq!(s.fund(604_800 * 4).await, QueueOutcome::Applied(604_800 * 4));
    s.clock.advance(1_000);

    assert_eq!(s.pool.earned(alice).await.unwrap(), 3_000);
    assert_eq!(s.pool.get_reward(alice).await.unwrap(), 3_000);
    assert_eq!(s.crv.balance_of(alice).await, 3_000);
    assert_eq!(s.pool.earned(alice).await.unwrap(), 0);
    assert_eq!(s.pool.earned(bob).await.unwrap(), 1_000);
}

#[tokio::test]
async fn test_second_top_up_reports_leftover() {
    let s = setup();
    let mut rx = s.events.subscribe();

    s.fund(604_800).await;
    let snapshot = s.pool.snapshot().await;
    assert_eq!(snapshot.reward_rate, 1);
    assert_eq!(snapshot.period_finish, 1_000_000 + 604_800);

    s.clock.advance(10);
    s.fund(604_800).await;

    let added: Vec<Amount> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e.event {
            ProtocolEvent::RewardAdded { amount } => Some(amount),
            _ => None,
        })
        .collect();
    assert_eq!(added, vec![604_800, 604_800 * 2 - 10]);
}

#[tokio::test]
async fn test_only_operator_queues() {
    let s = setup();
    assert!(matches!(
        s.pool.queue_new_rewards(s.admin, 10).await,
        Err(ProtocolError::Unauthorized { .. })
    ));
}

#[tokio::test]
async fn test_donation_streams_on_next_queue() {
    let s = setup();
    let donor = Address::derive("donor");
    s.crv.mint(s.admin, donor, 604_800).await.unwrap();
    s.crv.approve(donor, s.pool.address(), 604_800).await.unwrap();

    s.pool.donate(donor, 604_800).await.unwrap();
    assert_eq!(s.pool.snapshot().await.queued_rewards, 604_800);

    assert_eq!(s.fund(604_800).await, QueueOutcome::Applied(1_209_600));
    assert_eq!(s.pool.snapshot().await.reward_rate, 2);
}

#[tokio::test]
async fn test_extra_reward_mirrors_existing_stakers() {
    let s = setup();
    let (alice, bob) = (Address::derive("alice"), Address::derive("bob"));
    s.stake(alice, 40).await;

    let (token, extra) = s.extra("EXTRA");
    assert!(matches!(
        s.pool.add_extra_reward(s.admin, extra.clone()).await,
        Err(ProtocolError::Unauthorized { .. })
    ));
    s.pool
        .add_extra_reward(s.reward_manager, extra.clone())
        .await
        .unwrap();
    assert_eq!(extra.balance_of(alice).await, 40);

    s.stake(bob, 60).await;
    s.pool.withdraw(alice, 10, false).await.unwrap();
    assert_eq!(extra.balance_of(alice).await, 30);
    assert_eq!(extra.balance_of(bob).await, 60);
    assert_eq!(extra.total_supply().await, s.pool.total_supply().await);

    token.mint(s.admin, extra.address(), 604_800 * 9).await.unwrap();
    extra
        .queue_new_rewards(s.booster, 604_800 * 9)
        .await
        .unwrap();
    s.clock.advance(100);

    s.pool.get_reward_for(bob, true).await.unwrap();
    assert_eq!(token.balance_of(bob).await, 600);
}

#[tokio::test]
async fn test_extra_rewards_are_capped() {
    let s = setup_with(RewardParams {
        max_extra_rewards: 1,
        ..RewardParams::default()
    });
    let (_, first) = s.extra("ONE");
    let (_, second) = s.extra("TWO");
    s.pool
        .add_extra_reward(s.reward_manager, first.clone())
        .await
        .unwrap();
    assert!(matches!(
        s.pool.add_extra_reward(s.reward_manager, second).await,
        Err(ProtocolError::TooManyExtraRewards { max: 1 })
    ));
    assert!(s.pool.add_extra_reward(s.reward_manager, first).await.is_err());

    s.pool.clear_extra_rewards(s.reward_manager).await.unwrap();
    assert_eq!(s.pool.extra_rewards_length().await, 0);
}

#[tokio::test]
async fn test_withdraw_and_unwrap_notifies_operator() {
    let s = setup();
    let alice = Address::derive("alice");
    s.stake(alice, 50).await;
    s.fund(604_800).await;
    s.clock.advance(10);

    s.pool.withdraw_and_unwrap(alice, 50, true).await.unwrap();

    let calls = s.operator.calls.lock().await.clone();
    assert_eq!(calls, vec![(s.pool.address(), 0, 50, alice)]);
    assert_eq!(s.crv.balance_of(alice).await, 10);
    assert_eq!(s.pool.balance_of(alice).await, 0);
}

#[tokio::test]
async fn test_withdraw_and_unwrap_without_operator() {
    let s = setup();
    let alice = Address::derive("alice");
    s.stake(alice, 5).await;
    drop(s.operator);

    assert!(matches!(
        s.pool.withdraw_and_unwrap(alice, 5, false).await,
        Err(ProtocolError::ComponentUnavailable(_))
    ));
    assert_eq!(s.pool.balance_of(alice).await, 5);
}

#[tokio::test]
async fn test_refused_unwrap_restores_shares() {
    let s = setup();
    let alice = Address::derive("alice");
    s.stake(alice, 50).await;
    let (_, extra) = s.extra("SNX");
    s.pool
        .add_extra_reward(s.reward_manager, extra.clone())
        .await
        .unwrap();
    s.fund(604_800).await;
    s.clock.advance(10);
    s.operator.refuse.store(true, Ordering::SeqCst);

    let err = s.pool.withdraw_and_unwrap(alice, 20, true).await.unwrap_err();
    assert!(matches!(err, ProtocolError::InvalidParameters(_)));
    assert_eq!(s.pool.balance_of(alice).await, 50);
    assert_eq!(s.pool.total_supply().await, 50);
    assert_eq!(extra.balance_of(alice).await, 50);
    assert_eq!(s.deposit_token.balance_of(s.pool.address()).await, 50);
    // The claim ran before the refusal and stays paid
    assert_eq!(s.crv.balance_of(alice).await, 10);

    s.operator.refuse.store(false, Ordering::SeqCst);
    s.pool.withdraw_and_unwrap(alice, 20, false).await.unwrap();
    assert_eq!(s.pool.balance_of(alice).await, 30);
    assert_eq!(extra.balance_of(alice).await, 30);
}
