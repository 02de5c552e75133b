use crate::booster::{Booster, PoolFactories};
use crate::config::ProtocolConfig;
use std::sync::Arc;
use tracing::info;
use yieldlock_factory::{RewardFactory, StashFactory, TokenFactory};
use yieldlock_gauge::{
    DelegateRegistry, GaugeController, MemoryDelegateRegistry, MemoryGaugeController,
    MemoryMinter, MemoryVotingEscrow, Minter, VotingEscrow,
};
use yieldlock_locker::CrvDepositor;
use yieldlock_proxy::VoterProxy;
use yieldlock_token::{FungibleToken, SharedToken, TokenLedger};
use yieldlock_types::{Address, Clock, EventBus, Result};

/// External systems a deployment talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub crv: SharedToken,
    pub escrow: Arc<dyn VotingEscrow>,
    pub minter: Arc<dyn Minter>,
    pub gauge_controller: Arc<dyn GaugeController>,
    pub delegate_registry: Arc<dyn DelegateRegistry>,
}

/// In-memory stand-ins for every collaborator, for simulations and tests.
pub struct InMemoryEnvironment {
    pub crv: Arc<TokenLedger>,
    pub escrow: Arc<MemoryVotingEscrow>,
    pub minter: Arc<MemoryMinter>,
    pub gauge_controller: Arc<MemoryGaugeController>,
    pub delegate_registry: Arc<MemoryDelegateRegistry>,
}

impl InMemoryEnvironment {
    pub fn new(clock: Arc<dyn Clock>, restrict_contracts: bool) -> Self {
        let crv = Arc::new(TokenLedger::new("CRV", MemoryMinter::default_address()));
        let minter = Arc::new(MemoryMinter::new(crv.clone()));
        Self {
            escrow: Arc::new(MemoryVotingEscrow::new(
                crv.clone(),
                clock,
                restrict_contracts,
            )),
            crv,
            minter,
            gauge_controller: Arc::new(MemoryGaugeController::new()),
            delegate_registry: Arc::new(MemoryDelegateRegistry::new()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            crv: self.crv.clone(),
            escrow: self.escrow.clone(),
            minter: self.minter.clone(),
            gauge_controller: self.gauge_controller.clone(),
            delegate_registry: self.delegate_registry.clone(),
        }
    }
}

/// One fully wired deployment: proxy, controller, factories and locker.
pub struct LockingProtocol {
    pub owner: Address,
    pub proxy: Arc<VoterProxy>,
    pub booster: Arc<Booster>,
    pub token_factory: Arc<TokenFactory>,
    pub reward_factory: Arc<RewardFactory>,
    pub stash_factory: Arc<StashFactory>,
    pub wrapped_crv: Arc<TokenLedger>,
    pub locker: Arc<CrvDepositor>,
    pub events: EventBus,
    pub clock: Arc<dyn Clock>,
}

impl LockingProtocol {
    /// Every role of every component starts with `owner`. The proxy's operator is the
    /// controller and its depositor the locker.
    pub async fn deploy(
        owner: Address,
        collaborators: Collaborators,
        config: &ProtocolConfig,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> Result<Self> {
        let booster_address = Booster::default_address();
        let Collaborators {
            crv,
            escrow,
            minter,
            gauge_controller,
            delegate_registry,
        } = collaborators;

        let proxy = Arc::new(VoterProxy::new(
            owner,
            crv.clone(),
            escrow,
            minter,
            gauge_controller,
            delegate_registry,
        ));

        let token_factory = Arc::new(TokenFactory::new(booster_address));
        let reward_factory = Arc::new(RewardFactory::new(
            booster_address,
            crv.clone(),
            config.reward_params(),
            clock.clone(),
            events.clone(),
        ));
        let stash_factory = Arc::new(StashFactory::new(
            owner,
            booster_address,
            reward_factory.clone(),
        ));
        stash_factory
            .set_template(owner, Some(config.stash.clone()))
            .await?;

        let booster = Booster::new(
            owner,
            crv.clone(),
            proxy.clone(),
            PoolFactories {
                token_factory: token_factory.clone(),
                reward_factory: reward_factory.clone(),
                stash_factory: stash_factory.clone(),
            },
            clock.clone(),
            events.clone(),
            config.booster_params(),
        )?;
        proxy.set_operator(owner, booster.address())?;

        let wrapped_crv = Arc::new(TokenLedger::with_address(
            Address::derive("wrapped-crv"),
            "ylCRV",
            CrvDepositor::default_address(),
        ));
        let locker = Arc::new(CrvDepositor::new(
            owner,
            owner,
            crv,
            wrapped_crv.clone(),
            proxy.clone(),
            clock.clone(),
            config.locker,
        ));
        proxy.set_depositor(owner, locker.address())?;

        info!(
            owner = %owner,
            proxy = %proxy.address(),
            booster = %booster.address(),
            locker = %locker.address(),
            wrapped = wrapped_crv.symbol(),
            "✨ Protocol deployed"
        );

        Ok(Self {
            owner,
            proxy,
            booster,
            token_factory,
            reward_factory,
            stash_factory,
            wrapped_crv,
            locker,
            events,
            clock,
        })
    }
}
