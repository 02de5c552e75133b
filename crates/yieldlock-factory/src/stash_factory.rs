use crate::reward_factory::RewardFactory;
use crate::stash::{ExtraRewardStash, StashInit, StashOperator, StashTemplate};
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;
use tracing::{info, warn};
use yieldlock_gauge::SharedGauge;
use yieldlock_types::{Address, PermissionTable, PoolId, Reassign, Result, Role};

/// Builds initialized stashes from the current [`StashTemplate`].
pub struct StashFactory {
    address: Address,
    reward_factory: Arc<RewardFactory>,
    permissions: PermissionTable,
    template: RwLock<Option<StashTemplate>>,
}

impl StashFactory {
    pub fn new(owner: Address, operator: Address, reward_factory: Arc<RewardFactory>) -> Self {
        Self {
            address: Address::derive("stash-factory"),
            reward_factory,
            permissions: PermissionTable::new()
                .with(Role::Owner, owner, Reassign::Holder)
                .with(Role::Operator, operator, Reassign::Holder),
            template: RwLock::new(None),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Sets (or with `None`, withdraws) the template new stashes are built from.
    pub async fn set_template(&self, caller: Address, template: Option<StashTemplate>) -> Result<()> {
        self.permissions.require(Role::Owner, caller)?;
        info!(template = ?template, "🧺 Stash template set");
        *self.template.write().await = template;
        Ok(())
    }

    pub async fn template(&self) -> Option<StashTemplate> {
        self.template.read().await.clone()
    }

    /// Returns `None` when no template is configured.
    pub async fn create_stash(
        &self,
        caller: Address,
        pid: PoolId,
        gauge: SharedGauge,
        operator_handle: Weak<dyn StashOperator>,
    ) -> Result<Option<Arc<ExtraRewardStash>>> {
        self.permissions.require(Role::Operator, caller)?;
        let Some(template) = self.template().await else {
            warn!(pid, "No stash template configured");
            return Ok(None);
        };

        let address = Address::derive_child(&self.address, &format!("stash:{}", pid));
        let stash = Arc::new(ExtraRewardStash::new(address, self.address, template));
        stash
            .initialize(
                self.address,
                StashInit {
                    pid,
                    operator: caller,
                    operator_handle,
                    gauge,
                    reward_factory: self.reward_factory.clone(),
                },
            )
            .await?;
        Ok(Some(stash))
    }
}
