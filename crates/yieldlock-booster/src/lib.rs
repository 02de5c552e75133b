/*!
# Yieldlock controller

The top of the protocol:

- **booster**: the pool registry, deposit/withdraw router, earmark fee engine and lifecycle
  state machine ([`Booster`])
- **fees**: fee bounds and the earmark split
- **config**: TOML deployment configuration with `YIELDLOCK_*` overrides
- **logging**: `tracing-subscriber` initialisation
- **system**: [`LockingProtocol`], one wired deployment of every component
*/

pub mod booster;
pub mod config;
pub mod fees;
pub mod logging;
pub mod system;

pub use booster::{Booster, BoosterParams, PoolFactories, PoolInfo};
pub use config::{FeesConfig, LoggingConfig, ProtocolConfig, RewardsConfig};
pub use fees::{FeeBounds, FeeConfig, FeeSplit, FEE_DENOMINATOR};
pub use logging::init_logging;
pub use system::{Collaborators, InMemoryEnvironment, LockingProtocol};
