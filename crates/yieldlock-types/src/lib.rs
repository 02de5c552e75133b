/*!
# Yieldlock shared types

Building blocks used by every Yieldlock crate:

- **address**: 32-byte [`Address`] identities, [`Amount`], [`PoolId`], [`Timestamp`]
- **math**: 256-bit `mul_div`, reward-per-share `SCALE`, basis-point helpers
- **clock**: injected [`Clock`] with wall-clock and manual implementations
- **events**: [`ProtocolEvent`] payloads and the broadcast [`EventBus`]
- **roles**: the role-keyed [`PermissionTable`] every component authorizes through
- **error**: [`ProtocolError`] and the crate-wide [`Result`]
*/

pub mod address;
pub mod clock;
pub mod error;
pub mod events;
pub mod math;
pub mod roles;

pub use address::{Address, Amount, PoolId, Timestamp};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ProtocolError, Result};
pub use events::{EventBus, EventEnvelope, ProtocolEvent};
pub use roles::{PermissionTable, Reassign, Role};

/// One week in seconds.
pub const WEEK: u64 = 7 * 24 * 3600;
