//! Custodial proxy.
//!
//! The [`VoterProxy`] is the only account the escrow and the gauges ever see. It holds the
//! protocol's escrow lock, stakes LP into gauges on behalf of the controller, and forwards
//! claimed emissions to whoever asked for them. Two capabilities drive it: the controller
//! holds `Operator`, the locking aggregator holds `Depositor`.

pub mod proxy;

pub use proxy::{VoterProxy, DELEGATE_SPACE};
