//! sight-services: command mediation between callers and the pump.
//!
//! Preferences, quota, user authorization and the firewall decide whether a
//! command may be sent; task runners and the pump link decide what is sent
//! and in which order.

pub mod authorization;
pub mod clock;
pub mod error;
pub mod firewall;
pub mod link;
pub mod preferences;
pub mod sliding_window;
pub mod task_runner;
pub mod transport;

pub use authorization::{AuthorizationError, AuthorizationGate, AuthorizationRequester};
pub use error::{ConfigurationError, SessionError};
pub use firewall::{Firewall, FirewallSettings, PolicyTable};
pub use link::PumpLink;
pub use preferences::{PreferenceStore, Preferences};
pub use sliding_window::SlidingWindow;
pub use task_runner::{
    Session, SessionState, SingleMessageTaskRunner, StatusResult, StatusTaskRunner, Step,
    TaskRunner,
};
pub use transport::{StreamTransport, Transport, TransportError};
