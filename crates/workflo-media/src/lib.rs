//! # workflo-media
//!
//! Media and peer-transport abstractions plus the call signaling state
//! machine. The actual capture/transport backends are external primitives;
//! this crate defines their contracts and in-process implementations used by
//! tests and local simulation.

pub mod devices;
pub mod signaling;
pub mod transport;

mod error;

pub use devices::{LocalStream, MediaConstraints, MediaDevices, VirtualDevices};
pub use error::MediaError;
pub use signaling::{CallAction, CallEvent, CallRole, CallSession, CallState};
pub use transport::{
    IceConfig, LoopbackFactory, PeerTransport, TransportError, TransportFactory,
};
