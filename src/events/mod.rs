//! Live job events.
//!
//! - [`ListenerRegistry`]: fan-out of [`JobEvent`](crate::job::JobEvent)s to
//!   listeners keyed by job id or [`ALL_JOBS`]
//! - [`EventStreamer`]: pumps one [`Subscription`] into an [`EventSink`]
//!   until the client goes away or the listener is removed
//!
//! # Delivery
//!
//! Each listener receives events in dispatch order. Listeners only see
//! events dispatched after they subscribed; there is no replay.

pub mod registry;
pub mod stream;

pub use registry::{ListenerId, ListenerRegistry, Subscription, ALL_JOBS};
pub use stream::{encode_frame, EventSink, EventStreamer};
