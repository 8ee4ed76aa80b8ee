//! Playback sessions and their supporting components

pub mod controller;
pub mod deliverer;
pub mod events;
pub mod reconciler;
pub mod registry;
pub mod session;

pub use controller::PlaybackController;
pub use deliverer::{DeliveryMode, SampleDeliverer};
pub use events::SessionSignal;
pub use reconciler::{ReconcilerInput, StateReconciler};
pub use registry::SessionRegistry;
pub use session::{Session, SessionSettings};
