//! Remote sync: the per-session gateway over the document store and the
//! controller that keeps local state and remote documents in step.

mod controller;
mod gateway;

pub use controller::{SyncController, SyncReport};
pub use gateway::{
    GatewayError, GatewayOptions, GatewayResult, SnapshotSink, SubscriptionHandle, SyncGateway,
};
