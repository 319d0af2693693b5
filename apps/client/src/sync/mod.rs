pub mod client;
pub(crate) mod heartbeat;
pub(crate) mod push;

pub use client::{HttpSyncClient, SyncClient};
