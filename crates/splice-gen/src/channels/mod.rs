//! Transport channels
//!
//! Builds the [`Transport`] from configuration.

pub mod network;
pub mod privileged;

pub use network::NetworkChannel;
pub use privileged::{CommandBridge, HostBridge, PrivilegedChannel};

use crate::config::SpliceConfig;
use crate::transport::Transport;
use std::sync::Arc;

/// Network channel plus, when a bridge is given or configured, the
/// privileged channel in front of it
pub fn create_transport(config: &SpliceConfig, bridge: Option<Arc<dyn HostBridge>>) -> Transport {
    let transport = Transport::new(Arc::new(NetworkChannel::new()), config.transport_policy());

    let bridge = bridge.or_else(|| {
        config
            .transport
            .bridge
            .as_ref()
            .map(|path| Arc::new(CommandBridge::new(path)) as Arc<dyn HostBridge>)
    });

    match bridge {
        Some(bridge) => transport.with_privileged(Arc::new(PrivilegedChannel::new(bridge))),
        None => transport,
    }
}
