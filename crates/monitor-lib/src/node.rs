//! Node info and node config providers

use crate::alert::AlertRules;
use crate::error::SourceError;
use crate::models::NodeInfo;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Node-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_rules: Option<AlertRules>,
}

/// Source of node capacity facts
#[async_trait]
pub trait NodeInfoProvider: Send + Sync {
    async fn node_info(&self) -> Result<NodeInfo, SourceError>;

    /// Change notifications, when the provider supports them
    fn node_info_changed(&self) -> Option<watch::Receiver<NodeInfo>> {
        None
    }
}

/// Source of node-level alert rules
#[async_trait]
pub trait NodeConfigProvider: Send + Sync {
    async fn node_config(&self) -> Result<NodeConfig, SourceError>;

    /// Change notifications, when the provider supports them
    fn node_config_changed(&self) -> Option<watch::Receiver<NodeConfig>> {
        None
    }
}

/// In-process node info holder
pub struct StaticNodeInfoProvider {
    tx: watch::Sender<NodeInfo>,
}

impl StaticNodeInfoProvider {
    pub fn new(info: NodeInfo) -> Self {
        let (tx, _) = watch::channel(info);
        Self { tx }
    }

    /// Replace the node info and notify subscribers
    pub fn update(&self, info: NodeInfo) {
        self.tx.send_replace(info);
    }
}

#[async_trait]
impl NodeInfoProvider for StaticNodeInfoProvider {
    async fn node_info(&self) -> Result<NodeInfo, SourceError> {
        Ok(self.tx.borrow().clone())
    }

    fn node_info_changed(&self) -> Option<watch::Receiver<NodeInfo>> {
        Some(self.tx.subscribe())
    }
}

/// In-process node config holder
pub struct StaticNodeConfigProvider {
    tx: watch::Sender<NodeConfig>,
}

impl StaticNodeConfigProvider {
    pub fn new(config: NodeConfig) -> Self {
        let (tx, _) = watch::channel(config);
        Self { tx }
    }

    /// Replace the node config and notify subscribers
    pub fn update(&self, config: NodeConfig) {
        self.tx.send_replace(config);
    }
}

#[async_trait]
impl NodeConfigProvider for StaticNodeConfigProvider {
    async fn node_config(&self) -> Result<NodeConfig, SourceError> {
        Ok(self.tx.borrow().clone())
    }

    fn node_config_changed(&self) -> Option<watch::Receiver<NodeConfig>> {
        Some(self.tx.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_node_info_update_notifies() {
        let provider = StaticNodeInfoProvider::new(NodeInfo {
            node_id: "node0".to_string(),
            ..Default::default()
        });
        let mut rx = provider.node_info_changed().unwrap();

        provider.update(NodeInfo {
            node_id: "node1".to_string(),
            ..Default::default()
        });

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().node_id, "node1");
        assert_eq!(provider.node_info().await.unwrap().node_id, "node1");
    }

    #[tokio::test]
    async fn test_static_node_config_without_rules() {
        let provider = StaticNodeConfigProvider::new(NodeConfig::default());
        let config = provider.node_config().await.unwrap();
        assert!(config.alert_rules.is_none());
    }
}
