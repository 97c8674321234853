use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::ip::Ipv4Block;
use crate::ports::parse_port_specs;

/// Provisioning plan that mirrors the YAML configuration
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    /// Nodes and the address blocks to provision on them
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
    /// Servers to place, in order
    #[serde(default)]
    pub deployments: Vec<DeploymentConfig>,
    /// Servers whose allocations are returned to the pool after deployment
    #[serde(default)]
    pub releases: Vec<ReleaseConfig>,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut node_ids = HashSet::new();
        for node in &self.nodes {
            if !node_ids.insert(node.id) {
                return Err(ValidationError::InvalidNode(format!("node {} is declared more than once", node.id)));
            }
            for block in &node.blocks {
                self.validate_block(node.id, block)?;
            }
        }

        let mut servers = HashSet::new();
        for deployment in &self.deployments {
            if !servers.insert(deployment.server) {
                return Err(ValidationError::InvalidDeployment(format!(
                    "server {} is deployed more than once",
                    deployment.server
                )));
            }
            parse_port_specs(&deployment.ports).map_err(|e| {
                ValidationError::InvalidDeployment(format!("server {}: {}", deployment.server, e))
            })?;
            for node in &deployment.nodes {
                if !node_ids.contains(node) {
                    log::warn!(
                        "Deployment of server {} references node {} which is not declared in this plan",
                        deployment.server,
                        node
                    );
                }
            }
        }

        Ok(())
    }

    fn validate_block(&self, node: u32, block: &BlockConfig) -> Result<(), ValidationError> {
        if block.ip.trim().is_empty() {
            return Err(ValidationError::InvalidBlock(format!("node {}: ip cannot be empty", node)));
        }
        if block.ports.is_empty() {
            return Err(ValidationError::InvalidBlock(format!(
                "node {}: block {} must list at least one port",
                node, block.ip
            )));
        }
        // Hostnames can only be checked once they are resolved
        if !self.general.resolve_hostnames() {
            Ipv4Block::parse(&block.ip)
                .map_err(|e| ValidationError::InvalidBlock(format!("node {}: {}", node, e)))?;
        }
        parse_port_specs(&block.ports)
            .map_err(|e| ValidationError::InvalidBlock(format!("node {}, block {}: {}", node, block.ip, e)))?;
        Ok(())
    }
}

/// Store and runtime settings
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Seed for random allocation picks (default: entropy)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Deadline for each store operation, e.g. "5s"
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub op_timeout: Option<Duration>,
    /// Resolve block hostnames with the system resolver (default: false)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolve_hostnames: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl GeneralConfig {
    pub fn resolve_hostnames(&self) -> bool {
        self.resolve_hostnames.unwrap_or(false)
    }
}

/// A node and the blocks to provision on it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub id: u32,
    #[serde(default)]
    pub blocks: Vec<BlockConfig>,
}

/// One address block with its port tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockConfig {
    /// Address, `address/prefix`, or hostname when resolution is enabled
    pub ip: String,
    /// Port tokens such as "25565" or "25565-25600"
    pub ports: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// Constraints for placing one server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub server: u64,
    #[serde(default)]
    pub dedicated: bool,
    /// Empty means any node
    #[serde(default)]
    pub nodes: Vec<u32>,
    /// Empty means any port
    #[serde(default)]
    pub ports: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseConfig {
    pub server: u64,
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid node configuration: {0}")]
    InvalidNode(String),
    #[error("Invalid block configuration: {0}")]
    InvalidBlock(String),
    #[error("Invalid deployment configuration: {0}")]
    InvalidDeployment(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Config {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_full_plan_parses() {
        let config = parse(
            r#"
general:
  seed: 42
  op_timeout: "250ms"
nodes:
  - id: 1
    blocks:
      - ip: "10.0.0.0/30"
        ports: ["25565", "25570-25580"]
        alias: "edge-1"
deployments:
  - server: 100
    dedicated: true
    nodes: [1]
    ports: ["25565"]
releases:
  - server: 100
"#,
        );

        assert_eq!(config.general.seed, Some(42));
        assert_eq!(config.general.op_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.nodes[0].blocks[0].alias.as_deref(), Some("edge-1"));
        assert!(config.deployments[0].dedicated);
        assert_eq!(config.releases[0].server, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_minimal_plan_uses_defaults() {
        let config = parse("nodes:\n  - id: 7\n");
        assert!(config.general.op_timeout.is_none());
        assert!(!config.general.resolve_hostnames());
        assert!(config.deployments.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let config = parse("nodes:\n  - id: 1\n  - id: 1\n");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("declared more than once"));
    }

    #[test]
    fn test_block_errors() {
        let config = parse("nodes:\n  - id: 1\n    blocks:\n      - ip: \"10.0.0.0/30\"\n        ports: []\n");
        assert!(matches!(config.validate(), Err(ValidationError::InvalidBlock(_))));

        let config = parse("nodes:\n  - id: 1\n    blocks:\n      - ip: \"10.0.0.0/20\"\n        ports: [\"25565\"]\n");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("CIDR"));

        let config = parse("nodes:\n  - id: 1\n    blocks:\n      - ip: \"10.0.0.1\"\n        ports: [\"25565-27000\"]\n");
        assert!(matches!(config.validate(), Err(ValidationError::InvalidBlock(_))));
    }

    #[test]
    fn test_hostnames_skip_address_check_when_resolving() {
        let yaml = "nodes:\n  - id: 1\n    blocks:\n      - ip: \"node1.example.com\"\n        ports: [\"25565\"]\n";
        assert!(parse(yaml).validate().is_err());

        let mut config = parse(yaml);
        config.general.resolve_hostnames = Some(true);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deployment_errors() {
        let config = parse("deployments:\n  - server: 1\n  - server: 1\n");
        assert!(matches!(config.validate(), Err(ValidationError::InvalidDeployment(_))));

        let config = parse("deployments:\n  - server: 1\n    ports: [\"80\"]\n");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("server 1"));
    }
}
