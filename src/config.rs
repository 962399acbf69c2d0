use crate::secret::SecretString;
use crate::snmp::{
    AuthProtocol, ItemRequest, PollerSettings, PrivProtocol, SecurityLevel, SnmpVersion, Target,
    V3Credentials, DEFAULT_MAX_BATCH_ITEMS,
};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("interface {interface}: {message}")]
    Interface { interface: String, message: String },
}

/// Poller configuration file
#[derive(Debug, Clone, Deserialize)]
pub struct PollerConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_max_batch_items")]
    pub max_batch_items: usize,
    #[serde(default = "default_true")]
    pub retry_single_oid: bool,
    /// Render string-valued table indices as `"text"` in walks.
    #[serde(default)]
    pub string_indices: bool,
    #[serde(default)]
    pub interfaces: Vec<InterfaceConfig>,
}

/// One SNMP interface of a monitored host
#[derive(Debug, Clone, Deserialize)]
pub struct InterfaceConfig {
    pub id: String,
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allow multi-OID GETs and GETBULK walks.
    #[serde(default = "default_true")]
    pub bulk: bool,
    pub snmp: SnmpConfig,
    #[serde(default)]
    pub items: Vec<ItemConfig>,
}

/// SNMP credentials as written in the file
#[derive(Debug, Clone, Deserialize)]
pub struct SnmpConfig {
    pub version: SnmpVersion,
    #[serde(default)]
    pub community: Option<SecretString>,
    #[serde(default)]
    pub security_name: Option<String>,
    #[serde(default)]
    pub context_name: String,
    #[serde(default = "default_security_level")]
    pub security_level: SecurityLevel,
    #[serde(default)]
    pub auth_protocol: Option<AuthProtocol>,
    #[serde(default)]
    pub auth_passphrase: SecretString,
    #[serde(default)]
    pub priv_protocol: Option<PrivProtocol>,
    #[serde(default)]
    pub priv_passphrase: SecretString,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemConfig {
    pub id: String,
    pub oid: String,
}

fn default_timeout_secs() -> u64 {
    3
}

fn default_poll_interval() -> u64 {
    60
}

fn default_workers() -> usize {
    1
}

fn default_max_batch_items() -> usize {
    DEFAULT_MAX_BATCH_ITEMS
}

fn default_true() -> bool {
    true
}

fn default_port() -> u16 {
    161
}

fn default_security_level() -> SecurityLevel {
    SecurityLevel::NoAuthNoPriv
}

impl PollerConfig {
    /// Load and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        let config: PollerConfig = serde_json::from_str(contents)?;
        for interface in &config.interfaces {
            interface.target()?;
        }
        Ok(config)
    }

    pub fn settings(&self) -> PollerSettings {
        PollerSettings {
            timeout: Duration::from_secs(self.timeout_secs),
            max_batch_items: self.max_batch_items.max(1),
            retry_single_oid: self.retry_single_oid,
        }
    }

    pub fn interface(&self, id: &str) -> Option<&InterfaceConfig> {
        self.interfaces.iter().find(|i| i.id == id)
    }
}

impl InterfaceConfig {
    fn error(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::Interface {
            interface: self.id.clone(),
            message: message.into(),
        }
    }

    /// Build the polling target from the configured credentials.
    pub fn target(&self) -> Result<Target, ConfigError> {
        let snmp = &self.snmp;
        match snmp.version {
            SnmpVersion::V1 | SnmpVersion::V2c => {
                let community = snmp
                    .community
                    .as_ref()
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| {
                        self.error(format!("community is required for SNMPv{}", snmp.version))
                    })?;
                Ok(match snmp.version {
                    SnmpVersion::V1 => Target::v1(&self.address, self.port, community.expose()),
                    _ => Target::v2c(&self.address, self.port, community.expose()),
                })
            }
            SnmpVersion::V3 => {
                let security_name = snmp
                    .security_name
                    .clone()
                    .filter(|name| !name.is_empty())
                    .ok_or_else(|| self.error("security_name is required for SNMPv3"))?;

                let needs_auth = snmp.security_level != SecurityLevel::NoAuthNoPriv;
                let needs_priv = snmp.security_level == SecurityLevel::AuthPriv;

                let auth_protocol = match snmp.auth_protocol {
                    Some(protocol) => protocol,
                    None if needs_auth => {
                        return Err(self.error("auth_protocol is required for this security level"))
                    }
                    None => AuthProtocol::Sha1,
                };
                let priv_protocol = match snmp.priv_protocol {
                    Some(protocol) => protocol,
                    None if needs_priv => {
                        return Err(self.error("priv_protocol is required for authPriv"))
                    }
                    None => PrivProtocol::Aes128,
                };
                if needs_auth && snmp.auth_passphrase.is_empty() {
                    return Err(self.error("auth_passphrase is required for this security level"));
                }
                if needs_priv && snmp.priv_passphrase.is_empty() {
                    return Err(self.error("priv_passphrase is required for authPriv"));
                }

                Ok(Target::v3(
                    &self.address,
                    self.port,
                    V3Credentials {
                        security_name,
                        context_name: snmp.context_name.clone(),
                        security_level: snmp.security_level,
                        auth_protocol,
                        auth_passphrase: snmp.auth_passphrase.clone(),
                        priv_protocol,
                        priv_passphrase: snmp.priv_passphrase.clone(),
                    },
                ))
            }
        }
    }

    pub fn items(&self) -> Vec<ItemRequest> {
        self.items
            .iter()
            .map(|item| ItemRequest::new(&item.id, &item.oid))
            .collect()
    }
}
