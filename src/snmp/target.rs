use crate::secret::SecretString;
use serde::Deserialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum SnmpVersion {
    V1,
    V2c,
    V3,
}

impl SnmpVersion {
    pub fn parse(version: &str) -> Result<Self, String> {
        match version.trim().to_lowercase().as_str() {
            "1" | "v1" | "snmpv1" => Ok(Self::V1),
            "2c" | "v2c" | "snmpv2c" | "2" | "v2" => Ok(Self::V2c),
            "3" | "v3" | "snmpv3" => Ok(Self::V3),
            _ => Err(format!("Unsupported SNMP version: '{}'", version)),
        }
    }

    /// GETBULK exists from v2c on.
    pub fn supports_bulk(self) -> bool {
        !matches!(self, Self::V1)
    }
}

impl TryFrom<String> for SnmpVersion {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl fmt::Display for SnmpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::V1 => "1",
            Self::V2c => "2c",
            Self::V3 => "3",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum SecurityLevel {
    NoAuthNoPriv,
    AuthNoPriv,
    AuthPriv,
}

impl SecurityLevel {
    pub fn parse(level: &str) -> Result<Self, String> {
        match level.trim().to_lowercase().as_str() {
            "noauthnopriv" | "" => Ok(Self::NoAuthNoPriv),
            "authnopriv" => Ok(Self::AuthNoPriv),
            "authpriv" => Ok(Self::AuthPriv),
            _ => Err(format!("Unsupported security level: '{}'", level)),
        }
    }
}

impl TryFrom<String> for SecurityLevel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum AuthProtocol {
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl AuthProtocol {
    pub fn parse(protocol: &str) -> Result<Self, String> {
        match protocol.trim().to_uppercase().as_str() {
            "MD5" => Ok(Self::Md5),
            "SHA" | "SHA1" | "SHA-1" => Ok(Self::Sha1),
            "SHA224" | "SHA-224" => Ok(Self::Sha224),
            "SHA256" | "SHA-256" => Ok(Self::Sha256),
            "SHA384" | "SHA-384" => Ok(Self::Sha384),
            "SHA512" | "SHA-512" => Ok(Self::Sha512),
            _ => Err(format!("Unsupported auth protocol: '{}'", protocol)),
        }
    }
}

impl TryFrom<String> for AuthProtocol {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

/// Privacy protocols, including the Cisco key-extension AES variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum PrivProtocol {
    Des,
    Aes128,
    Aes192,
    Aes256,
    Aes192C,
    Aes256C,
}

impl PrivProtocol {
    pub fn parse(protocol: &str) -> Result<Self, String> {
        match protocol.trim().to_uppercase().as_str() {
            "DES" => Ok(Self::Des),
            "AES" | "AES128" | "AES-128" => Ok(Self::Aes128),
            "AES192" | "AES-192" => Ok(Self::Aes192),
            "AES256" | "AES-256" => Ok(Self::Aes256),
            "AES192C" | "AES-192-C" => Ok(Self::Aes192C),
            "AES256C" | "AES-256-C" => Ok(Self::Aes256C),
            _ => Err(format!("Unsupported priv protocol: '{}'", protocol)),
        }
    }
}

impl TryFrom<String> for PrivProtocol {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

#[derive(Clone)]
pub struct V3Credentials {
    pub security_name: String,
    pub context_name: String,
    pub security_level: SecurityLevel,
    pub auth_protocol: AuthProtocol,
    pub auth_passphrase: SecretString,
    pub priv_protocol: PrivProtocol,
    pub priv_passphrase: SecretString,
}

impl fmt::Debug for V3Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("V3Credentials")
            .field("security_name", &self.security_name)
            .field("context_name", &self.context_name)
            .field("security_level", &self.security_level)
            .field("auth_protocol", &self.auth_protocol)
            .field("auth_passphrase", &"[REDACTED]")
            .field("priv_protocol", &self.priv_protocol)
            .field("priv_passphrase", &"[REDACTED]")
            .finish()
    }
}

/// SNMP credentials by version.
#[derive(Debug, Clone)]
pub enum Credentials {
    Community(SecretString),
    V3(V3Credentials),
}

/// Device endpoint for one polling pass.
#[derive(Debug, Clone)]
pub struct Target {
    pub address: String,
    pub port: u16,
    pub version: SnmpVersion,
    pub credentials: Credentials,
}

impl Target {
    pub fn v1(address: impl Into<String>, port: u16, community: &str) -> Self {
        Self::with_community(address, port, SnmpVersion::V1, community)
    }

    pub fn v2c(address: impl Into<String>, port: u16, community: &str) -> Self {
        Self::with_community(address, port, SnmpVersion::V2c, community)
    }

    pub fn v3(address: impl Into<String>, port: u16, credentials: V3Credentials) -> Self {
        Self {
            address: address.into(),
            port,
            version: SnmpVersion::V3,
            credentials: Credentials::V3(credentials),
        }
    }

    fn with_community(
        address: impl Into<String>,
        port: u16,
        version: SnmpVersion,
        community: &str,
    ) -> Self {
        Self {
            address: address.into(),
            port,
            version,
            credentials: Credentials::Community(SecretString::new(community)),
        }
    }

    /// `addr:port`, bracketing IPv6 literals.
    pub fn peer(&self) -> String {
        if self.address.contains(':') && !self.address.starts_with('[') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }

    /// Community for v1/v2c, context name for v3.
    pub fn community_context(&self) -> &str {
        match &self.credentials {
            Credentials::Community(community) => community.expose(),
            Credentials::V3(v3) => &v3.context_name,
        }
    }

    /// v3 security name; empty for community-based versions.
    pub fn security_name(&self) -> &str {
        match &self.credentials {
            Credentials::Community(_) => "",
            Credentials::V3(v3) => &v3.security_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v3_creds() -> V3Credentials {
        V3Credentials {
            security_name: "monitor".into(),
            context_name: "vrf-blue".into(),
            security_level: SecurityLevel::AuthPriv,
            auth_protocol: AuthProtocol::Sha256,
            auth_passphrase: SecretString::new("authpass123"),
            priv_protocol: PrivProtocol::Aes128,
            priv_passphrase: SecretString::new("privpass123"),
        }
    }

    #[test]
    fn test_parse_version_aliases() {
        assert_eq!(SnmpVersion::parse("1"), Ok(SnmpVersion::V1));
        assert_eq!(SnmpVersion::parse("v2c"), Ok(SnmpVersion::V2c));
        assert_eq!(SnmpVersion::parse("2"), Ok(SnmpVersion::V2c));
        assert_eq!(SnmpVersion::parse(" SNMPv3 "), Ok(SnmpVersion::V3));
        assert!(SnmpVersion::parse("4").is_err());
    }

    #[test]
    fn test_bulk_support_by_version() {
        assert!(!SnmpVersion::V1.supports_bulk());
        assert!(SnmpVersion::V2c.supports_bulk());
        assert!(SnmpVersion::V3.supports_bulk());
    }

    #[test]
    fn test_parse_auth_protocol() {
        assert_eq!(AuthProtocol::parse("md5"), Ok(AuthProtocol::Md5));
        assert_eq!(AuthProtocol::parse("SHA"), Ok(AuthProtocol::Sha1));
        assert_eq!(AuthProtocol::parse("sha-224"), Ok(AuthProtocol::Sha224));
        assert_eq!(AuthProtocol::parse("SHA256"), Ok(AuthProtocol::Sha256));
        assert_eq!(AuthProtocol::parse("SHA-384"), Ok(AuthProtocol::Sha384));
        assert_eq!(AuthProtocol::parse("SHA512"), Ok(AuthProtocol::Sha512));
        assert!(AuthProtocol::parse("INVALID").is_err());
    }

    #[test]
    fn test_parse_priv_protocol() {
        assert_eq!(PrivProtocol::parse("DES"), Ok(PrivProtocol::Des));
        assert_eq!(PrivProtocol::parse("AES"), Ok(PrivProtocol::Aes128));
        assert_eq!(PrivProtocol::parse("aes-192"), Ok(PrivProtocol::Aes192));
        assert_eq!(PrivProtocol::parse("AES256"), Ok(PrivProtocol::Aes256));
        assert_eq!(PrivProtocol::parse("AES-192-C"), Ok(PrivProtocol::Aes192C));
        assert_eq!(PrivProtocol::parse("AES-256-C"), Ok(PrivProtocol::Aes256C));
        assert!(PrivProtocol::parse("3DES").is_err());
    }

    #[test]
    fn test_security_level_from_json() {
        let level: SecurityLevel = serde_json::from_str("\"authPriv\"").unwrap();
        assert_eq!(level, SecurityLevel::AuthPriv);
        assert!(serde_json::from_str::<SecurityLevel>("\"bogus\"").is_err());
    }

    #[test]
    fn test_cache_identity_for_community_target() {
        let target = Target::v2c("10.0.0.1", 161, "public");
        assert_eq!(target.community_context(), "public");
        assert_eq!(target.security_name(), "");
    }

    #[test]
    fn test_cache_identity_for_v3_target() {
        let target = Target::v3("10.0.0.1", 161, v3_creds());
        assert_eq!(target.community_context(), "vrf-blue");
        assert_eq!(target.security_name(), "monitor");
    }

    #[test]
    fn test_peer_formatting() {
        assert_eq!(Target::v2c("10.0.0.1", 161, "x").peer(), "10.0.0.1:161");
        assert_eq!(Target::v2c("::1", 1161, "x").peer(), "[::1]:1161");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let debug = format!("{:?}", Target::v3("h", 161, v3_creds()));
        assert!(!debug.contains("authpass123"));
        assert!(!debug.contains("privpass123"));

        let debug = format!("{:?}", Target::v2c("h", 161, "topsecret"));
        assert!(!debug.contains("topsecret"));
    }
}
