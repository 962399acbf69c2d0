//! UDP sessions backed by `snmp2::SyncSession`.

use super::{Connector, ErrorStatus, PduKind, Request, Response, Session, TransportError};
use crate::snmp::oid::Oid;
use crate::snmp::target::{
    AuthProtocol, Credentials, PrivProtocol, SecurityLevel, SnmpVersion, Target, V3Credentials,
};
use crate::snmp::types::Value;
use snmp2::SyncSession;
use std::str::FromStr;
use std::time::Duration;

/// Opens real SNMP sessions over UDP.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetConnector;

impl Connector for NetConnector {
    fn open(
        &self,
        target: &Target,
        timeout: Duration,
    ) -> Result<Box<dyn Session>, TransportError> {
        let peer = target.peer();
        let inner = match &target.credentials {
            Credentials::Community(community) => create_community_session(
                &peer,
                target.version,
                community.expose().as_bytes(),
                timeout,
            )?,
            Credentials::V3(v3) => create_v3_session(&peer, timeout, v3)?,
        };

        tracing::debug!("Opened SNMP session to {} (version: {})", peer, target.version);
        Ok(Box::new(NetSession { inner, peer }))
    }
}

fn create_community_session(
    peer: &str,
    version: SnmpVersion,
    community: &[u8],
    timeout: Duration,
) -> Result<SyncSession, TransportError> {
    let req_id = 1;

    let result = match version {
        SnmpVersion::V1 => SyncSession::new_v1(peer, community, Some(timeout), req_id),
        SnmpVersion::V2c => SyncSession::new_v2c(peer, community, Some(timeout), req_id),
        SnmpVersion::V3 => {
            return Err(TransportError::Other(
                "SNMPv3 target configured without v3 credentials".into(),
            ))
        }
    };

    result.map_err(|e| TransportError::Other(format!("cannot create session: {:?}", e)))
}

fn create_v3_session(
    peer: &str,
    timeout: Duration,
    config: &V3Credentials,
) -> Result<SyncSession, TransportError> {
    use snmp2::v3::{Auth, Security};

    let auth = match config.security_level {
        SecurityLevel::NoAuthNoPriv => Auth::NoAuthNoPriv,
        SecurityLevel::AuthNoPriv => Auth::AuthNoPriv,
        SecurityLevel::AuthPriv => Auth::AuthPriv {
            cipher: cipher(config.priv_protocol),
            privacy_password: config.priv_passphrase.expose().as_bytes().to_vec(),
        },
    };
    let needs_auth_protocol = !matches!(auth, Auth::NoAuthNoPriv);

    let mut security = Security::new(
        config.security_name.as_bytes(),
        config.auth_passphrase.expose().as_bytes(),
    )
    .with_auth(auth);

    if needs_auth_protocol {
        security = security.with_auth_protocol(auth_protocol(config.auth_protocol));
    }
    if config.security_level == SecurityLevel::AuthPriv {
        if let Some(method) = key_extension(config.priv_protocol) {
            security = security.with_key_extension_method(method);
        }
    }

    let req_id = 1;
    let mut session = SyncSession::new_v3(peer, Some(timeout), req_id, security)
        .map_err(|e| TransportError::Other(format!("cannot create v3 session: {:?}", e)))?;

    // Engine ID discovery
    if needs_auth_protocol {
        session.init().map_err(map_snmp_error)?;
    }

    Ok(session)
}

fn auth_protocol(protocol: AuthProtocol) -> snmp2::v3::AuthProtocol {
    use snmp2::v3::AuthProtocol as P;

    match protocol {
        AuthProtocol::Md5 => P::Md5,
        AuthProtocol::Sha1 => P::Sha1,
        AuthProtocol::Sha224 => P::Sha224,
        AuthProtocol::Sha256 => P::Sha256,
        AuthProtocol::Sha384 => P::Sha384,
        AuthProtocol::Sha512 => P::Sha512,
    }
}

/// The Cisco variants are the same ciphers with a different key extension.
fn cipher(protocol: PrivProtocol) -> snmp2::v3::Cipher {
    use snmp2::v3::Cipher;

    match protocol {
        PrivProtocol::Des => Cipher::Des,
        PrivProtocol::Aes128 => Cipher::Aes128,
        PrivProtocol::Aes192 | PrivProtocol::Aes192C => Cipher::Aes192,
        PrivProtocol::Aes256 | PrivProtocol::Aes256C => Cipher::Aes256,
    }
}

/// How short localized keys are stretched for AES-192/256.
fn key_extension(protocol: PrivProtocol) -> Option<snmp2::v3::KeyExtension> {
    use snmp2::v3::KeyExtension;

    match protocol {
        PrivProtocol::Des | PrivProtocol::Aes128 => None,
        PrivProtocol::Aes192 | PrivProtocol::Aes256 => Some(KeyExtension::Blumenthal),
        PrivProtocol::Aes192C | PrivProtocol::Aes256C => Some(KeyExtension::Reeder),
    }
}

struct NetSession {
    inner: SyncSession,
    peer: String,
}

#[derive(Clone, Copy)]
enum Op<'a> {
    Get(&'a [&'a snmp2::Oid<'static>]),
    GetNext(&'a snmp2::Oid<'static>),
    GetBulk(&'a [&'a snmp2::Oid<'static>], u32, u32),
}

impl NetSession {
    /// One request/response exchange with timeout retries and one
    /// re-send after v3 engine discovery.
    fn exchange(&mut self, op: Op<'_>, retries: u32) -> Result<Response, TransportError> {
        let mut attempt = 0;
        let mut reauthenticated = false;

        loop {
            let result = match op {
                Op::Get(oids) => self.inner.get_many(oids),
                Op::GetNext(oid) => self.inner.getnext(oid),
                Op::GetBulk(oids, non_repeaters, max_repetitions) => {
                    self.inner.getbulk(oids, non_repeaters, max_repetitions)
                }
            };

            match result {
                Ok(pdu) => {
                    let error_status = ErrorStatus::from_code(pdu.error_status);
                    let error_index = pdu.error_index;
                    let mut varbinds = Vec::new();
                    for (name, value) in pdu.varbinds {
                        varbinds.push((from_wire_oid(&name.to_string())?, convert_value(value)));
                    }
                    return Ok(Response {
                        error_status,
                        error_index,
                        varbinds,
                    });
                }
                Err(snmp2::Error::AuthUpdated) if !reauthenticated => {
                    tracing::debug!(
                        "SNMPv3 engine ID discovered for {}, retrying request",
                        self.peer
                    );
                    reauthenticated = true;
                }
                Err(snmp2::Error::Receive) if attempt < retries => {
                    attempt += 1;
                    tracing::debug!(
                        "Timeout from {}, retry {}/{}",
                        self.peer,
                        attempt,
                        retries
                    );
                }
                Err(e) => return Err(map_snmp_error(e)),
            }
        }
    }
}

impl Session for NetSession {
    fn send(&mut self, request: &Request) -> Result<Response, TransportError> {
        let oids = request
            .oids
            .iter()
            .map(to_wire_oid)
            .collect::<Result<Vec<_>, _>>()?;
        let first = oids
            .first()
            .ok_or_else(|| TransportError::Other("empty request".into()))?;

        let refs: Vec<&snmp2::Oid<'static>> = oids.iter().collect();

        match request.kind {
            PduKind::Get => self.exchange(Op::Get(&refs), request.retries),
            PduKind::GetNext => self.exchange(Op::GetNext(first), request.retries),
            PduKind::GetBulk {
                non_repeaters,
                max_repetitions,
            } => self.exchange(
                Op::GetBulk(&refs, non_repeaters, max_repetitions),
                request.retries,
            ),
        }
    }
}

fn to_wire_oid(oid: &Oid) -> Result<snmp2::Oid<'static>, TransportError> {
    snmp2::Oid::from_str(&oid.to_string())
        .map_err(|_| TransportError::Other(format!("cannot encode OID {}", oid)))
}

fn from_wire_oid(name: &str) -> Result<Oid, TransportError> {
    Oid::parse(name)
        .map_err(|_| TransportError::Other(format!("invalid OID in response: {}", name)))
}

fn map_snmp_error(err: snmp2::Error) -> TransportError {
    use snmp2::Error;

    match err {
        Error::Receive => TransportError::Timeout,
        Error::Send => TransportError::Other("send failed".into()),
        Error::BufferOverflow => TransportError::TooLong,
        Error::CommunityMismatch => TransportError::AuthFailure,
        Error::AuthFailure(kind) => {
            tracing::warn!("SNMPv3 authentication failure: {:?}", kind);
            TransportError::AuthFailure
        }
        other => TransportError::Other(format!("{:?}", other)),
    }
}

fn convert_value(value: snmp2::Value) -> Value {
    match value {
        snmp2::Value::Integer(i) => Value::Integer(i),
        snmp2::Value::OctetString(bytes) => Value::OctetString(bytes.to_vec()),
        snmp2::Value::ObjectIdentifier(oid) => match Oid::parse(&oid.to_string()) {
            Ok(parsed) => Value::ObjectIdentifier(parsed),
            Err(_) => Value::Unsupported(0x06),
        },
        snmp2::Value::IpAddress(ip) => Value::IpAddress(ip),
        snmp2::Value::Counter32(c) => Value::Counter32(c),
        snmp2::Value::Unsigned32(g) => Value::Unsigned32(g),
        snmp2::Value::Timeticks(t) => Value::Timeticks(t),
        snmp2::Value::Opaque(bytes) => Value::Opaque(bytes.to_vec()),
        snmp2::Value::Counter64(c) => Value::Counter64(c),
        snmp2::Value::Null => Value::Null,
        snmp2::Value::NoSuchObject => Value::NoSuchObject,
        snmp2::Value::NoSuchInstance => Value::NoSuchInstance,
        snmp2::Value::EndOfMibView => Value::EndOfMibView,
        other => {
            tracing::debug!("Unmapped SNMP value type: {:?}", other);
            Value::Unsupported(0)
        }
    }
}
