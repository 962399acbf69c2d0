//! Turns raw binding values into typed item values.

use super::types::{ItemValue, PollError, Value};

// net-snmp wraps float/double/64-bit integers inside Opaque as
// [0x9f, subtype, len, bytes...]
const OPAQUE_TAG1: u8 = 0x9f;
const OPAQUE_COUNTER64: u8 = 0x76;
const OPAQUE_FLOAT: u8 = 0x78;
const OPAQUE_DOUBLE: u8 = 0x79;
const OPAQUE_I64: u8 = 0x7a;
const OPAQUE_U64: u8 = 0x7b;

const TAG_OPAQUE: u8 = 0x44;
const TAG_NO_SUCH_OBJECT: u8 = 0x80;
const TAG_NO_SUCH_INSTANCE: u8 = 0x81;
const TAG_END_OF_MIB_VIEW: u8 = 0x82;

/// Decode a binding value. Exception and unknown types become `NotSupported`.
pub fn decode_value(value: &Value) -> Result<ItemValue, PollError> {
    match value {
        Value::Integer(i) => Ok(ItemValue::Text(i.to_string())),
        Value::Counter32(v) | Value::Unsigned32(v) | Value::Timeticks(v) => {
            Ok(ItemValue::Uint64(u64::from(*v)))
        }
        Value::Counter64(v) => Ok(ItemValue::Uint64(*v)),
        Value::OctetString(bytes) => Ok(ItemValue::Text(render_octet_string(bytes))),
        Value::ObjectIdentifier(oid) => Ok(ItemValue::Text(oid.to_dotted())),
        Value::IpAddress(ip) => Ok(ItemValue::Text(format!(
            "{}.{}.{}.{}",
            ip[0], ip[1], ip[2], ip[3]
        ))),
        Value::Null => Ok(ItemValue::Text("NULL".to_string())),
        Value::Opaque(bytes) => decode_opaque(bytes)
            .ok_or_else(|| PollError::NotSupported(unknown_type(TAG_OPAQUE))),
        Value::NoSuchObject => Err(PollError::NotSupported(exception_message(
            TAG_NO_SUCH_OBJECT,
        ))),
        Value::NoSuchInstance => Err(PollError::NotSupported(exception_message(
            TAG_NO_SUCH_INSTANCE,
        ))),
        Value::EndOfMibView => Err(PollError::NotSupported(exception_message(
            TAG_END_OF_MIB_VIEW,
        ))),
        Value::Unsupported(tag) => Err(PollError::NotSupported(unknown_type(*tag))),
    }
}

/// Error text for an exception value, or the unknown-type text for other tags.
pub fn exception_message(tag: u8) -> String {
    match tag {
        TAG_NO_SUCH_OBJECT => "No Such Object available on this agent at this OID".to_string(),
        TAG_NO_SUCH_INSTANCE => "No Such Instance currently exists at this OID".to_string(),
        TAG_END_OF_MIB_VIEW => {
            "No more variables left in this MIB View (it is past the end of the MIB tree)"
                .to_string()
        }
        other => unknown_type(other),
    }
}

/// Message for an exception carried by a walk binding.
pub fn describe_exception(value: &Value) -> Option<String> {
    match value {
        Value::NoSuchObject => Some(exception_message(TAG_NO_SUCH_OBJECT)),
        Value::NoSuchInstance => Some(exception_message(TAG_NO_SUCH_INSTANCE)),
        Value::EndOfMibView => Some(exception_message(TAG_END_OF_MIB_VIEW)),
        _ => None,
    }
}

fn unknown_type(tag: u8) -> String {
    format!("Value has unknown type 0x{:02X}", tag)
}

/// Printable strings verbatim, anything else as space-separated hex.
pub fn render_octet_string(bytes: &[u8]) -> String {
    let body = match bytes.split_last() {
        Some((0, rest)) => rest,
        _ => bytes,
    };

    let printable = body
        .iter()
        .all(|&b| b.is_ascii_graphic() || b.is_ascii_whitespace());

    if printable {
        String::from_utf8_lossy(body).into_owned()
    } else {
        bytes
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn decode_opaque(bytes: &[u8]) -> Option<ItemValue> {
    let (&tag1, rest) = bytes.split_first()?;
    if tag1 != OPAQUE_TAG1 {
        return None;
    }
    let (&subtype, rest) = rest.split_first()?;
    let (&len, payload) = rest.split_first()?;
    let payload = payload.get(..usize::from(len))?;

    match subtype {
        OPAQUE_FLOAT => {
            let raw: [u8; 4] = payload.try_into().ok()?;
            Some(ItemValue::Double(f64::from(f32::from_be_bytes(raw))))
        }
        OPAQUE_DOUBLE => {
            let raw: [u8; 8] = payload.try_into().ok()?;
            Some(ItemValue::Double(f64::from_be_bytes(raw)))
        }
        OPAQUE_I64 => Some(ItemValue::Text(be_signed(payload)?.to_string())),
        OPAQUE_U64 | OPAQUE_COUNTER64 => Some(ItemValue::Uint64(be_unsigned(payload)?)),
        _ => None,
    }
}

fn be_unsigned(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() || bytes.len() > 9 || (bytes.len() == 9 && bytes[0] != 0) {
        return None;
    }
    Some(bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
}

fn be_signed(bytes: &[u8]) -> Option<i64> {
    if bytes.is_empty() || bytes.len() > 8 {
        return None;
    }
    let init: i64 = if bytes[0] & 0x80 != 0 { -1 } else { 0 };
    Some(bytes.iter().fold(init, |acc, &b| (acc << 8) | i64::from(b)))
}
