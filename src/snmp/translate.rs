//! Symbolic IF-MIB column names to numeric OIDs.

/// Well-known `ifTable` columns. No name is a prefix of another.
const MIB_TABLE: &[(&str, &str)] = &[
    ("ifDescr", ".1.3.6.1.2.1.2.2.1.2"),
    ("ifInOctets", ".1.3.6.1.2.1.2.2.1.10"),
    ("ifOutOctets", ".1.3.6.1.2.1.2.2.1.16"),
    ("ifAdminStatus", ".1.3.6.1.2.1.2.2.1.7"),
    ("ifOperStatus", ".1.3.6.1.2.1.2.2.1.8"),
    ("ifIndex", ".1.3.6.1.2.1.2.2.1.1"),
    ("ifType", ".1.3.6.1.2.1.2.2.1.3"),
    ("ifMtu", ".1.3.6.1.2.1.2.2.1.4"),
    ("ifSpeed", ".1.3.6.1.2.1.2.2.1.5"),
    ("ifPhysAddress", ".1.3.6.1.2.1.2.2.1.6"),
    ("ifInUcastPkts", ".1.3.6.1.2.1.2.2.1.11"),
    ("ifInNUcastPkts", ".1.3.6.1.2.1.2.2.1.12"),
    ("ifInDiscards", ".1.3.6.1.2.1.2.2.1.13"),
    ("ifInErrors", ".1.3.6.1.2.1.2.2.1.14"),
    ("ifInUnknownProtos", ".1.3.6.1.2.1.2.2.1.15"),
    ("ifOutUcastPkts", ".1.3.6.1.2.1.2.2.1.17"),
    ("ifOutNUcastPkts", ".1.3.6.1.2.1.2.2.1.18"),
    ("ifOutDiscards", ".1.3.6.1.2.1.2.2.1.19"),
    ("ifOutErrors", ".1.3.6.1.2.1.2.2.1.20"),
    ("ifOutQLen", ".1.3.6.1.2.1.2.2.1.21"),
];

/// Replace a leading well-known name with its numeric OID, keeping the rest.
///
/// Input that does not start with a known name comes back unchanged.
pub fn translate(oid: &str) -> String {
    for (name, numeric) in MIB_TABLE {
        if let Some(rest) = oid.strip_prefix(name) {
            let translated = format!("{}{}", numeric, rest);
            tracing::trace!("translated OID '{}' to '{}'", oid, translated);
            return translated;
        }
    }

    oid.to_string()
}

/// Names known to the translator, for diagnostics and tests.
pub fn known_names() -> impl Iterator<Item = &'static str> {
    MIB_TABLE.iter().map(|(name, _)| *name)
}
