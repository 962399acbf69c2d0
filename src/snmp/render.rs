//! Table index rendering for walk results.

use super::oid::{join_arcs, Oid};

/// Renders the index part of a walked OID in readable form.
pub trait IndexRenderer: Send {
    /// Readable index of `oid` under `root`, if this renderer has one.
    fn render(&self, root: &Oid, oid: &Oid) -> Option<String>;

    /// Inverse of [`render`](Self::render): full OID for a readable index.
    fn parse(&self, root: &Oid, index: &str) -> Option<Oid>;
}

/// Plain dotted numeric indices.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumericIndex;

impl IndexRenderer for NumericIndex {
    fn render(&self, _root: &Oid, _oid: &Oid) -> Option<String> {
        None
    }

    fn parse(&self, root: &Oid, index: &str) -> Option<Oid> {
        let mut oid = root.clone();
        for part in index.split('.') {
            oid.push(part.parse().ok()?);
        }
        Some(oid)
    }
}

/// Shows a trailing length-prefixed printable string as `"text"`,
/// e.g. suffix `3.5.97.100.109.105.110` becomes `3."admin"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringIndex;

fn is_index_char(arc: u32) -> bool {
    (0x20..=0x7e).contains(&arc) && arc != u32::from(b'"') && arc != u32::from(b'\\')
}

impl IndexRenderer for StringIndex {
    fn render(&self, root: &Oid, oid: &Oid) -> Option<String> {
        let suffix = oid.suffix(root)?;

        let start = (0..suffix.len()).find(|&k| {
            let text_len = suffix.len() - k - 1;
            text_len > 0
                && suffix[k] as usize == text_len
                && suffix[k + 1..].iter().all(|&arc| is_index_char(arc))
        })?;

        let text: String = suffix[start + 1..]
            .iter()
            .filter_map(|&arc| char::from_u32(arc))
            .collect();

        if start == 0 {
            Some(format!("\"{}\"", text))
        } else {
            Some(format!("{}.\"{}\"", join_arcs(&suffix[..start]), text))
        }
    }

    fn parse(&self, root: &Oid, index: &str) -> Option<Oid> {
        let Some(quote) = index.find('"') else {
            return NumericIndex.parse(root, index);
        };

        let text = index[quote + 1..].strip_suffix('"')?;
        let mut oid = match index[..quote].strip_suffix('.') {
            Some(prefix) => NumericIndex.parse(root, prefix)?,
            None if quote == 0 => root.clone(),
            None => return None,
        };

        oid.push(u32::try_from(text.len()).ok()?);
        for byte in text.bytes() {
            oid.push(u32::from(byte));
        }
        Some(oid)
    }
}

/// Index string for `oid` under `root`: the renderer's form if it parses
/// back to the same OID, the numeric suffix otherwise.
pub fn choose_index(renderer: &dyn IndexRenderer, root: &Oid, oid: &Oid) -> String {
    if let Some(readable) = renderer.render(root, oid) {
        if renderer.parse(root, &readable).as_ref() == Some(oid) {
            return readable;
        }
        tracing::debug!("Index '{}' of {} does not round-trip, using numeric form", readable, oid);
    }

    join_arcs(oid.suffix(root).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn o(s: &str) -> Oid {
        Oid::parse(s).unwrap()
    }

    #[test]
    fn test_numeric_index() {
        let root = o("1.3.6.1.2.1.4.20.1.1");
        let cell = o("1.3.6.1.2.1.4.20.1.1.10.0.0.1");
        assert_eq!(choose_index(&NumericIndex, &root, &cell), "10.0.0.1");
        assert_eq!(NumericIndex.parse(&root, "10.0.0.1"), Some(cell));
    }

    #[test]
    fn test_string_index_renders_quoted() {
        let root = o("1.3.6.1.6.3.15.1.2.2.1.3");
        let cell = o("1.3.6.1.6.3.15.1.2.2.1.3.5.97.100.109.105.110");
        assert_eq!(choose_index(&StringIndex, &root, &cell), "\"admin\"");

        let prefixed = o("1.3.6.1.6.3.15.1.2.2.1.3.3.5.97.100.109.105.110");
        assert_eq!(choose_index(&StringIndex, &root, &prefixed), "3.\"admin\"");
    }

    #[test]
    fn test_string_index_round_trips() {
        let root = o("1.3.6.1.6.3.15.1.2.2.1.3");
        let cell = o("1.3.6.1.6.3.15.1.2.2.1.3.3.5.97.100.109.105.110");
        let rendered = StringIndex.render(&root, &cell).unwrap();
        assert_eq!(StringIndex.parse(&root, &rendered), Some(cell));
    }

    #[test]
    fn test_string_index_falls_back_to_numeric() {
        let root = o("1.3.6.1.2.1.2.2.1.2");
        assert_eq!(choose_index(&StringIndex, &root, &o("1.3.6.1.2.1.2.2.1.2.3")), "3");

        let ip_root = o("1.3.6.1.2.1.4.20.1.1");
        let ip_cell = o("1.3.6.1.2.1.4.20.1.1.192.168.1.1");
        assert_eq!(choose_index(&StringIndex, &ip_root, &ip_cell), "192.168.1.1");
    }

    #[test]
    fn test_renderer_without_round_trip_is_ignored() {
        struct Lossy;
        impl IndexRenderer for Lossy {
            fn render(&self, _root: &Oid, _oid: &Oid) -> Option<String> {
                Some("eth0".into())
            }
            fn parse(&self, _root: &Oid, _index: &str) -> Option<Oid> {
                None
            }
        }

        let root = o("1.3.6.1.2.1.2.2.1.2");
        assert_eq!(choose_index(&Lossy, &root, &o("1.3.6.1.2.1.2.2.1.2.7")), "7");
    }
}
