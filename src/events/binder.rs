//! Shared property-conversion helpers used by event constructors.
//!
//! The original design's property binder walked a type's fields via
//! reflection and coerced each matching attribute by its declared field
//! type. Rust event constructors bind fields explicitly (see
//! [`crate::events::catalog`]), but the coercion rules themselves —
//! bool parsing, delimited lists, delimited maps — are still shared code,
//! kept here so every constructor applies them identically.

use crate::packet::Packet;

/// Returns the attribute's raw string value, or `None` if absent.
pub fn string(packet: &Packet, key: &str) -> Option<String> {
    packet.get(key).map(str::to_owned)
}

/// Parses an attribute as a `bool`. AMI spells booleans several ways
/// depending on the action/event (`"Yes"`, `"true"`, `"1"`, `"y"`, `"t"`,
/// `"on"`); any of those (case-insensitively) is true, everything else
/// (including an absent attribute) is false.
pub fn boolean(packet: &Packet, key: &str) -> bool {
    packet
        .get(key)
        .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "t" | "1" | "y" | "yes" | "on"))
}

/// Parses an attribute via `FromStr`, returning `None` on absence or
/// parse failure rather than erroring — an unparseable enum-like field in
/// an event is dropped, not fatal to the whole event.
pub fn parsed<T: std::str::FromStr>(packet: &Packet, key: &str) -> Option<T> {
    packet.get(key).and_then(|v| v.parse().ok())
}

/// Splits a delimited list attribute, e.g. `"a,b,c"` with `sep = ','`.
/// Empty segments are dropped.
pub fn list(packet: &Packet, key: &str, sep: char) -> Vec<String> {
    packet
        .get(key)
        .map(|v| v.split(sep).map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned).collect())
        .unwrap_or_default()
}

/// Splits a delimited key=value map attribute, e.g.
/// `"a=1,b=2"` with `pair_sep = ','`, `kv_sep = '='`.
pub fn map(packet: &Packet, key: &str, pair_sep: char, kv_sep: char) -> Vec<(String, String)> {
    packet
        .get(key)
        .map(|v| {
            v.split(pair_sep)
                .filter_map(|pair| {
                    let (k, v) = pair.split_once(kv_sep)?;
                    Some((k.trim().to_owned(), v.trim().to_owned()))
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet_with(fields: &[(&str, &str)]) -> Packet {
        let mut p = Packet::new();
        for (k, v) in fields {
            p.push(*k, *v);
        }
        p
    }

    #[test]
    fn boolean_accepts_the_spec_true_spellings_and_defaults_false() {
        let p = packet_with(&[("A", "Yes"), ("B", "0"), ("C", "garbage"), ("D", "t"), ("E", "y")]);
        assert!(boolean(&p, "A"));
        assert!(!boolean(&p, "B"));
        assert!(!boolean(&p, "C"));
        assert!(boolean(&p, "D"));
        assert!(boolean(&p, "E"));
        assert!(!boolean(&p, "missing"));
    }

    #[test]
    fn list_splits_and_trims() {
        let p = packet_with(&[("Tags", "a, b ,c")]);
        assert_eq!(list(&p, "Tags", ','), vec!["a", "b", "c"]);
    }

    #[test]
    fn map_splits_pairs_then_kv() {
        let p = packet_with(&[("ChanVariable", "a=1,b=2")]);
        assert_eq!(
            map(&p, "ChanVariable", ',', '='),
            vec![("a".to_owned(), "1".to_owned()), ("b".to_owned(), "2".to_owned())]
        );
    }
}
