//! The wire-level attribute map shared by every frame kind.

/// An ordered, case-insensitive attribute map plus an optional command
/// output block.
///
/// AMI headers are `Key: Value` pairs separated by CRLF; a server may
/// repeat a header name (rare, but seen with `ChanVariable`), so insertion
/// order and duplicates are both preserved rather than collapsed into a
/// `HashMap`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    fields: Vec<(String, String)>,
    /// Lines collected between a `Response: Follows` header and the
    /// `--END COMMAND--` sentinel, joined by `\n`.
    pub output: Option<String>,
}

impl Packet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a header, preserving duplicates and original casing.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.push((key.into(), value.into()));
    }

    /// Looks up a header by case-insensitive name, returning the first match.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// True if the given header name is present, case-insensitively.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns a copy of this packet retaining only headers not present
    /// (case-insensitively) in `known_keys`. Used by event constructors to
    /// populate a side dictionary of attributes they don't explicitly bind.
    pub fn excluding(&self, known_keys: &[&str]) -> Packet {
        let mut out = Packet::new();
        for (k, v) in &self.fields {
            if !known_keys.iter().any(|kk| kk.eq_ignore_ascii_case(k)) {
                out.push(k.clone(), v.clone());
            }
        }
        out
    }
}
