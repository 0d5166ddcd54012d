//! Asterisk version discovery and the version-dependent `Variable` wire
//! delimiter it governs.

/// The subset of Asterisk's AMI dialects this crate distinguishes between.
/// Versions are ordered oldest-to-newest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsteriskVersion {
    /// 1.4 and earlier: `Variable` pairs are pipe (`|`) delimited.
    Legacy,
    /// 1.6 through 10: `Variable` pairs are comma delimited, one header
    /// per variable is also accepted.
    Modern,
    /// 11 and newer: one `Variable: key=value` header per variable, no
    /// in-value delimiter at all.
    Current,
    /// Version string could not be parsed; falls back to `Current`
    /// framing, the safest modern default.
    Unknown,
}

impl AsteriskVersion {
    /// The delimiter joining repeated `Variable` values within a single
    /// header, or `None` when one header per variable is used instead.
    pub fn variable_delimiter(self) -> Option<char> {
        match self {
            AsteriskVersion::Legacy => Some('|'),
            AsteriskVersion::Modern => Some(','),
            AsteriskVersion::Current | AsteriskVersion::Unknown => None,
        }
    }

    /// Parses the free-form string returned by `core show version` (e.g.
    /// `"Asterisk 18.9.0"`) or `show version files` on very old releases.
    pub fn parse(banner_or_version: &str) -> AsteriskVersion {
        let digits: String = banner_or_version
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        let mut parts = digits.split('.');
        let major: Option<u32> = parts.next().and_then(|p| p.parse().ok());
        let minor: Option<u32> = parts.next().and_then(|p| p.parse().ok());

        match major {
            Some(1) => match minor {
                Some(m) if m <= 4 => AsteriskVersion::Legacy,
                Some(_) => AsteriskVersion::Modern,
                None => AsteriskVersion::Unknown,
            },
            Some(m) if (2..11).contains(&m) => AsteriskVersion::Modern,
            Some(m) if m >= 11 => AsteriskVersion::Current,
            _ => AsteriskVersion::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modern_dotted_version() {
        assert_eq!(AsteriskVersion::parse("Asterisk 18.9.0"), AsteriskVersion::Current);
        assert_eq!(AsteriskVersion::parse("Asterisk 1.8.32.3"), AsteriskVersion::Modern);
        assert_eq!(AsteriskVersion::parse("Asterisk 1.4.44"), AsteriskVersion::Legacy);
    }

    #[test]
    fn unparseable_string_falls_back_to_unknown() {
        assert_eq!(AsteriskVersion::parse("not a version"), AsteriskVersion::Unknown);
        assert_eq!(AsteriskVersion::Unknown.variable_delimiter(), None);
    }
}
