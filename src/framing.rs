//! Byte-stream framing: splitting the socket's byte stream into lines, and
//! assembling lines into [`Packet`]s.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::config::SocketEncoding;
use crate::packet::Packet;

/// Splits an incoming byte stream on `\r\n` (falling back to a bare `\n`,
/// since some Asterisk versions have been observed to emit one on the
/// identification banner line only), decoding each line with the
/// connection's configured [`SocketEncoding`].
#[derive(Debug, Default)]
pub struct LineDecoder {
    encoding: SocketEncoding,
}

impl LineDecoder {
    pub fn new(encoding: SocketEncoding) -> Self {
        Self { encoding }
    }
}

impl Decoder for LineDecoder {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        let Some(nl) = src.iter().position(|b| *b == b'\n') else {
            return Ok(None);
        };
        let mut line = src.split_to(nl + 1);
        line.truncate(line.len() - 1);
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        let text = self.encoding.decode(&line);
        Ok(Some(text))
    }
}

/// The state machine that turns a stream of decoded lines into [`Packet`]s.
///
/// A packet is terminated by a blank line, except while a
/// `Response: Follows` block is open, in which case lines accumulate into
/// `output` verbatim until a `--END COMMAND--` sentinel line is seen — a
/// blank line inside that block does not terminate the packet.
#[derive(Debug, Default)]
pub struct PacketAssembler {
    current: Packet,
    collecting_output: bool,
    output_lines: Vec<String>,
    saw_banner: bool,
}

const END_COMMAND_SENTINEL: &str = "--END COMMAND--";

impl PacketAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test-only helper for suites that want to feed a bare header/event
    /// frame without first supplying the identification banner line.
    #[cfg(test)]
    pub(crate) fn mark_banner_seen_for_test(&mut self) {
        self.saw_banner = true;
    }

    /// Feeds one decoded line in. Returns `Some(Packet)` when a complete
    /// packet has just been terminated, `None` if the packet is still
    /// accumulating.
    ///
    /// The very first line off a freshly connected socket is Asterisk's
    /// identification banner (e.g. `Asterisk Call Manager/8.5.0`), not a
    /// header; it is consumed and surfaced as a one-off `Packet` with a
    /// single synthetic `"banner"` field so callers can still observe it.
    pub fn feed(&mut self, line: &str) -> Option<Packet> {
        if !self.saw_banner {
            self.saw_banner = true;
            let mut banner = Packet::new();
            banner.push("banner", line.to_string());
            return Some(banner);
        }

        if self.collecting_output {
            if line.trim_end() == END_COMMAND_SENTINEL {
                self.current.output = Some(self.output_lines.join("\n"));
                self.output_lines.clear();
                self.collecting_output = false;
                if line.is_empty() {
                    return self.finish();
                }
                return None;
            }
            self.output_lines.push(line.to_string());
            return None;
        }

        if line.is_empty() {
            return self.finish();
        }

        match split_header(line) {
            Some((key, value)) => {
                if key.eq_ignore_ascii_case("Response") && value.eq_ignore_ascii_case("Follows") {
                    self.collecting_output = true;
                }
                self.current.push(key, value);
            }
            None => {
                tracing::warn!(line, "malformed header line (no ':'), dropping");
            }
        }
        None
    }

    fn finish(&mut self) -> Option<Packet> {
        if self.current.is_empty() && self.current.output.is_none() {
            return None;
        }
        Some(std::mem::take(&mut self.current))
    }
}

fn split_header(line: &str) -> Option<(&str, &str)> {
    let idx = line.find(':')?;
    let key = line[..idx].trim();
    let value = line[idx + 1..].trim_start();
    if key.is_empty() {
        return None;
    }
    Some((key, value))
}

/// Convenience wrapper combining [`LineDecoder`] and [`PacketAssembler`]
/// into a single `tokio_util::codec::Decoder<Item = Packet>`.
#[derive(Debug, Default)]
pub struct PacketDecoder {
    lines: LineDecoder,
    assembler: PacketAssembler,
}

impl PacketDecoder {
    pub fn new(encoding: SocketEncoding) -> Self {
        Self {
            lines: LineDecoder::new(encoding),
            assembler: PacketAssembler::new(),
        }
    }
}

impl Decoder for PacketDecoder {
    type Item = Packet;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, Self::Error> {
        while let Some(line) = self.lines.decode(src)? {
            if let Some(packet) = self.assembler.feed(&line) {
                return Ok(Some(packet));
            }
        }
        // Nudge the buffer capacity so a single huge `--END COMMAND--`
        // block doesn't force repeated small reallocations.
        if src.capacity() - src.len() < 64 {
            src.reserve(4096);
        }
        Ok(None)
    }
}
