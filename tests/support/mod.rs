//! Shared loopback fake-AMI-server plumbing for the integration suites in
//! this directory, in the same spirit as `rt-test-utils`'s mock WebSocket
//! server: bind to a random port, hand the caller the raw socket halves,
//! and let each test drive the scripted protocol exchange itself.

use std::collections::HashMap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

/// Binds a listener on a random loopback port and returns it along with the
/// `host:port` string a [`ami_client::ConnectionParameters`] should target.
pub async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("binding fake AMI listener");
    let addr = listener.local_addr().expect("listener has a local addr");
    (listener, addr.ip().to_string())
}

pub async fn port_of(listener: &TcpListener) -> u16 {
    listener.local_addr().unwrap().port()
}

/// Accepts the next client connection and immediately sends the AMI
/// identification banner line real Asterisk servers open with.
pub async fn accept_and_greet(listener: &TcpListener) -> (BufReader<OwnedReadHalf>, OwnedWriteHalf) {
    let (stream, _peer) = listener.accept().await.expect("accepting fake client connection");
    let (read_half, mut write_half) = stream.into_split();
    write_half
        .write_all(b"Asterisk Call Manager/2.10.5\r\n")
        .await
        .expect("writing identification banner");
    (BufReader::new(read_half), write_half)
}

/// Reads one `Key: Value` action frame up to (and consuming) its
/// terminating blank line. Returns the headers, lower-cased by key.
pub async fn read_action_frame(reader: &mut BufReader<OwnedReadHalf>) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await.expect("reading a line from the test client");
        if n == 0 {
            return headers; // client closed its write half
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return headers;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_ascii_lowercase(), v.trim().to_owned());
        }
    }
}

/// Writes a complete `Response:`/`Event:` frame: each `(key, value)` header
/// as its own CRLF line, then the blank-line terminator.
pub async fn write_frame(writer: &mut OwnedWriteHalf, headers: &[(&str, &str)]) {
    let mut out = String::new();
    for (k, v) in headers {
        out.push_str(k);
        out.push_str(": ");
        out.push_str(v);
        out.push_str("\r\n");
    }
    out.push_str("\r\n");
    writer.write_all(out.as_bytes()).await.expect("writing a response/event frame");
}

/// Writes a `Response: Follows` command-output block.
pub async fn write_follows(writer: &mut OwnedWriteHalf, action_id: &str, output_lines: &[&str]) {
    let mut out = String::new();
    out.push_str("Response: Follows\r\n");
    out.push_str("ActionID: ");
    out.push_str(action_id);
    out.push_str("\r\n");
    out.push_str("Privilege: Command\r\n");
    for line in output_lines {
        out.push_str(line);
        out.push_str("\r\n");
    }
    out.push_str("--END COMMAND--\r\n\r\n");
    writer.write_all(out.as_bytes()).await.expect("writing a Follows block");
}

/// Convenience: connects a bare `TcpStream` to the fake server's address,
/// only used by tests that want to poke the wire directly rather than go
/// through [`ami_client::Connection`].
#[allow(dead_code)]
pub async fn dial(host: &str, port: u16) -> TcpStream {
    TcpStream::connect((host, port)).await.expect("dialing fake AMI server")
}
