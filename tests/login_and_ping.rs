//! Scenario 1 from the spec's testable-properties list: plaintext login
//! succeeds, and once the connection has been idle for `PingInterval` the
//! liveness monitor transmits its own `Ping` and the exchange completes
//! without the caller doing anything else.
//!
//! Uses a short real `PingInterval` rather than `tokio::time::pause`, since
//! the fake server drives genuine socket IO that the paused time driver
//! does not control.

mod support;

use std::time::Duration;

use ami_client::{Connection, ConnectionParameters};

#[tokio::test]
async fn plaintext_login_then_idle_ping() {
    let (listener, host) = support::bind().await;
    let port = support::port_of(&listener).await;

    let server = tokio::spawn(async move {
        let (mut reader, mut writer) = support::accept_and_greet(&listener).await;

        let login = support::read_action_frame(&mut reader).await;
        assert_eq!(login.get("action").map(String::as_str), Some("Login"));
        assert_eq!(login.get("username").map(String::as_str), Some("admin"));
        assert_eq!(login.get("secret").map(String::as_str), Some("s3cr3t"));
        let login_action_id = login.get("actionid").expect("login carries an ActionID").clone();
        support::write_frame(
            &mut writer,
            &[("Response", "Success"), ("Message", "Authentication accepted"), ("ActionID", &login_action_id)],
        )
        .await;

        let version_cmd = support::read_action_frame(&mut reader).await;
        assert_eq!(version_cmd.get("action").map(String::as_str), Some("Command"));
        let version_action_id = version_cmd.get("actionid").expect("command carries an ActionID").clone();
        support::write_follows(&mut writer, &version_action_id, &["Asterisk 18.9.0"]).await;

        let ping = support::read_action_frame(&mut reader).await;
        assert_eq!(ping.get("action").map(String::as_str), Some("Ping"));
        let ping_action_id = ping.get("actionid").expect("ping carries an ActionID").clone();
        support::write_frame(&mut writer, &[("Response", "Success"), ("Ping", "Pong"), ("ActionID", &ping_action_id)])
            .await;
    });

    let params = ConnectionParameters {
        host,
        port,
        username: "admin".to_owned(),
        secret: "s3cr3t".to_owned(),
        use_md5_auth: false,
        connect_timeout: Duration::from_secs(2),
        ping_interval: Duration::from_millis(80),
        ..ConnectionParameters::default()
    };
    let conn = Connection::new(params);
    conn.login().await.expect("login should succeed against the fake server");

    tokio::time::timeout(Duration::from_secs(5), server).await.expect("server task timed out").unwrap();

    conn.dispose().await;
}
