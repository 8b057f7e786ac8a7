use core::time::Duration;
use std::{
    io::{BufRead, BufReader, Read, Write},
    net::TcpListener,
    thread::{self, JoinHandle},
};

use consul_uid::{
    AgentClient, DeleteOptions, KvStore, ReadOptions, SessionClient, SessionId, SessionSpec,
    WriteOptions,
};

use super::*;

const SESSION: &str = "adf4238a-882b-9ddc-4a9d-5b6758e4159e";

const SESSION_CREATED: &str = r#"{"ID":"adf4238a-882b-9ddc-4a9d-5b6758e4159e"}"#;

const COUNTER_ENTRY: &str = concat!(
    r#"[{"Key":".extensions/uid/svc/.available.uid","Value":"NDI=","Flags":0,"#,
    r#""CreateIndex":5,"ModifyIndex":9,"LockIndex":0}]"#
);

const AGENT_SELF: &str = concat!(
    r#"{"Config":{"NodeName":"node-a","Datacenter":"dc2"},"#,
    r#""Member":{"Name":"node-a","Addr":"10.0.0.4","Port":8301,"Tags":{},"Status":1}}"#
);

/// Answers a single request with a canned response and hands back the raw
/// request (head and body) for inspection.
fn serve_once(status: &'static str, body: &'static str) -> (u16, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream);

        let mut request = String::new();
        let mut content_length = 0;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                content_length = value.trim().parse().unwrap();
            }
            let end_of_head = line == "\r\n";
            request.push_str(&line);
            if end_of_head {
                break;
            }
        }
        let mut payload = vec![0; content_length];
        reader.read_exact(&mut payload).unwrap();
        request.push_str(&String::from_utf8_lossy(&payload));

        let head = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n",
            body.len()
        );
        let mut stream = reader.into_inner();
        write!(stream, "{head}Connection: close\r\n\r\n{body}").unwrap();
        request
    });

    (port, handle)
}

fn client(port: u16) -> ConsulClient {
    ConsulClient::new(
        ClientConfig::default()
            .with_port(port)
            .with_datacenter("dc2")
            .with_token("t0ken")
            .with_timeout(Duration::from_secs(5)),
    )
    .unwrap()
}

fn request_line(request: &str) -> &str {
    request.lines().next().unwrap_or_default()
}

#[test]
fn kv_urls_strip_outer_slashes() {
    let client = client(8500);
    let url = client.kv_url("/.extensions/uid/svc/cat/").unwrap();
    assert_eq!(
        url.as_str(),
        "http://127.0.0.1:8500/v1/kv/.extensions/uid/svc/cat"
    );
    let url = client.endpoint(["session", "renew", "abc"]).unwrap();
    assert_eq!(url.path(), "/v1/session/renew/abc");
}

#[test]
fn missing_key_reads_as_none() {
    let (port, server) = serve_once("404 Not Found", "");
    let kv = client(port)
        .get(".extensions/uid/svc/cat", &ReadOptions::consistent())
        .unwrap();
    assert_eq!(kv, None);

    let request = server.join().unwrap();
    let line = request_line(&request);
    assert!(line.starts_with("GET /v1/kv/.extensions/uid/svc/cat?"), "{line}");
    assert!(line.contains("dc=dc2"), "{line}");
    assert!(line.contains("consistent"), "{line}");
    assert!(
        request.to_ascii_lowercase().contains("x-consul-token: t0ken"),
        "{request}"
    );
}

#[test]
fn present_key_is_decoded() {
    let (port, server) = serve_once("200 OK", COUNTER_ENTRY);
    let kv = client(port)
        .get(".extensions/uid/svc/.available.uid", &ReadOptions::default())
        .unwrap()
        .unwrap();
    server.join().unwrap();

    assert_eq!(kv.as_u64(), Some(42));
    assert_eq!(kv.modify_index, 9);
}

#[test]
fn blocking_read_sends_index_and_wait() {
    let (port, server) = serve_once("404 Not Found", "");
    client(port)
        .get("k", &ReadOptions::blocking(17, Duration::from_secs(5)))
        .unwrap();

    let request = server.join().unwrap();
    let line = request_line(&request);
    assert!(line.contains("index=17"), "{line}");
    assert!(line.contains("wait=5s"), "{line}");
}

#[test]
fn acquire_sends_session_and_raw_value() {
    let (port, server) = serve_once("200 OK", "true");
    let outcome = client(port)
        .put(
            ".extensions/uid/svc/.available.lock",
            b"cat",
            &WriteOptions::acquire(&SessionId::from("sess-1")),
        )
        .unwrap();
    assert!(outcome.success);

    let request = server.join().unwrap();
    let line = request_line(&request);
    assert!(
        line.starts_with("PUT /v1/kv/.extensions/uid/svc/.available.lock?"),
        "{line}"
    );
    assert!(line.contains("acquire=sess-1"), "{line}");
    assert!(request.ends_with("\r\n\r\ncat"), "{request}");
}

#[test]
fn refused_write_is_a_rejection() {
    let (port, server) = serve_once("200 OK", "false");
    let outcome = client(port).put("k", b"1", &WriteOptions::cas(0)).unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.body, "false");

    let request = server.join().unwrap();
    assert!(request_line(&request).contains("cas=0"));
}

#[test]
fn server_error_on_write_is_a_rejection() {
    let (port, server) = serve_once("500 Internal Server Error", "invalid session \"x\"");
    let outcome = client(port)
        .put("k", b"1", &WriteOptions::acquire(&SessionId::from("x")))
        .unwrap();
    server.join().unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.body, "invalid session \"x\"");
}

#[test]
fn denied_write_is_an_error() {
    let (port, server) = serve_once("403 Forbidden", "Permission denied");
    let err = client(port)
        .put("k", b"1", &WriteOptions::default())
        .unwrap_err();
    server.join().unwrap();

    assert!(err.message().contains("403"), "{err}");
}

#[test]
fn recursive_delete() {
    let (port, server) = serve_once("200 OK", "true");
    let deleted = client(port)
        .delete(
            ".extensions/uid/svc",
            &DeleteOptions {
                recurse: true,
                cas: None,
            },
        )
        .unwrap();
    assert!(deleted);

    let request = server.join().unwrap();
    let line = request_line(&request);
    assert!(line.starts_with("DELETE /v1/kv/.extensions/uid/svc?"), "{line}");
    assert!(line.contains("recurse"), "{line}");
}

#[test]
fn session_create_posts_the_session_body() {
    let (port, server) = serve_once("200 OK", SESSION_CREATED);
    let id = client(port)
        .create(&SessionSpec::new(".extensions/uid/svc/cat"))
        .unwrap();
    assert_eq!(id, Some(SessionId::from(SESSION)));

    let request = server.join().unwrap();
    assert!(request_line(&request).starts_with("PUT /v1/session/create?dc=dc2"));
    assert!(request.contains(r#""LockDelay":"15s""#), "{request}");
    assert!(request.contains(r#""TTL":"30s""#), "{request}");
    assert!(request.contains(r#""Behavior":"release""#), "{request}");
}

#[test]
fn refused_session_is_none() {
    let (port, server) = serve_once("500 Internal Server Error", "Missing node registration");
    let id = client(port).create(&SessionSpec::new("s")).unwrap();
    server.join().unwrap();
    assert_eq!(id, None);
}

#[test]
fn renewing_an_unknown_session_is_false() {
    let (port, server) = serve_once("404 Not Found", "Session id 'x' not found");
    let renewed = client(port).renew(&SessionId::from("x")).unwrap();
    server.join().unwrap();
    assert!(!renewed);
}

#[test]
fn destroy_reads_the_body() {
    let (port, server) = serve_once("200 OK", "true");
    assert!(client(port).destroy(&SessionId::from("x")).unwrap());
    let request = server.join().unwrap();
    assert!(request_line(&request).starts_with("PUT /v1/session/destroy/x"));
}

#[test]
fn unknown_session_info_is_none() {
    let (port, server) = serve_once("200 OK", "null");
    let info = client(port).info(&SessionId::from("x")).unwrap();
    server.join().unwrap();
    assert_eq!(info, None);
}

#[test]
fn agent_self_describes_the_member() {
    let (port, server) = serve_once("200 OK", AGENT_SELF);
    let agent = client(port).describe_agent().unwrap().unwrap();
    let request = server.join().unwrap();

    assert_eq!(agent.member.name, "node-a");
    assert_eq!(request_line(&request), "GET /v1/agent/self HTTP/1.1");
}

#[test]
fn reachability_checks_the_banner() {
    let (port, server) = serve_once("200 OK", "Consul Agent");
    assert!(client(port).is_reachable());
    server.join().unwrap();
}

#[test]
fn closed_port_is_a_transport_error() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let client = client(port);

    assert!(!client.is_reachable());
    let err = client.get("k", &ReadOptions::default()).unwrap_err();
    assert!(err.message().starts_with("GET /v1/kv/k"), "{err}");

    let err = consul_uid::Error::from(err);
    assert!(matches!(err, consul_uid::Error::CoordinationUnavailable { .. }));
}

#[test]
fn malformed_response_is_a_transport_error() {
    let (port, server) = serve_once("200 OK", "<html>not json</html>");
    let err = client(port).get("k", &ReadOptions::default()).unwrap_err();
    server.join().unwrap();
    assert!(err.message().contains("malformed response"), "{err}");
}

#[test]
fn invalid_token_is_rejected_up_front() {
    assert!(matches!(
        ConsulClient::new(ClientConfig::default().with_token("line\nbreak")),
        Err(ClientError::InvalidToken)
    ));
}
