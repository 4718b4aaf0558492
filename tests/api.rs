use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use assert_matches::assert_matches;
use serde_json::json;

use contract_harvest::api::ApiBackend;
use contract_harvest::backend::RetrievalBackend;
use contract_harvest::classify::RawResponse;
use contract_harvest::config::ApiSettings;
use contract_harvest::domain::ContractId;
use contract_harvest::error::HarvestError;

const ID: &str = "BSZptCjvXtnIklDi9AGi3oCV8PHXydNv";

/// Serves exactly one HTTP response and reports the request line it received.
fn one_shot_server(status: &str, body: &str) -> (String, mpsc::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let response = format!(
        "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    );
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut request_line = String::new();
        reader.read_line(&mut request_line).unwrap();
        loop {
            let mut header = String::new();
            if reader.read_line(&mut header).unwrap() == 0 || header == "\r\n" {
                break;
            }
        }
        stream.write_all(response.as_bytes()).unwrap();
        stream.flush().unwrap();
        tx.send(request_line.trim().to_string()).unwrap();
    });
    (format!("http://{addr}/contract"), rx)
}

fn backend(base_url: String) -> ApiBackend {
    ApiBackend::new(&ApiSettings {
        base_url,
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

fn contract() -> ContractId {
    ID.parse().unwrap()
}

#[test]
fn json_body_becomes_record() {
    let (base, requests) = one_shot_server("200 OK", r#"{"id":"x","amount":10}"#);

    let response = backend(base).fetch(&contract()).unwrap();

    assert_matches!(response, RawResponse::Record(value) => {
        assert_eq!(value, json!({ "id": "x", "amount": 10 }));
    });
    assert_eq!(requests.recv().unwrap(), format!("GET /contract/{ID} HTTP/1.1"));
}

#[test]
fn non_success_status_carries_code_and_body() {
    let (base, _requests) = one_shot_server("404 Not Found", "no such contract");

    let err = backend(base).fetch(&contract()).unwrap_err();

    assert_matches!(err, HarvestError::ApiStatus { status: 404, ref message } => {
        assert_eq!(message, "no such contract");
    });
    assert_eq!(err.status(), Some(404));
}

#[test]
fn invalid_json_is_malformed() {
    let (base, _requests) = one_shot_server("200 OK", "<html>maintenance</html>");

    let err = backend(base).fetch(&contract()).unwrap_err();

    assert_matches!(err, HarvestError::Malformed(_));
    assert_eq!(err.status(), None);
}
