//! Scenario tests for TerminalClient against a loop-back fake terminal.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use chrono::NaiveDate;

use super::client::TerminalClient;
use super::protocol::{length_frame, to_hex_pairs};
use super::status::StatusCode;
use super::types::{CURRENT, Generation, LEGACY, PURCHASE_TAGS};
use crate::error::AppError;
use crate::models::PurchaseResult;

/// What the fake terminal does with one connection.
enum Reply {
    Send(Vec<u8>),
    /// Close without answering.
    Close,
    /// Hold the connection open without answering.
    Stall(Duration),
}

struct FakeTerminal {
    port: u16,
    received: Arc<Mutex<Vec<Vec<u8>>>>,
    handle: JoinHandle<()>,
}

impl FakeTerminal {
    /// Serve one connection per reply, in order, recording what each connection sent.
    fn start(replies: Vec<Reply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let received = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&received);

        let handle = thread::spawn(move || {
            for reply in replies {
                let Ok((mut stream, _)) = listener.accept() else { return };
                let _ = stream.set_read_timeout(Some(Duration::from_millis(100)));

                let mut data = Vec::new();
                let mut buf = [0u8; 1024];
                while let Ok(n) = stream.read(&mut buf) {
                    if n == 0 {
                        break;
                    }
                    data.extend_from_slice(&buf[..n]);
                }
                log.lock().unwrap().push(data);

                match reply {
                    Reply::Send(bytes) => {
                        let _ = stream.write_all(&bytes);
                    }
                    Reply::Close => {}
                    Reply::Stall(duration) => thread::sleep(duration),
                }
            }
        });

        Self { port, received, handle }
    }

    fn client(&self, generation: Generation) -> TerminalClient {
        TerminalClient::new("127.0.0.1", self.port, generation)
            .with_timeouts(Duration::from_secs(2), Duration::from_secs(2))
    }

    /// Wait for the terminal to serve every reply and return what it received.
    fn finish(self) -> Vec<Vec<u8>> {
        self.handle.join().unwrap();
        Arc::try_unwrap(self.received).unwrap().into_inner().unwrap()
    }
}

fn send(text: &str) -> Reply {
    Reply::Send(text.as_bytes().to_vec())
}

/// Untagged current-generation command as written: hex-decoded bytes, then the ASCII text.
fn current_bytes(command: &str) -> Vec<u8> {
    let mut bytes = hex::decode(command).unwrap();
    bytes.extend_from_slice(command.as_bytes());
    bytes
}

fn current_success_reply() -> String {
    let receipt = "CÓPIA COMERCIANTE\nCOMPRA 1,50 €\nIdent. TPA: 87654321 24-03-07 14:05:09\nCÓPIA CLIENTE\nCOMPRA 1,50 €";
    format!(
        "{:0<76}{}\x03A1B",
        "0A004753303610",
        BASE64_STANDARD.encode(receipt.as_bytes())
    )
}

#[test]
fn test_purchase_current_generation() {
    let terminal = FakeTerminal::start(vec![send(&current_success_reply()), send("0A00")]);
    let result = terminal
        .client(Generation::Current)
        .purchase("0001", "00000150", false)
        .unwrap();

    assert!(result.success);
    let purchase = result.purchase().unwrap();
    assert_eq!(purchase.amount, "00000150");
    assert_eq!(purchase.original_pos_identification, "87654321");
    let receipt = purchase.receipt_data.as_ref().unwrap();
    assert!(!receipt.merchant_copy.is_empty());
    assert!(!receipt.client_copy.is_empty());

    let received = terminal.finish();
    assert_eq!(received.len(), 2);

    let purchase_bytes = &received[0];
    let tags = hex::decode(PURCHASE_TAGS).unwrap();
    let payload = &purchase_bytes[2..purchase_bytes.len() - tags.len()];
    let payload = std::str::from_utf8(payload).unwrap();
    assert_eq!(&purchase_bytes[..2], &length_frame(payload).unwrap());
    assert!(payload.contains(&to_hex_pairs("0000000001")));
    assert!(purchase_bytes.ends_with(&tags));

    assert_eq!(received[1], current_bytes(CURRENT.templates.idle));
}

#[test]
fn test_purchase_refused() {
    let refused = format!("{:0<80}", "0A75");
    let terminal = FakeTerminal::start(vec![send(&refused), send("0A00")]);
    let result = terminal
        .client(Generation::Current)
        .purchase("0001", "00000150", false)
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.status_code, StatusCode::SibsRefusedOperation);
    assert_eq!(result.message, "SIBS refused operation");
    assert!(result.purchase().is_none());
    terminal.finish();
}

#[test]
fn test_terminal_status_legacy_generation() {
    let terminal = FakeTerminal::start(vec![send("000000000INIT OK          POS 0042"), send("0A00")]);
    let result = terminal.client(Generation::Legacy).terminal_status().unwrap();

    assert!(result.success);
    assert_eq!(result.terminal_status().unwrap().pos_identification, "POS 0042");

    let received = terminal.finish();
    assert_eq!(received[0], LEGACY.templates.status.as_bytes());
    assert_eq!(received[1], LEGACY.templates.idle.as_bytes());
}

#[test]
fn test_open_and_close_period() {
    let terminal = FakeTerminal::start(vec![send("0A00"), send("0A00"), send("0A77"), send("0A00")]);
    let client = terminal.client(Generation::Current);

    let open = client.open_period().unwrap();
    assert!(open.success);
    let close = client.close_period("").unwrap();
    assert!(!close.success);
    assert_eq!(close.status_code, StatusCode::InvalidPeriod);

    let received = terminal.finish();
    assert_eq!(received[0], current_bytes("070047533034030001"));
    assert_eq!(received[2], current_bytes("0600475330350101"));
}

#[test]
fn test_close_period_legacy_generation() {
    let terminal = FakeTerminal::start(vec![send("0A00"), send("0A00")]);
    let close = terminal.client(Generation::Legacy).close_period("12").unwrap();
    assert!(close.success);

    let received = terminal.finish();
    assert_eq!(received[0], b"S001100012010");
    assert_eq!(received[1], b"S00000");
}

#[test]
fn test_period_options_are_sent() {
    let terminal = FakeTerminal::start(vec![send("0A00"), send("0A00")]);
    let client = terminal
        .client(Generation::Current)
        .with_period_options(true, true);
    assert!(client.close_period("").unwrap().success);

    let received = terminal.finish();
    assert_eq!(received[0], current_bytes("0600475330350002"));
}

#[test]
fn test_refund_sends_original_purchase() {
    let terminal = FakeTerminal::start(vec![send("S00030000DEVOL. EFECTUADA"), send("0A00")]);
    let purchase = PurchaseResult {
        transaction_id: "4321".to_string(),
        amount: "00000150".to_string(),
        original_pos_identification: "12345678".to_string(),
        original_receipt_time: NaiveDate::from_ymd_opt(2024, 3, 7).and_then(|d| d.and_hms_opt(14, 5, 9)),
        receipt_data: None,
    };

    let result = terminal.client(Generation::Legacy).refund(&purchase, false).unwrap();
    assert!(result.success);
    assert_eq!(result.purchase().unwrap().original_pos_identification, "12345678");

    let received = terminal.finish();
    assert_eq!(received[0], b"S00300432101123456782024030714050900000150");
}

#[test]
fn test_legacy_reply_is_cut_to_buffer_size() {
    let reply = format!("{:<300}", "000000000INIT OK          POS 0042");
    let terminal = FakeTerminal::start(vec![send(&reply), send("0A00")]);
    let result = terminal.client(Generation::Legacy).terminal_status().unwrap();
    terminal.finish();

    assert!(result.success);
    assert_eq!(result.message.len(), LEGACY.buffer_size);
    assert_eq!(result.message, reply[..256]);
}

#[test]
fn test_idle_failure_is_ignored() {
    let terminal = FakeTerminal::start(vec![send("0A00"), Reply::Close]);
    let result = terminal.client(Generation::Current).open_period().unwrap();
    assert!(result.success);
    assert_eq!(terminal.finish().len(), 2);
}

#[test]
fn test_empty_reply_is_transport_error() {
    let terminal = FakeTerminal::start(vec![Reply::Close, send("0A00")]);
    let err = terminal.client(Generation::Current).terminal_status().unwrap_err();
    assert!(matches!(err, AppError::TerminalConnectionFailed(_)));

    // Idle is still sent after the failed exchange
    let received = terminal.finish();
    assert_eq!(received.len(), 2);
    assert_eq!(received[1], current_bytes(CURRENT.templates.idle));
}

#[test]
fn test_read_deadline() {
    let terminal = FakeTerminal::start(vec![Reply::Stall(Duration::from_millis(800)), Reply::Close]);
    let client = TerminalClient::new("127.0.0.1", terminal.port, Generation::Current)
        .with_timeouts(Duration::from_secs(1), Duration::from_millis(300));

    let err = client.open_period().unwrap_err();
    assert!(matches!(err, AppError::TerminalTimeout(_)));
    terminal.finish();
}

#[test]
fn test_connection_refused() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let client = TerminalClient::new("127.0.0.1", port, Generation::Legacy);
    let err = client.terminal_status().unwrap_err();
    assert!(matches!(err, AppError::TerminalConnectionFailed(_)));
}

#[test]
fn test_encoding_error_sends_nothing() {
    let terminal = FakeTerminal::start(Vec::new());
    let err = terminal
        .client(Generation::Legacy)
        .purchase("", "150", false)
        .unwrap_err();
    assert!(matches!(err, AppError::Encoding(_)));
    assert!(terminal.finish().is_empty());
}

#[test]
fn test_observer_sees_every_command() {
    let terminal = FakeTerminal::start(vec![send("0A00"), send("0A00")]);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let client = terminal
        .client(Generation::Legacy)
        .with_observer(move |command| sink.lock().unwrap().push(command.to_string()));
    client.open_period().unwrap();
    terminal.finish();

    assert_eq!(*seen.lock().unwrap(), vec!["S0010001".to_string(), "S00000".to_string()]);
}

#[test]
fn test_parse_purchase_response_offline() {
    let client = TerminalClient::new("127.0.0.1", 1, Generation::Current);
    let result = client.parse_purchase_response(false, &current_success_reply());
    assert!(result.success);
    assert_eq!(result.purchase().unwrap().original_pos_identification, "87654321");
}

// Integration tests require a real terminal, mark as ignored
#[test]
#[ignore]
fn test_real_terminal_status() {
    let client = TerminalClient::new("192.168.40.108", 5005, Generation::Current);
    let result = client.terminal_status().expect("Failed to reach terminal");
    println!("{result:?}");
}
