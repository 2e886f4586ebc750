//! TerminalClient struct and public API.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use super::io::{TerminalLink, decode_reply};
use super::parser::decode;
use super::protocol::encode;
use super::types::{Generation, ProtocolProfile};
use crate::config::TerminalConfig;
use crate::error::Result;
use crate::models::{
    ClosePeriodRequest, OpenPeriodRequest, OperationResult, PurchaseRequest, PurchaseResult, RefundRequest,
    TerminalRequest,
};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(120);

/// Payment terminal client.
///
/// Every operation opens its own connection, sends the command, reads the
/// reply, then sends the idle command on a second connection so the terminal
/// is ready for the next operation. No state is kept between calls.
pub struct TerminalClient {
    profile: &'static ProtocolProfile,
    link: TerminalLink,
    use_supervisor_card: bool,
    print_period_receipt_on_pos: bool,
}

impl TerminalClient {
    /// Create a client for the terminal at `host:port`.
    pub fn new(host: &str, port: u16, generation: Generation) -> Self {
        let profile = generation.profile();
        Self {
            profile,
            link: TerminalLink::new(
                format!("{host}:{port}"),
                DEFAULT_CONNECT_TIMEOUT,
                DEFAULT_READ_TIMEOUT,
                profile.buffer_size,
            ),
            use_supervisor_card: false,
            print_period_receipt_on_pos: false,
        }
    }

    /// Create a client from the `[terminal]` config section.
    pub fn from_config(config: &TerminalConfig) -> Self {
        Self::new(&config.host, config.port, config.generation)
            .with_timeouts(
                Duration::from_secs(config.connect_timeout_secs),
                Duration::from_secs(config.read_timeout_secs),
            )
            .with_period_options(config.use_supervisor_card, config.print_receipt_on_pos)
    }

    /// Override the connect and read deadlines.
    pub fn with_timeouts(mut self, connect_timeout: Duration, read_timeout: Duration) -> Self {
        self.link.set_timeouts(connect_timeout, read_timeout);
        self
    }

    /// Options sent with period open and close commands.
    pub fn with_period_options(mut self, use_supervisor_card: bool, print_receipt_on_pos: bool) -> Self {
        self.use_supervisor_card = use_supervisor_card;
        self.print_period_receipt_on_pos = print_receipt_on_pos;
        self
    }

    /// Register a callback that receives every command sent to the terminal.
    pub fn with_observer(mut self, observer: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.link.set_observer(Arc::new(observer));
        self
    }

    pub fn generation(&self) -> Generation {
        self.profile.generation
    }

    /// Query whether the terminal is initialised.
    pub fn terminal_status(&self) -> Result<OperationResult> {
        self.execute(&TerminalRequest::Status)
    }

    /// Open the accounting period.
    pub fn open_period(&self) -> Result<OperationResult> {
        self.execute(&TerminalRequest::OpenPeriod(OpenPeriodRequest {
            print_receipt_on_pos: self.print_period_receipt_on_pos,
        }))
    }

    /// Close the accounting period. Only the legacy command carries `transaction_id`.
    pub fn close_period(&self, transaction_id: &str) -> Result<OperationResult> {
        self.execute(&TerminalRequest::ClosePeriod(ClosePeriodRequest {
            transaction_id: transaction_id.to_string(),
            use_supervisor_card: self.use_supervisor_card,
            print_receipt_on_pos: self.print_period_receipt_on_pos,
        }))
    }

    /// Charge `amount` (minor units) under `transaction_id`.
    pub fn purchase(&self, transaction_id: &str, amount: &str, print_receipt_on_pos: bool) -> Result<OperationResult> {
        self.execute(&TerminalRequest::Purchase(PurchaseRequest {
            transaction_id: transaction_id.to_string(),
            amount: amount.to_string(),
            print_receipt_on_pos,
        }))
    }

    /// Refund a previously successful purchase.
    pub fn refund(&self, purchase: &PurchaseResult, print_receipt_on_pos: bool) -> Result<OperationResult> {
        self.execute(&TerminalRequest::Refund(RefundRequest::for_purchase(
            purchase,
            print_receipt_on_pos,
        )))
    }

    /// Decode a purchase reply captured elsewhere, without contacting the terminal.
    pub fn parse_purchase_response(&self, print_receipt_on_pos: bool, message: &str) -> OperationResult {
        let request = TerminalRequest::Purchase(PurchaseRequest {
            transaction_id: String::new(),
            amount: String::new(),
            print_receipt_on_pos,
        });
        decode(self.profile, &request, message)
    }

    /// Send one request, return the terminal to idle and decode the reply.
    pub fn execute(&self, request: &TerminalRequest) -> Result<OperationResult> {
        let command = encode(self.profile, request)?;
        info!("Sending {} to terminal {}", request.name(), self.link.addr());

        let reply = self.link.exchange(&command);
        if !matches!(request, TerminalRequest::Idle) {
            self.return_to_idle();
        }

        let reply = reply.inspect_err(|e| error!("{} failed: {e}", request.name()))?;
        let message = decode_reply(&reply);
        let result = decode(self.profile, request, &message);

        info!(
            "{} finished: success={}, status={:?}",
            request.name(),
            result.success,
            result.status_code
        );
        Ok(result)
    }

    /// Send the idle command. Failures are logged and otherwise ignored.
    fn return_to_idle(&self) {
        let outcome = encode(self.profile, &TerminalRequest::Idle).and_then(|command| self.link.exchange(&command));
        if let Err(e) = outcome {
            warn!("Idle command failed on {}: {e}", self.link.addr());
        }
    }
}
