//! Decoded terminal replies.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::terminal::StatusCode;

/// Receipt text recovered from a reply, split into its two copies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptData {
    pub merchant_copy: String,
    pub client_copy: String,
}

/// Outcome of a successful purchase or refund.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PurchaseResult {
    pub transaction_id: String,
    pub amount: String,
    /// Terminal identification printed on the receipt.
    pub original_pos_identification: String,
    /// Date and time printed on the receipt (terminal local time).
    pub original_receipt_time: Option<NaiveDateTime>,
    pub receipt_data: Option<ReceiptData>,
}

/// Terminal status details.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TerminalStatusInfo {
    pub pos_identification: String,
}

/// Operation-specific payload of a result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Payload {
    #[default]
    Empty,
    TerminalStatus(TerminalStatusInfo),
    Purchase(PurchaseResult),
}

/// Uniform result of every terminal operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    pub status_code: StatusCode,
    pub status_description: String,
    /// Raw reply on success, failure cause otherwise.
    pub message: String,
    pub payload: Payload,
}

impl OperationResult {
    pub fn new(success: bool, status_code: StatusCode, message: impl Into<String>, payload: Payload) -> Self {
        Self {
            success,
            status_code,
            status_description: status_code.description().to_string(),
            message: message.into(),
            payload,
        }
    }

    /// Purchase payload, present only on successful purchases and refunds.
    pub fn purchase(&self) -> Option<&PurchaseResult> {
        match &self.payload {
            Payload::Purchase(p) => Some(p),
            _ => None,
        }
    }

    /// Terminal status payload, present only on a successful status query.
    pub fn terminal_status(&self) -> Option<&TerminalStatusInfo> {
        match &self.payload {
            Payload::TerminalStatus(s) => Some(s),
            _ => None,
        }
    }
}
