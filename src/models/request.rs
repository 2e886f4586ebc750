//! Terminal operation requests.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::result::PurchaseResult;

/// Period opening parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenPeriodRequest {
    pub print_receipt_on_pos: bool,
}

/// Period closing parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClosePeriodRequest {
    /// Only carried by the legacy command.
    pub transaction_id: String,
    pub use_supervisor_card: bool,
    pub print_receipt_on_pos: bool,
}

/// Purchase parameters. `amount` is in minor units (cents).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub transaction_id: String,
    pub amount: String,
    pub print_receipt_on_pos: bool,
}

/// Refund parameters, taken from a previously successful purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    pub transaction_id: String,
    pub amount: String,
    pub original_pos_identification: String,
    /// Receipt timestamp of the original purchase; supplies both the date and time fields.
    pub original_receipt_time: Option<NaiveDateTime>,
    pub print_receipt_on_pos: bool,
}

impl RefundRequest {
    /// Build a refund for the given purchase.
    pub fn for_purchase(purchase: &PurchaseResult, print_receipt_on_pos: bool) -> Self {
        Self {
            transaction_id: purchase.transaction_id.clone(),
            amount: purchase.amount.clone(),
            original_pos_identification: purchase.original_pos_identification.clone(),
            original_receipt_time: purchase.original_receipt_time,
            print_receipt_on_pos,
        }
    }
}

/// One terminal operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum TerminalRequest {
    Status,
    OpenPeriod(OpenPeriodRequest),
    ClosePeriod(ClosePeriodRequest),
    Purchase(PurchaseRequest),
    Refund(RefundRequest),
    /// Returns the terminal to its ready state. Sent after every other operation.
    Idle,
}

impl TerminalRequest {
    /// Operation name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Status => "terminal_status",
            Self::OpenPeriod(_) => "open_period",
            Self::ClosePeriod(_) => "close_period",
            Self::Purchase(_) => "purchase",
            Self::Refund(_) => "refund",
            Self::Idle => "idle",
        }
    }
}
