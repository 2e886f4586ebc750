//! Request and result models for terminal operations.

pub mod request;
pub mod result;

pub use request::{ClosePeriodRequest, OpenPeriodRequest, PurchaseRequest, RefundRequest, TerminalRequest};
pub use result::{OperationResult, Payload, PurchaseResult, ReceiptData, TerminalStatusInfo};
