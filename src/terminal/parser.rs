//! Reply decoding: status, success, receipt and failure cause.
//!
//! Every field is read from a fixed offset. Offsets beyond the end of the
//! reply leave the field absent instead of failing the call.

use chrono::NaiveDateTime;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

use super::receipt::{extract_embedded_receipt, format_receipt};
use super::status::{StatusCode, UNKNOWN_PROCESSING_ERROR, describe_negative_response};
use super::types::{
    FailureMessage, NEGATIVE_RESPONSE_LEN, NEGATIVE_RESPONSE_OFFSET, POS_IDENTIFICATION_OFFSET, ProtocolProfile,
    STATUS_LEN, STATUS_OFFSET, SuccessRule,
};
use crate::models::{OperationResult, Payload, PurchaseRequest, PurchaseResult, RefundRequest, TerminalRequest, TerminalStatusInfo};

const ECR_DATE_TIME_FORMAT: &str = "%y-%m-%d %H:%M:%S";
const POS_DATE_TIME_FORMAT: &str = "%Y%m%d %H%M%S";

lazy_static! {
    /// Terminal id, date and time as printed on an ECR receipt.
    static ref ECR_IDENT: Regex =
        Regex::new(r"Ident\. TPA:\s*(\d+)\s*(\d{2}-\d{2}-\d{2})\s*(\d{2}:\d{2}:\d{2})").unwrap();
    /// Terminal id following a field separator or backspace control byte.
    static ref POS_TERMINAL_ID: Regex = Regex::new(r"[\x1c\x08](\d{8})").unwrap();
    static ref POS_DATE: Regex = Regex::new(r"(\d{8})").unwrap();
    static ref POS_TIME: Regex = Regex::new(r"(\d{6})").unwrap();
}

/// Bounds-checked substring.
fn field(message: &str, offset: usize, len: usize) -> Option<&str> {
    message.get(offset..offset.checked_add(len)?)
}

/// Status field of a reply. Anything unreadable is [`StatusCode::Error`].
pub(crate) fn read_status(message: &str) -> StatusCode {
    field(message, STATUS_OFFSET, STATUS_LEN).map_or(StatusCode::Error, StatusCode::from_hex)
}

fn is_success(rule: SuccessRule, message: &str, status: StatusCode) -> bool {
    match rule {
        SuccessRule::StatusOk => status.is_ok(),
        SuccessRule::Equals { offset, literal } => field(message, offset, literal.len()) == Some(literal),
        SuccessRule::StartsWith { offset, literal } => message.get(offset..).is_some_and(|rest| rest.starts_with(literal)),
    }
}

/// Status reported alongside the success flag; OK only when the reply succeeded.
fn reported_status(success: bool, status: StatusCode) -> StatusCode {
    match (success, status.is_ok()) {
        (true, _) => StatusCode::OkCommand,
        (false, true) => StatusCode::Error,
        (false, false) => status,
    }
}

/// Decode the reply to `request`.
pub fn decode(profile: &ProtocolProfile, request: &TerminalRequest, message: &str) -> OperationResult {
    match request {
        TerminalRequest::Status => decode_terminal_status(profile, message),
        TerminalRequest::OpenPeriod(_) | TerminalRequest::ClosePeriod(_) | TerminalRequest::Idle => decode_period(message),
        TerminalRequest::Purchase(r) => decode_purchase(profile, r, message),
        TerminalRequest::Refund(r) => decode_refund(profile, r, message),
    }
}

fn decode_terminal_status(profile: &ProtocolProfile, message: &str) -> OperationResult {
    let success = is_success(profile.terminal_status_success, message, read_status(message));
    if !success {
        return OperationResult::new(false, StatusCode::Error, message, Payload::Empty);
    }

    let pos_identification = message
        .get(POS_IDENTIFICATION_OFFSET..)
        .unwrap_or_default()
        .trim_matches(|c: char| c.is_whitespace() || c.is_control())
        .to_string();

    OperationResult::new(
        true,
        StatusCode::OkCommand,
        message,
        Payload::TerminalStatus(TerminalStatusInfo { pos_identification }),
    )
}

fn decode_period(message: &str) -> OperationResult {
    let status = read_status(message);
    OperationResult::new(status.is_ok(), status, message, Payload::Empty)
}

fn decode_purchase(profile: &ProtocolProfile, request: &PurchaseRequest, message: &str) -> OperationResult {
    let parsed = read_status(message);
    let success = is_success(profile.purchase_success, message, parsed);
    let status = reported_status(success, parsed);

    if !success {
        return OperationResult::new(false, status, failure_message(profile, parsed, message), Payload::Empty);
    }

    let mut result = PurchaseResult {
        transaction_id: request.transaction_id.clone(),
        amount: request.amount.clone(),
        ..Default::default()
    };
    decode_receipt_details(profile, message, request.print_receipt_on_pos, &mut result);

    OperationResult::new(true, status, message, Payload::Purchase(result))
}

fn decode_refund(profile: &ProtocolProfile, request: &RefundRequest, message: &str) -> OperationResult {
    let parsed = read_status(message);
    let success = is_success(profile.refund_success, message, parsed);
    let status = reported_status(success, parsed);

    if !success {
        return OperationResult::new(false, status, failure_message(profile, parsed, message), Payload::Empty);
    }

    // Fields missing from the refund reply keep the original purchase's values
    let mut result = PurchaseResult {
        transaction_id: request.transaction_id.clone(),
        amount: request.amount.clone(),
        original_pos_identification: request.original_pos_identification.clone(),
        original_receipt_time: request.original_receipt_time,
        receipt_data: None,
    };
    decode_receipt_details(profile, message, request.print_receipt_on_pos, &mut result);

    OperationResult::new(true, status, message, Payload::Purchase(result))
}

/// Fill terminal id, receipt timestamp and receipt text from a successful reply.
fn decode_receipt_details(profile: &ProtocolProfile, message: &str, print_receipt_on_pos: bool, result: &mut PurchaseResult) {
    let embedded = profile
        .embedded_receipt
        .and_then(|layout| extract_embedded_receipt(message, layout));

    let ident = if print_receipt_on_pos {
        find_pos_receipt_ident(message)
    } else {
        find_ecr_receipt_ident(message).or_else(|| {
            embedded
                .as_ref()
                .and_then(|r| find_ecr_receipt_ident(&r.merchant_copy).or_else(|| find_ecr_receipt_ident(&r.client_copy)))
        })
    };
    if let Some((pos_identification, time)) = ident {
        result.original_pos_identification = pos_identification;
        if time.is_some() {
            result.original_receipt_time = time;
        }
    }

    result.receipt_data = if print_receipt_on_pos {
        embedded
    } else {
        embedded.or_else(|| {
            message
                .get(profile.ecr_receipt_offset..)
                .filter(|text| !text.trim().is_empty())
                .map(format_receipt)
        })
    };

    if result.receipt_data.is_none() {
        debug!("No receipt text in {} byte reply", message.len());
    }
}

/// `Ident. TPA: <id> <yy-mm-dd> <hh:mm:ss>` on a receipt printed by the ECR.
fn find_ecr_receipt_ident(text: &str) -> Option<(String, Option<NaiveDateTime>)> {
    let captures = ECR_IDENT.captures(text)?;
    let stamp = format!("{} {}", &captures[2], &captures[3]);
    let time = NaiveDateTime::parse_from_str(&stamp, ECR_DATE_TIME_FORMAT)
        .inspect_err(|e| warn!("Invalid receipt timestamp '{stamp}': {e}"))
        .ok();
    Some((captures[1].to_string(), time))
}

/// Control byte + 8-digit terminal id, then 8-digit date and 6-digit time, on a POS-printed receipt.
fn find_pos_receipt_ident(message: &str) -> Option<(String, Option<NaiveDateTime>)> {
    let id = POS_TERMINAL_ID.captures(message)?;
    let pos_identification = id[1].to_string();

    let rest = &message[id.get(0)?.end()..];
    let time = POS_DATE.captures(rest).and_then(|date| {
        let after_date = &rest[date.get(0)?.end()..];
        let time = POS_TIME.captures(after_date)?;
        let stamp = format!("{} {}", &date[1], &time[1]);
        NaiveDateTime::parse_from_str(&stamp, POS_DATE_TIME_FORMAT)
            .inspect_err(|e| warn!("Invalid receipt timestamp '{stamp}': {e}"))
            .ok()
    });

    Some((pos_identification, time))
}

/// Human-readable cause of a failed purchase or refund.
fn failure_message(profile: &ProtocolProfile, status: StatusCode, message: &str) -> String {
    if profile.failure_message == FailureMessage::StatusThenNegativeResponse
        && status != StatusCode::Error
        && !status.is_ok()
    {
        return status.description().to_string();
    }

    field(message, NEGATIVE_RESPONSE_OFFSET, NEGATIVE_RESPONSE_LEN)
        .map_or(UNKNOWN_PROCESSING_ERROR, describe_negative_response)
        .to_string()
}
