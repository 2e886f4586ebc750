//! Command building: template substitution and length framing.

use lazy_static::lazy_static;
use regex::Regex;

use super::types::{
    AMOUNT_WIDTH, FieldEncoding, POS_IDENTIFICATION_WIDTH, ProtocolProfile, RECEIPT_DATE_FORMAT, RECEIPT_TIME_FORMAT,
    TOKEN_AMOUNT, TOKEN_POS_IDENTIFICATION, TOKEN_PRINT_RECEIPT_ON_POS, TOKEN_RECEIPT_DATE, TOKEN_RECEIPT_TIME,
    TOKEN_TRANSACTION_ID, TOKEN_USE_SUPERVISOR_CARD,
};
use crate::error::{AppError, Result};
use crate::models::TerminalRequest;

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"#[A-Za-z]+#").unwrap();
}

/// Bytes to put on the wire for one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireCommand {
    /// Template with every placeholder resolved.
    pub payload: String,
    /// Raw bytes written before the payload: the length frame of a tagged
    /// command, or the hex-decoded payload on profiles with a binary preamble.
    pub preamble: Vec<u8>,
    /// Raw bytes written after the payload.
    pub trailing_tags: Option<Vec<u8>>,
}

impl WireCommand {
    /// Full byte sequence as written by the transport.
    pub fn to_bytes(&self) -> Vec<u8> {
        let tags = self.trailing_tags.as_deref().unwrap_or_default();
        let mut bytes = Vec::with_capacity(self.preamble.len() + self.payload.len() + tags.len());
        bytes.extend_from_slice(&self.preamble);
        bytes.extend_from_slice(self.payload.as_bytes());
        bytes.extend_from_slice(tags);
        bytes
    }
}

/// Substitution rule for one placeholder.
#[derive(Debug, Clone, Copy)]
enum FieldRule {
    /// Numeric text, zero-padded to `width`, then written per the profile's field encoding.
    Digits { name: &'static str, width: usize },
    /// Receipt printing flag: `01` when off, `02` when on.
    ReceiptFlag,
    /// Supervisor card flag, inverted: `1` when off, `0` when on.
    InvertedFlag,
}

enum FieldValue<'a> {
    Text(&'a str),
    Flag(bool),
}

struct Field<'a> {
    token: &'static str,
    rule: FieldRule,
    value: FieldValue<'a>,
}

impl<'a> Field<'a> {
    fn digits(token: &'static str, name: &'static str, width: usize, value: &'a str) -> Self {
        Self {
            token,
            rule: FieldRule::Digits { name, width },
            value: FieldValue::Text(value),
        }
    }

    fn flag(token: &'static str, rule: FieldRule, value: bool) -> Self {
        Self {
            token,
            rule,
            value: FieldValue::Flag(value),
        }
    }
}

/// Build the wire command for a request.
pub fn encode(profile: &ProtocolProfile, request: &TerminalRequest) -> Result<WireCommand> {
    let templates = &profile.templates;
    // Refund date and time are rendered up front so the fields can borrow them.
    let (receipt_date, receipt_time) = match request {
        TerminalRequest::Refund(r) => {
            let time = r
                .original_receipt_time
                .ok_or_else(|| AppError::encoding("original receipt date is required for a refund"))?;
            (
                time.format(RECEIPT_DATE_FORMAT).to_string(),
                time.format(RECEIPT_TIME_FORMAT).to_string(),
            )
        }
        _ => (String::new(), String::new()),
    };

    let (template, fields) = match request {
        TerminalRequest::Idle => (templates.idle, Vec::new()),
        TerminalRequest::Status => (templates.status, Vec::new()),
        TerminalRequest::OpenPeriod(r) => (
            templates.open_period,
            vec![Field::flag(TOKEN_PRINT_RECEIPT_ON_POS, FieldRule::ReceiptFlag, r.print_receipt_on_pos)],
        ),
        TerminalRequest::ClosePeriod(r) => (
            templates.close_period,
            vec![
                Field::digits(
                    TOKEN_TRANSACTION_ID,
                    "transaction id",
                    profile.transaction_id_width,
                    &r.transaction_id,
                ),
                Field::flag(TOKEN_USE_SUPERVISOR_CARD, FieldRule::InvertedFlag, r.use_supervisor_card),
                Field::flag(TOKEN_PRINT_RECEIPT_ON_POS, FieldRule::ReceiptFlag, r.print_receipt_on_pos),
            ],
        ),
        TerminalRequest::Purchase(r) => (
            templates.purchase,
            vec![
                Field::digits(
                    TOKEN_TRANSACTION_ID,
                    "transaction id",
                    profile.transaction_id_width,
                    &r.transaction_id,
                ),
                Field::digits(TOKEN_AMOUNT, "amount", AMOUNT_WIDTH, &r.amount),
                Field::flag(TOKEN_PRINT_RECEIPT_ON_POS, FieldRule::ReceiptFlag, r.print_receipt_on_pos),
            ],
        ),
        TerminalRequest::Refund(r) => (
            templates.refund,
            vec![
                Field::digits(
                    TOKEN_TRANSACTION_ID,
                    "transaction id",
                    profile.transaction_id_width,
                    &r.transaction_id,
                ),
                Field::digits(
                    TOKEN_POS_IDENTIFICATION,
                    "original POS identification",
                    POS_IDENTIFICATION_WIDTH,
                    &r.original_pos_identification,
                ),
                Field::digits(TOKEN_RECEIPT_DATE, "original receipt date", 8, &receipt_date),
                Field::digits(TOKEN_RECEIPT_TIME, "original receipt time", 6, &receipt_time),
                Field::digits(TOKEN_AMOUNT, "amount", AMOUNT_WIDTH, &r.amount),
                Field::flag(TOKEN_PRINT_RECEIPT_ON_POS, FieldRule::ReceiptFlag, r.print_receipt_on_pos),
            ],
        ),
    };

    let payload = render(template, &fields, profile.field_encoding)?;

    let trailing_tags = match (request, profile.purchase_tags) {
        (TerminalRequest::Purchase(_), Some(tags)) => {
            Some(hex::decode(tags).map_err(|e| AppError::encoding(format!("Invalid tag list '{tags}': {e}")))?)
        }
        _ => None,
    };

    let preamble = match (&trailing_tags, profile.binary_preamble) {
        (Some(_), _) => length_frame(&payload)?.to_vec(),
        (None, true) => hex::decode(&payload)
            .map_err(|e| AppError::encoding(format!("Command '{payload}' is not a hex string: {e}")))?,
        (None, false) => Vec::new(),
    };

    Ok(WireCommand {
        payload,
        preamble,
        trailing_tags,
    })
}

/// Substitute every field into the template. Fields the template does not use are skipped.
fn render(template: &str, fields: &[Field<'_>], encoding: FieldEncoding) -> Result<String> {
    let mut command = template.to_string();

    for field in fields {
        if !command.contains(field.token) {
            continue;
        }
        let value = match (field.rule, &field.value) {
            (FieldRule::Digits { name, width }, FieldValue::Text(text)) => encode_digits(name, text, width, encoding)?,
            (FieldRule::ReceiptFlag, FieldValue::Flag(flag)) => format!("{:02}", u8::from(*flag) + 1),
            (FieldRule::InvertedFlag, FieldValue::Flag(flag)) => u8::from(!*flag).to_string(),
            _ => return Err(AppError::encoding(format!("Mismatched value for {}", field.token))),
        };
        command = command.replace(field.token, &value);
    }

    if let Some(token) = PLACEHOLDER.find(&command) {
        return Err(AppError::encoding(format!("Unresolved placeholder {}", token.as_str())));
    }

    Ok(command)
}

/// Zero-pad a numeric field and apply the field encoding.
fn encode_digits(name: &str, value: &str, width: usize, encoding: FieldEncoding) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::encoding(format!("{name} is required")));
    }
    if !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::encoding(format!("{name} must be numeric, got '{value}'")));
    }
    if value.len() > width {
        return Err(AppError::encoding(format!(
            "{name} '{value}' exceeds {width} digits"
        )));
    }

    let padded = format!("{value:0>width$}");
    Ok(match encoding {
        FieldEncoding::Decimal => padded,
        FieldEncoding::Hex => to_hex_pairs(&padded),
    })
}

/// One uppercase hex pair per character, no separators.
pub fn to_hex_pairs(text: &str) -> String {
    hex::encode_upper(text.as_bytes())
}

/// Length prefix for framed commands.
///
/// Each byte of the big-endian payload length goes out as its two decimal
/// digits packed into one byte (length 62 is written as `00 62`), so neither
/// byte may exceed 99.
pub fn length_frame(payload: &str) -> Result<[u8; 2]> {
    let len = u16::try_from(payload.len())
        .map_err(|_| AppError::encoding(format!("Command too long to frame: {} bytes", payload.len())))?;
    let [high, low] = len.to_be_bytes();
    if high > 99 || low > 99 {
        return Err(AppError::encoding(format!(
            "Command length {len} cannot be expressed in the length frame"
        )));
    }
    Ok([pack_decimal(high), pack_decimal(low)])
}

fn pack_decimal(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}
