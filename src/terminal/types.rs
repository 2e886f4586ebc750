//! Protocol generations, command templates and reply layout constants.

use serde::{Deserialize, Serialize};

// Template placeholders
pub(crate) const TOKEN_TRANSACTION_ID: &str = "#TRANSACTIONID#";
pub(crate) const TOKEN_AMOUNT: &str = "#AMOUNT#";
pub(crate) const TOKEN_PRINT_RECEIPT_ON_POS: &str = "#PRINTRECEIPTONPOS#";
pub(crate) const TOKEN_USE_SUPERVISOR_CARD: &str = "#USESUPERVISORCARD#";
pub(crate) const TOKEN_POS_IDENTIFICATION: &str = "#POSIDENTIFICATION#";
pub(crate) const TOKEN_RECEIPT_DATE: &str = "#RECEIPTDATE#";
pub(crate) const TOKEN_RECEIPT_TIME: &str = "#RECEIPTTIME#";

/// EMV tag request list appended to purchase commands (9F1C, 9A, 9F21, 9F41).
pub(crate) const PURCHASE_TAGS: &str = "0B9F1C009A009F21009F4100";

// Reply literals
pub(crate) const OK_TERMINAL_STATUS: &str = "INIT OK";
pub(crate) const OK_PURCHASE: &str = "000";
pub(crate) const OK_REFUND: &str = "DEVOL. EFECTUADA";

// Field widths shared by both generations
pub(crate) const AMOUNT_WIDTH: usize = 8;
pub(crate) const POS_IDENTIFICATION_WIDTH: usize = 8;
pub(crate) const RECEIPT_DATE_FORMAT: &str = "%Y%m%d";
pub(crate) const RECEIPT_TIME_FORMAT: &str = "%H%M%S";

// Reply offsets shared by both generations
pub(crate) const STATUS_OFFSET: usize = 2;
pub(crate) const STATUS_LEN: usize = 2;
pub(crate) const NEGATIVE_RESPONSE_OFFSET: usize = 6;
pub(crate) const NEGATIVE_RESPONSE_LEN: usize = 3;
pub(crate) const STATUS_TEXT_OFFSET: usize = 9;
pub(crate) const POS_IDENTIFICATION_OFFSET: usize = 26;

/// Terminal protocol generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Generation {
    /// ASCII commands with literal decimal fields, 256-byte replies.
    Legacy,
    /// Hex-encoded fields, receipts embedded in the reply as base64.
    #[default]
    Current,
}

impl Generation {
    pub fn profile(self) -> &'static ProtocolProfile {
        match self {
            Self::Legacy => &LEGACY,
            Self::Current => &CURRENT,
        }
    }
}

impl std::str::FromStr for Generation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" | "a" => Ok(Self::Legacy),
            "current" | "b" => Ok(Self::Current),
            other => Err(format!("unknown protocol generation '{other}' (expected legacy or current)")),
        }
    }
}

/// How text fields are written into a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldEncoding {
    /// Zero-padded decimal ASCII.
    Decimal,
    /// Zero-padded, then one uppercase hex pair per character.
    Hex,
}

/// Command templates, one per operation.
#[derive(Debug)]
pub struct Templates {
    pub idle: &'static str,
    pub status: &'static str,
    pub open_period: &'static str,
    pub close_period: &'static str,
    pub purchase: &'static str,
    pub refund: &'static str,
}

/// How a reply is recognised as successful.
#[derive(Debug, Clone, Copy)]
pub enum SuccessRule {
    /// Status field equals [`StatusCode::OkCommand`](super::StatusCode::OkCommand).
    StatusOk,
    /// Substring at `offset` equals `literal`.
    Equals { offset: usize, literal: &'static str },
    /// Reply from `offset` onward starts with `literal`.
    StartsWith { offset: usize, literal: &'static str },
}

/// How the cause of a failed purchase or refund is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMessage {
    /// Negative response code only.
    NegativeResponse,
    /// Status description when the status is a known code, negative response otherwise.
    StatusThenNegativeResponse,
}

/// Location of the base64 receipt block inside a reply.
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedReceipt {
    pub offset: usize,
    /// Trailing bytes after the block (terminator and checksum).
    pub trailer: usize,
}

/// Everything that differs between protocol generations.
#[derive(Debug)]
pub struct ProtocolProfile {
    pub generation: Generation,
    pub templates: Templates,
    pub field_encoding: FieldEncoding,
    pub transaction_id_width: usize,
    /// Tag list appended to purchases. Tagged commands are length-framed.
    pub purchase_tags: Option<&'static str>,
    /// Untagged commands are preceded by their own hex-decoded bytes.
    pub binary_preamble: bool,
    pub buffer_size: usize,
    pub terminal_status_success: SuccessRule,
    pub purchase_success: SuccessRule,
    pub refund_success: SuccessRule,
    pub failure_message: FailureMessage,
    /// Start of the free-text receipt when the ECR prints it.
    pub ecr_receipt_offset: usize,
    pub embedded_receipt: Option<EmbeddedReceipt>,
}

pub static LEGACY: ProtocolProfile = ProtocolProfile {
    generation: Generation::Legacy,
    templates: Templates {
        idle: "S00000",
        status: "S00010",
        open_period: "S00100#PRINTRECEIPTONPOS#",
        close_period: "S00110#TRANSACTIONID#010",
        purchase: "S00200#TRANSACTIONID##PRINTRECEIPTONPOS#01#AMOUNT#000",
        refund: "S00300#TRANSACTIONID#01#POSIDENTIFICATION##RECEIPTDATE##RECEIPTTIME##AMOUNT#",
    },
    field_encoding: FieldEncoding::Decimal,
    transaction_id_width: 4,
    purchase_tags: Some(PURCHASE_TAGS),
    binary_preamble: false,
    buffer_size: 256,
    terminal_status_success: SuccessRule::StartsWith {
        offset: STATUS_TEXT_OFFSET,
        literal: OK_TERMINAL_STATUS,
    },
    purchase_success: SuccessRule::Equals {
        offset: NEGATIVE_RESPONSE_OFFSET,
        literal: OK_PURCHASE,
    },
    refund_success: SuccessRule::StartsWith {
        offset: STATUS_TEXT_OFFSET,
        literal: OK_REFUND,
    },
    failure_message: FailureMessage::NegativeResponse,
    ecr_receipt_offset: 29,
    embedded_receipt: None,
};

pub static CURRENT: ProtocolProfile = ProtocolProfile {
    generation: Generation::Current,
    templates: Templates {
        idle: "040047533030",
        status: "040047533031",
        open_period: "0700475330340300#PRINTRECEIPTONPOS#",
        close_period: "0600475330350#USESUPERVISORCARD##PRINTRECEIPTONPOS#",
        purchase: "1D004753303610#TRANSACTIONID##PRINTRECEIPTONPOS#01#AMOUNT#30303000",
        refund: "2E004753303702#TRANSACTIONID#01#POSIDENTIFICATION##RECEIPTDATE##RECEIPTTIME##AMOUNT#",
    },
    field_encoding: FieldEncoding::Hex,
    transaction_id_width: 10,
    purchase_tags: Some(PURCHASE_TAGS),
    binary_preamble: true,
    buffer_size: 20 * 1024,
    terminal_status_success: SuccessRule::StartsWith {
        offset: STATUS_TEXT_OFFSET,
        literal: OK_TERMINAL_STATUS,
    },
    purchase_success: SuccessRule::StatusOk,
    refund_success: SuccessRule::StatusOk,
    failure_message: FailureMessage::StatusThenNegativeResponse,
    // Vendor layout constants, pinned by the captured-reply tests in parser.rs.
    ecr_receipt_offset: 195,
    embedded_receipt: Some(EmbeddedReceipt { offset: 76, trailer: 4 }),
};
