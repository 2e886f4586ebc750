//! Terminal status codes and negative response codes.

use serde::{Deserialize, Serialize};

/// Cause reported when a failed reply carries no recognisable negative response code.
pub const UNKNOWN_PROCESSING_ERROR: &str = "Erro no processamento. Consulte o terminal para mais detalhes";

/// Result code carried in the status field of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCode {
    OkCommand,
    OperationCancelled,
    CommunicationsAnomaly,
    SibsRefusedOperation,
    NotConfiguredTerminal,
    InvalidPeriod,
    CardDetectedInReader,
    TimeoutInSupervisorsFeatures,
    WrongCommandSize,
    InvalidCentralOperation,
    /// Status field missing, unparseable or not a known code.
    Error,
}

impl StatusCode {
    /// Protocol value of the code.
    pub fn code(self) -> u32 {
        match self {
            Self::OkCommand => 0x00,
            Self::OperationCancelled => 0x71,
            Self::CommunicationsAnomaly => 0x72,
            Self::SibsRefusedOperation => 0x75,
            Self::NotConfiguredTerminal => 0x76,
            Self::InvalidPeriod => 0x77,
            Self::CardDetectedInReader => 0x4350,
            Self::TimeoutInSupervisorsFeatures => 0x80,
            Self::WrongCommandSize => 0x82,
            Self::InvalidCentralOperation => 0x92,
            Self::Error => 9999,
        }
    }

    /// Look up a protocol value. Unknown values map to [`StatusCode::Error`].
    pub fn from_code(code: u32) -> Self {
        match code {
            0x00 => Self::OkCommand,
            0x71 => Self::OperationCancelled,
            0x72 => Self::CommunicationsAnomaly,
            0x75 => Self::SibsRefusedOperation,
            0x76 => Self::NotConfiguredTerminal,
            0x77 => Self::InvalidPeriod,
            0x4350 => Self::CardDetectedInReader,
            0x80 => Self::TimeoutInSupervisorsFeatures,
            0x82 => Self::WrongCommandSize,
            0x92 => Self::InvalidCentralOperation,
            _ => Self::Error,
        }
    }

    /// Parse a hexadecimal status field (e.g. `"75"`). Only hex digits are accepted, no sign.
    pub fn from_hex(field: &str) -> Self {
        if field.is_empty() || !field.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Self::Error;
        }
        u32::from_str_radix(field, 16).map(Self::from_code).unwrap_or(Self::Error)
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::OkCommand => "OK Command",
            Self::OperationCancelled => "Operation cancelled by the operator",
            Self::CommunicationsAnomaly => "Communications Anomaly",
            Self::SibsRefusedOperation => "SIBS refused operation",
            Self::NotConfiguredTerminal => "Not Configured Terminal",
            Self::InvalidPeriod => "Invalid Period",
            Self::CardDetectedInReader => "Card Detected in the Reader",
            Self::TimeoutInSupervisorsFeatures => "Timeout in the Supervisors' Features",
            Self::WrongCommandSize => "Wrong Command Size",
            Self::InvalidCentralOperation => "Invalid Central operation",
            Self::Error => "Error: Unable to Parse",
        }
    }

    pub fn is_ok(self) -> bool {
        self == Self::OkCommand
    }
}

/// Rejection reason sent by the terminal when it refuses a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegativeResponse {
    InvalidLength,
    InvalidCommand,
    InvalidVersion,
    OutOfContext,
    OperationCancelled,
    OutOfService,
    TerminalRegistrationRequired,
    InvalidEcrModel,
    Error,
}

impl NegativeResponse {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::InvalidLength),
            2 => Some(Self::InvalidCommand),
            3 => Some(Self::InvalidVersion),
            4 => Some(Self::OutOfContext),
            5 => Some(Self::OperationCancelled),
            6 => Some(Self::OutOfService),
            7 => Some(Self::TerminalRegistrationRequired),
            8 => Some(Self::InvalidEcrModel),
            12 => Some(Self::Error),
            _ => None,
        }
    }

    /// Text shown by the terminal for this rejection.
    pub fn description(self) -> &'static str {
        match self {
            Self::InvalidLength => "Comprimento Inválido",
            Self::InvalidCommand => "COMANDO INVÁLIDO",
            Self::InvalidVersion => "VERSÃO INVALIDA",
            Self::OutOfContext => "FORA DE CONTEXTO",
            Self::OperationCancelled => "OPERAÇÃO ANULADA",
            Self::OutOfService => "FORA DE SERVIÇO",
            Self::TerminalRegistrationRequired => "MATRICULAR TPA",
            Self::InvalidEcrModel => "MODELO ECR INV.",
            Self::Error => "ERRO",
        }
    }
}

/// Resolve a decimal negative response field (e.g. `"005"`) to its cause.
pub fn describe_negative_response(field: &str) -> &'static str {
    field
        .parse::<u32>()
        .ok()
        .and_then(NegativeResponse::from_code)
        .map_or(UNKNOWN_PROCESSING_ERROR, NegativeResponse::description)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_lookup_is_total() {
        for value in 0u32..=255 {
            let status = StatusCode::from_code(value);
            if status != StatusCode::Error {
                assert_eq!(status.code(), value);
            }
        }
    }

    #[test]
    fn test_status_from_hex() {
        assert_eq!(StatusCode::from_hex("00"), StatusCode::OkCommand);
        assert_eq!(StatusCode::from_hex("75"), StatusCode::SibsRefusedOperation);
        assert_eq!(StatusCode::from_hex("92"), StatusCode::InvalidCentralOperation);
        assert_eq!(StatusCode::from_hex("FF"), StatusCode::Error);
        assert_eq!(StatusCode::from_hex("zz"), StatusCode::Error);
        assert_eq!(StatusCode::from_hex(""), StatusCode::Error);
        assert_eq!(StatusCode::from_hex("+0"), StatusCode::Error);
        assert_eq!(StatusCode::from_hex("-0"), StatusCode::Error);
        assert_eq!(StatusCode::from_hex(" 0"), StatusCode::Error);
    }

    #[test]
    fn test_negative_response_lookup() {
        assert_eq!(describe_negative_response("005"), "OPERAÇÃO ANULADA");
        assert_eq!(describe_negative_response("012"), "ERRO");
        assert_eq!(describe_negative_response("099"), UNKNOWN_PROCESSING_ERROR);
        assert_eq!(describe_negative_response("0A1"), UNKNOWN_PROCESSING_ERROR);
        assert_eq!(describe_negative_response("000"), UNKNOWN_PROCESSING_ERROR);
    }
}
