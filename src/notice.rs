//! User-facing notifications ("toasts").
//!
//! Failures that affect the active user's action become a [`Notice`];
//! background reconciliation failures are only logged.

use crate::error::GalinheiroError;
use crate::error_codes::ErrorCode;

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A toast to show the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }

    /// Notice for a domain code, using its description.
    pub fn for_code(code: &ErrorCode) -> Self {
        let level = match code {
            ErrorCode::SpectatorCannotAnswer | ErrorCode::AlreadyAnswered | ErrorCode::RoundClosed => {
                NoticeLevel::Info
            }
            _ => NoticeLevel::Error,
        };
        Self {
            level,
            message: code.description().to_string(),
        }
    }
}

impl From<&GalinheiroError> for Notice {
    fn from(err: &GalinheiroError) -> Self {
        match err {
            GalinheiroError::Rejected { code, .. } => Self::for_code(code),
            GalinheiroError::NotConnected
            | GalinheiroError::TransportClosed
            | GalinheiroError::TransportSend(_)
            | GalinheiroError::TransportReceive(_) => {
                Self::warning("Connection lost. Trying to keep up…")
            }
            GalinheiroError::Timeout => Self::warning("The server is taking too long to answer."),
            _ => Self::for_code(&ErrorCode::InternalError),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_use_code_description() {
        let notice = Notice::from(&GalinheiroError::rejected(ErrorCode::RoomNotInLobby));
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(notice.message, ErrorCode::RoomNotInLobby.description());
    }

    #[test]
    fn spectator_notice_is_informational() {
        let notice = Notice::for_code(&ErrorCode::SpectatorCannotAnswer);
        assert_eq!(notice.level, NoticeLevel::Info);
        assert!(notice.message.contains("next round"));
    }

    #[test]
    fn transport_errors_warn() {
        let notice = Notice::from(&GalinheiroError::NotConnected);
        assert_eq!(notice.level, NoticeLevel::Warning);
    }
}
