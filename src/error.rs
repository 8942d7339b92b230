use crate::timeline::InputLocation;
use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{loc}: system is {height:.2} tall but only {available:.2} fits on a page")]
    SystemTooTall {
        loc: InputLocation,
        height: f64,
        available: f64,
    },

    #[error("{loc}: samepage zone does not fit on one page")]
    ZoneTooTall { loc: InputLocation },

    #[error("{loc}: stem length forced negative ({length:.2})")]
    StemNegative { loc: InputLocation, length: f64 },

    #[error("{loc}: {message}")]
    CrossStaff { loc: InputLocation, message: String },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// True when the score itself cannot be satisfied, as opposed to a
    /// defect in an earlier phase or an I/O failure.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::SystemTooTall { .. }
                | Self::ZoneTooTall { .. }
                | Self::StemNegative { .. }
                | Self::CrossStaff { .. }
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
