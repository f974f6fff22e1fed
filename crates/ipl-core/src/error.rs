//! Unified Error Model
use thiserror::Error;

/// Every failure the pipeline can produce.
///
/// Non-fatal kinds are turned into [`crate::Warning`]s by the stage that
/// hits them; `Config` at the top level and `FatalInput` propagate to the
/// caller untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IplError {
    #[error("CONFIG/{0}")]
    Config(String),

    #[error("RESOLVE/{0}")]
    Resolution(String),

    #[error("SCAN/{0}")]
    ScanRow(String),

    #[error("SHARE/{0}")]
    ShareIo(String),

    #[error("ACTION/{0}")]
    UnsupportedAction(String),

    #[error("INPUT/{0}")]
    FatalInput(String),

    #[error("PLATFORM/{0}")]
    Platform(String),
}

impl IplError {
    /// Short category tag, used as a metrics label and in warnings.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Resolution(_) => "resolution",
            Self::ScanRow(_) => "scan_row",
            Self::ShareIo(_) => "share_io",
            Self::UnsupportedAction(_) => "unsupported_action",
            Self::FatalInput(_) => "fatal_input",
            Self::Platform(_) => "platform",
        }
    }
}
