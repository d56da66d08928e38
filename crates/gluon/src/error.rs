//! Errors surfaced by the window façade.

use std::time::Duration;

use gluon_cdp::CdpError;
use gluon_ipc::IpcError;
use gluon_settings::SettingsError;

/// Failure opening or driving a window.
#[derive(Debug, thiserror::Error)]
pub enum GluonError {
    /// Control channel failure.
    #[error(transparent)]
    Cdp(#[from] CdpError),

    /// IPC bridge failure.
    #[error(transparent)]
    Ipc(#[from] IpcError),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// The page did not finish its first load in time.
    #[error("page did not finish loading within {0:?}")]
    LoadTimeout(Duration),
}

impl GluonError {
    /// Whether the failure means the channel is gone.
    pub fn is_closed(&self) -> bool {
        match self {
            Self::Cdp(e) => e.is_closed(),
            Self::Ipc(e) => e.is_closed(),
            Self::Settings(_) | Self::LoadTimeout(_) => false,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, GluonError>;
