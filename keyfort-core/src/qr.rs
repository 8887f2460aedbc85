//! The QR-image collaborator: renders a provisioning URI to whatever the
//! host's UI can display (typically a data URL). Pure function of the URI,
//! no state.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("{0}")]
pub struct QrError(pub String);

#[async_trait]
pub trait QrRenderer: Send + Sync {
    async fn render(&self, uri: &str) -> Result<String, QrError>;
}

/// Test double that returns the URI itself in place of an image.
pub struct UriEchoRenderer;

#[async_trait]
impl QrRenderer for UriEchoRenderer {
    async fn render(&self, uri: &str) -> Result<String, QrError> {
        Ok(uri.to_string())
    }
}
