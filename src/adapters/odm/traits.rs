//! ODM source abstraction

use crate::domain::errors::SourceError;
use crate::domain::odm::Odm;
use crate::domain::Result;
use async_trait::async_trait;

/// A source of ODM documents
///
/// Windowed sources (REDCap) restrict the export to data captured after
/// `window_start`; sources without that capability ignore it.
#[async_trait]
pub trait OdmSource: Send + Sync {
    /// Short source name for logging
    fn name(&self) -> &'static str;

    /// Fetch all ODM documents of this run
    ///
    /// # Errors
    ///
    /// Returns an error when the source is unreachable, rejects the
    /// credentials or returns a malformed document. Any source failure is
    /// fatal for the whole run.
    async fn fetch(&self, window_start: Option<&str>) -> Result<Vec<Odm>>;
}

/// Map a non-success HTTP status to the matching source error
pub(crate) fn error_for_status(status: reqwest::StatusCode, body: String) -> SourceError {
    match status.as_u16() {
        401 | 403 => SourceError::AuthenticationFailed(body),
        code if status.is_client_error() => SourceError::ClientError {
            status: code,
            message: body,
        },
        code => SourceError::ServerError {
            status: code,
            message: body,
        },
    }
}
