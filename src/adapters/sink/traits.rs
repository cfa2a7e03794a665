//! Bundle delivery abstraction

use crate::core::bundle::PatientBundle;
use crate::domain::Result;
use async_trait::async_trait;

/// A delivery target for patient bundles
#[async_trait]
pub trait BundleSink: Send + Sync {
    /// Short sink name for logging
    fn name(&self) -> &'static str;

    /// Deliver one patient bundle
    ///
    /// # Errors
    ///
    /// Returns an error when the bundle cannot be delivered. The pipeline
    /// treats a delivery failure as fatal for the whole run.
    async fn deliver(&self, bundle: &PatientBundle) -> Result<()>;
}
