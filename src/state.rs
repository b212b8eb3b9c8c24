use std::sync::Arc;
use std::time::Duration;

use crate::error::ScanError;
use crate::idle::ActivityTracker;
use crate::inference::holder::ModelHolder;

#[derive(Clone)]
pub struct AppState {
    pub holder: Arc<ModelHolder>,
    pub activity: Arc<ActivityTracker>,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(holder: ModelHolder, request_timeout: Duration) -> Self {
        Self {
            holder: Arc::new(holder),
            activity: Arc::new(ActivityTracker::default()),
            request_timeout,
        }
    }

    /// Loads the model if this is a cold start, then extracts markdown from the
    /// image. Both steps together are bounded by the invocation timeout; a cold
    /// start cut short by it keeps running for the next scan.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn scan(&self, image_url: &str) -> Result<String, ScanError> {
        let _activity = self.activity.begin();
        let scan = async {
            let model = self.holder.initialize().await?;
            model.extract_text(image_url).await
        };

        tokio::time::timeout(self.request_timeout, scan)
            .await
            .map_err(|_| ScanError::Timeout(self.request_timeout))?
    }
}
