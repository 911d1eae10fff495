//! Provides the upstream rate source seam for the application.

use crate::currency::RateTable;
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Fetch the full multiplier table for the base currency.
    async fn fetch_rates(&self) -> Result<RateTable>;
}
