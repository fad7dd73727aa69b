// # Fetcher Trait
//
// Defines the interface for reading a package's current state from a
// carrier.
//
// ## Implementations
//
// - OCA: `postwatch-carrier-oca` crate
//
// ## Usage
//
// ```rust,ignore
// use postwatch_core::Fetcher;
//
// let fetcher = /* Fetcher implementation */;
//
// for category in fetcher.default_categories() {
//     let snapshot = fetcher.fetch(&category, "3867500000001234567").await?;
//     if snapshot.found {
//         break;
//     }
// }
// ```

use async_trait::async_trait;

use crate::snapshot::Snapshot;

/// Trait for carrier fetchers
///
/// A fetcher is also the category prober: the pipeline calls it once per
/// candidate category until one reports `found = true`.
///
/// ## Rules
///
/// - A package the carrier does not know is `Ok` with `found = false`,
///   never an error
/// - Network failures and malformed responses are `Error::Fetch`
/// - No retries: the next poll cycle is the retry
/// - No access to the snapshot store
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the current snapshot of `identifier` under `category`
    ///
    /// The returned snapshot's `category` is the one that was queried.
    async fn fetch(&self, category: &str, identifier: &str) -> Result<Snapshot, crate::Error>;

    /// Categories to probe, in order, when configuration names none
    fn default_categories(&self) -> Vec<String> {
        Vec::new()
    }

    /// Carrier name (for logging)
    fn carrier_name(&self) -> &'static str;
}

/// Helper trait for constructing fetchers from configuration
pub trait FetcherFactory: Send + Sync {
    /// Create a Fetcher instance from configuration
    fn create(
        &self,
        config: &crate::config::FetcherConfig,
    ) -> Result<Box<dyn Fetcher>, crate::Error>;
}
