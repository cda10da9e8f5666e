use log::debug;

use crate::config::Config;
use crate::error::GenmixResult;
use crate::fetch::{DataSource, EmberClient, FetchRequest};
use crate::normalize::RawRow;
use crate::pipeline::{EnrichedTable, Pipeline};
use crate::view::{ViewFilters, ViewTable};

// Re-exports
pub use column_names as COL;

// Modules
pub mod chart;
pub mod column_names;
pub mod config;
pub mod delta;
pub mod error;
pub mod fetch;
#[cfg(feature = "formatters")]
pub mod formatters;
pub mod groups;
pub mod normalize;
pub mod period;
pub mod pipeline;
pub mod selection;
pub mod share;
pub mod sources;
pub mod view;

/// Type for the generation mix pipeline and its data source
pub struct Genmix {
    pub config: Config,
    pipeline: Pipeline,
}

impl Default for Genmix {
    fn default() -> Self {
        Self::new_with_config(Config::default())
    }
}

impl Genmix {
    /// Setup the Genmix object with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Setup the Genmix object with custom configuration
    pub fn new_with_config(config: Config) -> Self {
        debug!("config: {config:?}");
        let pipeline = Pipeline::new(config.pipeline.clone());
        Self { config, pipeline }
    }

    /// HTTP client for the configured API
    pub fn client(&self) -> GenmixResult<EmberClient> {
        EmberClient::new(self.config.api.clone())
    }

    /// Downloads raw rows from the configured API
    pub async fn fetch(&self, request: &FetchRequest) -> GenmixResult<Vec<RawRow>> {
        self.client()?.fetch(request).await
    }

    /// Runs the pipeline over raw rows
    pub fn run(&self, rows: &[RawRow]) -> GenmixResult<EnrichedTable> {
        self.pipeline.run(rows)
    }

    /// Fetches from `source` and runs the pipeline over the result
    pub async fn fetch_and_run<S: DataSource>(
        &self,
        source: &S,
        request: &FetchRequest,
    ) -> GenmixResult<EnrichedTable> {
        let rows = source.fetch(request).await?;
        self.run(&rows)
    }

    /// Slices an enriched table
    pub fn view(&self, table: &EnrichedTable, filters: &ViewFilters) -> GenmixResult<ViewTable> {
        self.pipeline.view(table, filters)
    }
}
