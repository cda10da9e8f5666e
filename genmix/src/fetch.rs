//! Data sources for raw monthly generation rows.

use std::path::PathBuf;
use std::time::Duration;

use itertools::izip;
use log::{debug, info, warn};
use polars::df;
use polars::prelude::{CsvReadOptions, DataFrame, DataType, SerReader};
use serde::Deserialize;

use crate::config::{ApiConfig, DEFAULT_ENTITIES};
use crate::error::{GenmixError, GenmixResult};
use crate::normalize::RawRow;
use crate::period::YearMonth;
use crate::pipeline::DEFAULT_START;
use crate::selection::Selection;
use crate::sources::primary_source_names;
use crate::COL;

pub const MONTHLY_GENERATION_PATH: &str = "/v1/electricity-generation/monthly";

/// Entity and series probed to find the most recent month the API has data for.
const PROBE_ENTITY: &str = "ITA";
const PROBE_SERIES: &str = "Coal";

/// What to ask a data source for. `end: None` means up to the latest available month.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub entities: Selection,
    pub sources: Selection,
    pub start: YearMonth,
    pub end: Option<YearMonth>,
}

impl Default for FetchRequest {
    fn default() -> Self {
        Self {
            entities: Selection::only(&DEFAULT_ENTITIES),
            sources: Selection::All,
            start: YearMonth::new(DEFAULT_START.0, DEFAULT_START.1)
                .unwrap_or_else(YearMonth::previous_to_today),
            end: None,
        }
    }
}

impl FetchRequest {
    fn series_names(&self) -> Vec<String> {
        match &self.sources {
            Selection::All => primary_source_names()
                .into_iter()
                .map(String::from)
                .collect(),
            Selection::Only(names) => names.clone(),
        }
    }

    /// Whether a row falls inside this request. Rows with an unparseable date are kept so that the
    /// normalizer can report them.
    fn matches(&self, row: &RawRow) -> bool {
        let in_range = match row.date.parse::<YearMonth>() {
            Ok(date) => date >= self.start && self.end.map_or(true, |end| date <= end),
            Err(_) => true,
        };
        in_range
            && self.entities.contains(&row.entity_code)
            && self.series_names().iter().any(|s| *s == row.series)
    }
}

/// Anything that can produce raw generation rows.
pub trait DataSource {
    async fn fetch(&self, request: &FetchRequest) -> GenmixResult<Vec<RawRow>>;
}

#[derive(Deserialize, Debug)]
struct ApiResponse {
    #[serde(default)]
    data: Option<Vec<serde_json::Value>>,
}

/// Client for the monthly electricity generation endpoint.
#[derive(Debug, Clone)]
pub struct EmberClient {
    client: reqwest::Client,
    config: ApiConfig,
}

impl EmberClient {
    pub fn new(config: ApiConfig) -> GenmixResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    fn url(&self) -> String {
        format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            MONTHLY_GENERATION_PATH
        )
    }

    fn query(
        &self,
        entities: &Selection,
        series: &[String],
        start: Option<YearMonth>,
        end: Option<YearMonth>,
    ) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        match entities {
            Selection::All => query.push(("is_aggregate_entity", "false".to_string())),
            Selection::Only(codes) => query.push(("entity_code", codes.join(","))),
        }
        query.push(("series", series.join(",")));
        if let Some(start) = start {
            query.push(("start_date", start.to_string()));
        }
        if let Some(end) = end {
            query.push(("end_date", end.to_string()));
        }
        query.push(("is_aggregate_series", "false".to_string()));
        query.push(("include_all_dates_value_range", "true".to_string()));
        if let Some(api_key) = &self.config.api_key {
            query.push(("api_key", api_key.clone()));
        }
        query
    }

    /// One request. 5xx responses and connection failures are `TransientFetch`; any other
    /// unsuccessful status is `PermanentFetch`; a successful but empty body is `NoData`.
    async fn get_once(&self, query: &[(&'static str, String)]) -> GenmixResult<Vec<RawRow>> {
        let response = match self.client.get(self.url()).query(query).send().await {
            Ok(response) => response,
            Err(err) if err.is_timeout() || err.is_connect() => {
                return Err(GenmixError::TransientFetch(err.to_string()))
            }
            Err(err) => return Err(err.into()),
        };

        let status = response.status();
        if status.is_server_error() {
            return Err(GenmixError::TransientFetch(format!("status {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenmixError::PermanentFetch {
                status: status.as_u16(),
                body,
            });
        }

        let body: ApiResponse = match response.json().await {
            Ok(body) => body,
            Err(err) => {
                warn!("Response body could not be decoded: {err}");
                return Err(GenmixError::NoData);
            }
        };
        let values = match body.data {
            Some(values) if !values.is_empty() => values,
            _ => {
                warn!("Response contained no data");
                return Err(GenmixError::NoData);
            }
        };
        let total = values.len();
        let rows: Vec<RawRow> = values
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<RawRow>(value) {
                Ok(row) => Some(row),
                Err(err) => {
                    warn!("Skipping malformed row: {err}");
                    None
                }
            })
            .collect();
        debug!("Decoded {} of {total} rows", rows.len());
        Ok(rows)
    }

    async fn get_with_retries(&self, query: &[(&'static str, String)]) -> GenmixResult<Vec<RawRow>> {
        let attempts = self.config.max_attempts.max(1);
        for attempt in 1..=attempts {
            match self.get_once(query).await {
                Err(GenmixError::TransientFetch(reason)) => {
                    warn!("Attempt {attempt}/{attempts} failed: {reason}");
                    if attempt < attempts {
                        tokio::time::sleep(Duration::from_secs(self.config.retry_delay_secs))
                            .await;
                    }
                }
                other => return other,
            }
        }
        warn!("Giving up after {attempts} attempts");
        Err(GenmixError::NoData)
    }

    /// The most recent month with data, falling back to the month before today when the API
    /// cannot say.
    pub async fn latest_available_month(&self) -> YearMonth {
        let query = self.query(
            &Selection::only(&[PROBE_ENTITY]),
            &[PROBE_SERIES.to_string()],
            None,
            None,
        );
        let latest = match self.get_once(&query).await {
            Ok(rows) => rows
                .iter()
                .filter_map(|row| row.date.parse::<YearMonth>().ok())
                .max(),
            Err(err) => {
                warn!("Could not determine latest available month: {err}");
                None
            }
        };
        latest.unwrap_or_else(|| {
            let fallback = YearMonth::previous_to_today();
            info!("Using {fallback} as the latest available month");
            fallback
        })
    }
}

impl DataSource for EmberClient {
    async fn fetch(&self, request: &FetchRequest) -> GenmixResult<Vec<RawRow>> {
        let end = match request.end {
            Some(end) => end,
            None => self.latest_available_month().await,
        };
        if end < request.start {
            return Err(GenmixError::InvalidPeriod(format!(
                "end {end} is before start {}",
                request.start
            )));
        }
        info!(
            "Fetching {} to {end} for entities {} and sources {}",
            request.start, request.entities, request.sources
        );
        let query = self.query(
            &request.entities,
            &request.series_names(),
            Some(request.start),
            Some(end),
        );
        self.get_with_retries(&query).await
    }
}

/// Raw rows previously saved with [`raw_rows_to_frame`] as CSV.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl DataSource for CsvSource {
    async fn fetch(&self, request: &FetchRequest) -> GenmixResult<Vec<RawRow>> {
        debug!("Reading raw rows from {}", self.path.display());
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(self.path.clone()))?
            .finish()?;
        let rows: Vec<RawRow> = frame_to_raw_rows(&df)?
            .into_iter()
            .filter(|row| request.matches(row))
            .collect();
        if rows.is_empty() {
            return Err(GenmixError::NoData);
        }
        Ok(rows)
    }
}

pub fn raw_rows_to_frame(rows: &[RawRow]) -> GenmixResult<DataFrame> {
    let df = df!(
        COL::ENTITY => rows.iter().map(|r| r.entity_code.clone()).collect::<Vec<_>>(),
        COL::RAW_DATE => rows.iter().map(|r| r.date.clone()).collect::<Vec<_>>(),
        COL::SOURCE => rows.iter().map(|r| r.series.clone()).collect::<Vec<_>>(),
        COL::GENERATION => rows.iter().map(|r| r.generation_twh).collect::<Vec<_>>(),
        COL::RAW_SHARE => rows.iter().map(|r| r.share_of_generation_pct).collect::<Vec<_>>()
    )?;
    Ok(df)
}

/// Reads raw rows back from a frame. The share column is optional; numeric columns are cast so
/// that integer-looking CSV values are accepted.
pub fn frame_to_raw_rows(df: &DataFrame) -> GenmixResult<Vec<RawRow>> {
    let entities = df.column(COL::ENTITY)?.cast(&DataType::String)?;
    let dates = df.column(COL::RAW_DATE)?.cast(&DataType::String)?;
    let series = df.column(COL::SOURCE)?.cast(&DataType::String)?;
    let generation = df.column(COL::GENERATION)?.cast(&DataType::Float64)?;
    let shares: Vec<Option<f64>> = match df.column(COL::RAW_SHARE) {
        Ok(column) => column.cast(&DataType::Float64)?.f64()?.into_iter().collect(),
        Err(_) => vec![None; df.height()],
    };

    let rows = izip!(
        entities.str()?,
        dates.str()?,
        series.str()?,
        generation.f64()?,
        shares
    )
    .map(|(entity, date, series, generation, share)| RawRow {
        entity_code: entity.unwrap_or_default().to_string(),
        date: date.unwrap_or_default().to_string(),
        series: series.unwrap_or_default().to_string(),
        generation_twh: generation,
        share_of_generation_pct: share,
    })
    .collect();
    Ok(rows)
}
