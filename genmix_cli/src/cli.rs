use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use enum_dispatch::enum_dispatch;
use genmix::{
    chart::{chart_series, ChartMetric},
    config::Config,
    error::{GenmixError, GenmixResult},
    fetch::{raw_rows_to_frame, CsvSource, FetchRequest},
    formatters::{CsvFormatter, JsonFormatter, JsonLinesFormatter, OutputFormatter, OutputGenerator},
    period::{parse_year_ranges, YearMonth, YearRange},
    pipeline::EnrichedTable,
    selection::Selection,
    view::{Granularity, ViewFilters},
    Genmix,
};
use log::{debug, info};
use polars::frame::DataFrame;
use serde::{Deserialize, Serialize};
use spinners::{Spinner, Spinners};
use strum_macros::EnumString;

use crate::display::{display_chart, display_sources, display_view};
use crate::error::GenmixCliResult;

const DEFAULT_PROGRESS_SPINNER: Spinners = Spinners::Dots;
const COMPLETE_PROGRESS_STRING: &str = "✔";
const RUNNING_TAIL_STRING: &str = "...";
const DOWNLOADING_STRING: &str = "Downloading generation data";
const NO_DATA_STRING: &str = "No generation data available for this selection.";
const DEFAULT_MAX_ROWS: usize = 50;

/// Defines the output formats we are able to produce data in.
#[derive(Clone, Debug, Deserialize, Serialize, EnumString, PartialEq, Eq)]
#[strum(ascii_case_insensitive)]
pub enum OutputFormat {
    Table,
    Csv,
    Json,
    #[strum(serialize = "jsonl", serialize = "jsonlines")]
    JsonLines,
}

impl OutputFormat {
    /// The file formatter for this format, `None` for the terminal table.
    fn formatter(&self) -> Option<OutputFormatter> {
        match self {
            OutputFormat::Table => None,
            OutputFormat::Csv => Some(OutputFormatter::Csv(CsvFormatter)),
            OutputFormat::Json => Some(OutputFormatter::Json(JsonFormatter)),
            OutputFormat::JsonLines => Some(OutputFormatter::JsonLines(JsonLinesFormatter)),
        }
    }
}

fn write_output<T, U>(
    output_generator: T,
    mut data: DataFrame,
    output_file: Option<U>,
) -> GenmixCliResult<()>
where
    T: OutputGenerator,
    U: AsRef<Path>,
{
    if let Some(output_file) = output_file {
        let mut f = File::create(output_file).context("Failed to write output")?;
        output_generator.save(&mut f, &mut data)?;
    } else {
        let mut stdout_lock = std::io::stdout().lock();
        output_generator.save(&mut stdout_lock, &mut data)?;
    };
    Ok(())
}

fn start_spinner(quiet: bool, message: &str) -> Option<Spinner> {
    (!quiet).then(|| {
        Spinner::with_timer(
            DEFAULT_PROGRESS_SPINNER,
            message.to_string() + RUNNING_TAIL_STRING,
        )
    })
}

fn stop_spinner(sp: Option<Spinner>) {
    if let Some(mut s) = sp {
        s.stop_with_symbol(COMPLETE_PROGRESS_STRING);
    }
}

/// Turns `NoData` into an empty-state notice. Every other error is propagated.
fn or_notice<T>(result: GenmixResult<T>) -> GenmixCliResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(GenmixError::NoData) => {
            println!("{NO_DATA_STRING}");
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

/// Trait that defines what to run when a given subcommand is invoked.
#[enum_dispatch]
pub trait RunCommand {
    async fn run(&self, config: Config) -> GenmixCliResult<()>;
}

/// Where the raw rows come from and which months to ask for.
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    #[arg(
        long,
        help = "Read raw rows from a CSV written by `genmix fetch` instead of the API"
    )]
    input: Option<PathBuf>,
    #[arg(long, value_name = "YYYY-MM", help = "First month to fetch")]
    start: Option<YearMonth>,
    #[arg(
        long,
        value_name = "YYYY-MM",
        help = "Last month to fetch. Defaults to the latest month the API has data for"
    )]
    end: Option<YearMonth>,
}

impl SourceArgs {
    fn request(&self, config: &Config) -> FetchRequest {
        FetchRequest {
            entities: Selection::Only(config.api.entities.clone()),
            sources: Selection::All,
            start: start_month(self.start, config),
            end: self.end,
        }
    }

    /// Runs the pipeline over rows from the CSV input or the API.
    async fn load(&self, genmix: &Genmix, quiet: bool) -> GenmixCliResult<Option<EnrichedTable>> {
        let request = self.request(&genmix.config);
        let sp = start_spinner(quiet, DOWNLOADING_STRING);
        let result = match &self.input {
            Some(path) => {
                genmix
                    .fetch_and_run(&CsvSource::new(path.clone()), &request)
                    .await
            }
            None => genmix.fetch_and_run(&genmix.client()?, &request).await,
        };
        stop_spinner(sp);
        or_notice(result)
    }
}

/// The requested start month, else the pipeline's configured start.
fn start_month(start: Option<YearMonth>, config: &Config) -> YearMonth {
    start
        .or(config.pipeline.start)
        .unwrap_or_else(|| FetchRequest::default().start)
}

/// The `fetch` command downloads raw monthly rows and writes them out unchanged.
#[derive(Args, Debug)]
pub struct FetchCommand {
    #[arg(
        short = 'e',
        long,
        value_name = "all|ISO3,...",
        help = "Countries to fetch. Defaults to the configured list"
    )]
    entities: Option<Selection>,
    #[arg(
        short = 's',
        long,
        value_name = "all|SOURCE,...",
        help = "Series to fetch. Defaults to every primary source"
    )]
    sources: Option<Selection>,
    #[arg(long, value_name = "YYYY-MM", help = "First month to fetch")]
    start: Option<YearMonth>,
    #[arg(long, value_name = "YYYY-MM", help = "Last month to fetch")]
    end: Option<YearMonth>,
    #[arg(
        short = 'f',
        long,
        value_name = "csv|json|jsonl",
        default_value = "csv",
        help = "Output format for the raw rows"
    )]
    output_format: OutputFormat,
    #[arg(short = 'o', long, help = "Output file to place the results")]
    output_file: Option<String>,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for FetchCommand {
    async fn run(&self, config: Config) -> GenmixCliResult<()> {
        info!("Running `fetch` subcommand");
        let request = FetchRequest {
            entities: self
                .entities
                .clone()
                .unwrap_or_else(|| Selection::Only(config.api.entities.clone())),
            sources: self.sources.clone().unwrap_or_default(),
            start: start_month(self.start, &config),
            end: self.end,
        };
        debug!("{request:?}");
        let genmix = Genmix::new_with_config(config);
        let sp = start_spinner(self.quiet, DOWNLOADING_STRING);
        let result = genmix.fetch(&request).await;
        stop_spinner(sp);
        let Some(rows) = or_notice(result)? else {
            return Ok(());
        };
        info!("Fetched {} raw rows", rows.len());

        let formatter = self
            .output_format
            .formatter()
            .unwrap_or(OutputFormatter::Csv(CsvFormatter));
        write_output(
            formatter,
            raw_rows_to_frame(&rows)?,
            self.output_file.as_deref(),
        )?;
        Ok(())
    }
}

/// Selection of entities, sources and years shared by `table` and `chart`.
#[derive(Args, Debug, Clone)]
pub struct ViewArgs {
    #[arg(
        short = 'e',
        long,
        value_name = "all|ENTITY,...",
        default_value = "all",
        help = "Countries or blocs (EUR, G7, G20, WORLD) to show"
    )]
    entities: Selection,
    #[arg(
        short = 's',
        long,
        value_name = "all|SOURCE,...",
        default_value = "all",
        help = "Sources to show, including Total, Green and Brown"
    )]
    sources: Selection,
    // Note: using `std::vec::Vec` rather than just `Vec`, to enforce that multiple year ranges are
    // passed in a single argument e.g. `-y 2014...2016,2018...2019` rather than multiple arguments
    // e.g. `-y 2014...2016 -y 2018...2019`. See https://github.com/clap-rs/clap/issues/4626 and
    // https://docs.rs/clap/latest/clap/_derive/index.html#arg-types
    #[arg(
        short,
        long,
        help = "\
            Filter by year ranges. All ranges are inclusive; multiple ranges can be\n\
            comma-separated.",
        value_name = "YEAR|START...|...END|START...END",
        value_parser = parse_year_ranges,
    )]
    year_range: Option<std::vec::Vec<YearRange>>,
}

impl ViewArgs {
    fn filters(&self, granularity: Granularity) -> ViewFilters {
        let filters = ViewFilters::default()
            .with_entities(self.entities.clone())
            .with_sources(self.sources.clone())
            .with_granularity(granularity);
        match &self.year_range {
            Some(years) => filters.with_years(years.clone()),
            None => filters,
        }
    }
}

/// The `table` command runs the pipeline and shows or exports a view of the result.
#[derive(Args, Debug)]
pub struct TableCommand {
    #[command(flatten)]
    source_args: SourceArgs,
    #[command(flatten)]
    view_args: ViewArgs,
    #[arg(long, help = "Aggregate months into calendar years")]
    annual: bool,
    #[arg(
        short = 'f',
        long,
        value_name = "table|csv|json|jsonl",
        default_value = "table",
        help = "Output format for the results"
    )]
    output_format: OutputFormat,
    #[arg(short = 'o', long, help = "Output file to place the results")]
    output_file: Option<String>,
    #[arg(long, help = "Show all rows even if there are a large number")]
    full: bool,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for TableCommand {
    async fn run(&self, config: Config) -> GenmixCliResult<()> {
        info!("Running `table` subcommand");
        let genmix = Genmix::new_with_config(config);
        let Some(table) = self.source_args.load(&genmix, self.quiet).await? else {
            return Ok(());
        };
        let granularity = if self.annual {
            Granularity::Annual
        } else {
            Granularity::Monthly
        };
        let view = genmix.view(&table, &self.view_args.filters(granularity))?;
        if view.is_empty() {
            println!("{NO_DATA_STRING}");
            return Ok(());
        }

        match self.output_format.formatter() {
            Some(formatter) => {
                write_output(formatter, view.export_frame()?, self.output_file.as_deref())?
            }
            None => {
                let max_rows = (!self.full).then_some(DEFAULT_MAX_ROWS);
                display_view(&view, max_rows)?;
            }
        }
        Ok(())
    }
}

/// The `chart` command prints the per-source series of one entity with their palette colours.
#[derive(Args, Debug)]
pub struct ChartCommand {
    #[command(flatten)]
    source_args: SourceArgs,
    #[arg(short = 'e', long, help = "Country or bloc to chart")]
    entity: String,
    #[arg(
        short = 's',
        long,
        value_name = "all|SOURCE,...",
        default_value = "all",
        help = "Primary sources to chart"
    )]
    sources: Selection,
    #[arg(
        short,
        long,
        value_name = "YEAR|START...|...END|START...END",
        value_parser = parse_year_ranges,
    )]
    year_range: Option<std::vec::Vec<YearRange>>,
    #[arg(long, value_name = "share|yoy", default_value = "share")]
    metric: ChartMetric,
    #[arg(long, help = "Print the chart series as JSON")]
    json: bool,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for ChartCommand {
    async fn run(&self, config: Config) -> GenmixCliResult<()> {
        info!("Running `chart` subcommand");
        let genmix = Genmix::new_with_config(config);
        let Some(table) = self.source_args.load(&genmix, self.quiet).await? else {
            return Ok(());
        };
        let view_args = ViewArgs {
            entities: Selection::only(&[self.entity.as_str()]),
            sources: self.sources.clone(),
            year_range: self.year_range.clone(),
        };
        let view = genmix.view(&table, &view_args.filters(Granularity::Monthly))?;
        let Some(chart) = chart_series(&view, &self.entity, self.metric)? else {
            println!("{NO_DATA_STRING}");
            return Ok(());
        };
        if self.json {
            println!("{}", serde_json::to_string_pretty(&chart)?);
        } else {
            display_chart(&chart)?;
        }
        Ok(())
    }
}

/// The `sources` command lists the plotted sources, their colours and the source sets they fall in.
#[derive(Args, Debug)]
pub struct SourcesCommand;

impl RunCommand for SourcesCommand {
    async fn run(&self, config: Config) -> GenmixCliResult<()> {
        info!("Running `sources` subcommand");
        display_sources(&config.pipeline.groups)?;
        Ok(())
    }
}

/// The entrypoint for the CLI.
#[derive(Parser, Debug)]
#[command(version, about="Genmix turns monthly electricity generation data into shares and trends", long_about = None, name="genmix")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    #[arg(
        short = 'q',
        long = "quiet",
        help = "\
            Do not print progress bar to stdout. Results and logs (when `RUST_LOG` is set)\n\
            will still be printed.",
        global = true
    )]
    quiet: bool,
    #[arg(
        long,
        global = true,
        help = "Path to a TOML config file. Defaults to <config dir>/genmix/config.toml"
    )]
    pub config: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        env = "EMBER_API_KEY",
        hide_env_values = true,
        help = "API key for the generation data API"
    )]
    pub api_key: Option<String>,
}

/// Commands contains the list of subcommands avaliable for use in the CLI.
/// Each command should implmement the RunCommand trait and specify the list
/// of required args for that command.
#[derive(Subcommand, Debug)]
#[enum_dispatch(RunCommand)]
pub enum Commands {
    /// Download raw monthly generation rows
    Fetch(FetchCommand),
    /// Show or export shares and percentage changes for a selection
    Table(TableCommand),
    /// Per-source chart series for one country or bloc
    Chart(ChartCommand),
    /// List sources, their colours and groups
    Sources(SourcesCommand),
}
