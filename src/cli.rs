use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use ratewatch::element::{DEFAULT_PATTERN, DEFAULT_UNKNOWN};
use ratewatch::{AverageKind, SpeedElement, TrackerConfig, Units};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub tracker: TrackerOpts,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Copy stdin to stdout and show the transfer rate on stderr
    Pipe(Pipe),
    /// Show the growth rate of one or more files
    Watch(Watch),
    /// Print rates for a JSON-lines snapshot recording
    Replay {
        /// Recording to read
        file: PathBuf,
        /// Output format
        #[arg(long, value_enum, default_value_t = ReplayFormat::Text)]
        format: ReplayFormat,
    },
}

#[derive(Args, Clone, Debug)]
pub struct TrackerOpts {
    /// Minimum time between two rate samples, in milliseconds
    #[arg(long, global = true, default_value_t = 500)]
    pub min_interval_ms: u64,

    /// Approximate number of samples the moving average spans
    #[arg(long, global = true, default_value_t = 30.0)]
    pub age: f64,

    /// Moving average flavour
    #[arg(long, global = true, value_enum, default_value_t = AverageOpt::Simple)]
    pub average: AverageOpt,
}

impl From<&TrackerOpts> for TrackerConfig {
    fn from(v: &TrackerOpts) -> Self {
        TrackerConfig::default()
            .with_min_interval(Duration::from_millis(v.min_interval_ms))
            .with_age(v.age)
            .with_average(v.average.clone().into())
    }
}

#[derive(Args, Clone, Debug)]
pub struct DisplayOpts {
    /// Unit used to print the rate
    #[arg(long, value_enum, default_value_t = UnitsOpt::Bytes)]
    pub units: UnitsOpt,

    /// Rate pattern; `{}` is replaced with the formatted amount
    #[arg(long, default_value = DEFAULT_PATTERN)]
    pub format: String,

    /// Shown while no rate estimate is available
    #[arg(long, default_value = DEFAULT_UNKNOWN)]
    pub unknown: String,

    /// Display refresh period, in milliseconds
    #[arg(long, default_value_t = 200)]
    pub refresh_ms: u64,
}

impl From<&DisplayOpts> for SpeedElement {
    fn from(v: &DisplayOpts) -> Self {
        SpeedElement::new(v.units.clone().into())
            .with_pattern(v.format.clone())
            .with_unknown(v.unknown.clone())
    }
}

#[derive(Parser, Clone, Debug)]
pub struct Pipe {
    #[command(flatten)]
    pub display: DisplayOpts,

    /// Do not draw the live status line
    #[arg(long)]
    pub quiet: bool,

    /// Channel capacity between the stdin reader and the stdout writer
    #[arg(long, default_value_t = 64)]
    pub buffer: usize,
}

#[derive(Parser, Clone, Debug)]
pub struct Watch {
    /// Files to watch
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    #[command(flatten)]
    pub display: DisplayOpts,

    /// Log rates instead of drawing a terminal UI
    #[arg(long)]
    pub plain: bool,
}

#[derive(ValueEnum, Clone, Debug)]
pub enum AverageOpt {
    Simple,
    Variable,
}

impl From<AverageOpt> for AverageKind {
    fn from(v: AverageOpt) -> Self {
        match v {
            AverageOpt::Simple => AverageKind::Simple,
            AverageOpt::Variable => AverageKind::Variable,
        }
    }
}

#[derive(ValueEnum, Clone, Debug)]
pub enum UnitsOpt {
    Plain,
    Bytes,
    BytesDec,
}

impl From<UnitsOpt> for Units {
    fn from(v: UnitsOpt) -> Self {
        match v {
            UnitsOpt::Plain => Units::Default,
            UnitsOpt::Bytes => Units::Bytes,
            UnitsOpt::BytesDec => Units::BytesDec,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum ReplayFormat {
    Text,
    Json,
}
