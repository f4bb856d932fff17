use chrono::NaiveTime;
use chrono_tz::Tz;
use clap::Parser;
use std::path::PathBuf;

use crate::validation::{parse_report_time, parse_timezone};

mod channel_flags;
mod gateway_flags;
mod reporting_flags;

pub use channel_flags::CliChannelFlags;
pub use gateway_flags::CliGatewayFlags;
pub use reporting_flags::CliReportingFlags;

#[derive(Debug, Parser)]
#[command(
    name = "tally",
    about = "Activity log service with a web dashboard, chat commands and a daily digest",
    version
)]
pub struct Cli {
    #[arg(
        long = "db-path",
        env = "TALLY_DB_PATH",
        default_value = ".tally/tally.sqlite",
        help = "SQLite database holding log entries and dashboard users"
    )]
    pub db_path: PathBuf,

    #[arg(
        long,
        env = "TALLY_TIMEZONE",
        default_value = "UTC",
        value_parser = parse_timezone,
        help = "IANA timezone that defines \"today\" for reports and chat commands"
    )]
    pub timezone: Tz,

    #[arg(
        long = "report-time",
        env = "TALLY_REPORT_TIME",
        default_value = "18:00",
        value_parser = parse_report_time,
        help = "Local wall-clock time (HH:MM) of the daily digest"
    )]
    pub report_time: NaiveTime,

    #[command(flatten)]
    pub channel: CliChannelFlags,

    #[command(flatten)]
    pub gateway: CliGatewayFlags,

    #[command(flatten)]
    pub reporting: CliReportingFlags,
}
