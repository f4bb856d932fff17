//! CLI argument models and value parsers for the tally binary.
//!
//! Every flag has a `TALLY_*` environment binding so the service can be
//! configured entirely from the environment.

pub mod cli_args;
pub mod validation;

pub use cli_args::{Cli, CliChannelFlags, CliGatewayFlags, CliReportingFlags};
pub use validation::*;
