use clap::Parser;
use clap_complete::Shell;

use crate::client::commands::policy::{CheckOpts, DecideOpts};
use crate::client::commands::schedule::CronOpts;
use crate::client::output::OutputMode;

// Common CLI options
#[derive(Parser)]
pub struct CommonOpts {
    /// Sets output formatting
    #[arg(
        long,
        env = "NODESCALE_OUTPUT_MODE",
        default_value_t = OutputMode::Cli,
        value_enum,
        global = true,
        help_heading("GLOBAL OPTIONS"),
        hide_short_help(true)
    )]
    pub output_mode: OutputMode,

    /// Enables more detailed log output
    #[arg(
        long,
        env = "NODESCALE_DEBUG",
        global = true,
        help_heading("GLOBAL OPTIONS"),
        hide_short_help(true)
    )]
    pub debug: bool,
}

// Root CLI options
#[derive(Parser)]
#[command(
    author,
    about,
    version(crate::NODESCALE_VERSION),
    disable_help_subcommand(true),
    help_expected(true)
)]
pub struct RootOptions {
    #[clap(flatten)]
    pub common: CommonOpts,

    #[clap(subcommand)]
    pub subcmd: SubCommand,
}

#[derive(Parser)]
pub enum SubCommand {
    /// Load and validate a policy configuration file
    Check(CheckOpts),
    /// Print the next fire times of a cron expression
    Cron(CronOpts),
    /// Compute the scaling decision for the given pool state, without acquiring or releasing
    /// anything
    Decide(DecideOpts),
    /// Generate shell completion script
    GenerateCompletion(GenerateCompletionOpts),
}

#[derive(Parser)]
pub struct GenerateCompletionOpts {
    /// Shell flavour for which the completion script should be generated
    #[arg(value_enum)]
    pub shell: Shell,
}
