use std::io;

use clap::{CommandFactory, FromArgMatches};
use clap_complete::generate;

use nodescale::client::commands::policy::{command_check, command_decide};
use nodescale::client::commands::schedule::command_cron;
use nodescale::client::output::create_output;
use nodescale::common::cli::{GenerateCompletionOpts, RootOptions, SubCommand};
use nodescale::common::setup::setup_logging;

fn generate_completion(opts: GenerateCompletionOpts) -> anyhow::Result<()> {
    let generator = opts.shell;

    let mut app = RootOptions::command();
    eprintln!("Generating completion file for {generator}...");
    generate(generator, &mut app, "nodescale".to_string(), &mut io::stdout());
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> nodescale::Result<()> {
    let matches = RootOptions::command().get_matches();
    let top_opts = match RootOptions::from_arg_matches(&matches) {
        Ok(opts) => opts,
        Err(error) => error.exit(),
    };

    setup_logging(top_opts.common.debug);

    let output = create_output(top_opts.common.output_mode);

    let result = match top_opts.subcmd {
        SubCommand::Check(opts) => command_check(output.as_ref(), opts),
        SubCommand::Cron(opts) => command_cron(output.as_ref(), opts),
        SubCommand::Decide(opts) => command_decide(output.as_ref(), opts),
        SubCommand::GenerateCompletion(opts) => generate_completion(opts),
    };

    if let Err(e) = result {
        output.print_error(e);
        std::process::exit(1);
    }

    Ok(())
}
