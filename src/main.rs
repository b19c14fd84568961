use std::io;
use std::process;

use anyhow::Result;

use polystore::cli::Cli;
use polystore::commands::Demos;
use polystore::dispatch::Dispatcher;
use polystore::logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::init();
    logging::init(cli.log_level);

    let mut dispatcher = Dispatcher::new(Demos::new(cli.config()));
    let outcome = dispatcher
        .dispatch(&mut io::stdin().lock(), &mut io::stdout())
        .await?;

    let code = outcome.exit_code();
    if code != 0 {
        process::exit(code);
    }
    Ok(())
}
