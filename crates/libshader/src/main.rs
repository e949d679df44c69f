mod bindings;
mod cli;
mod host;
mod paths;
mod run;
mod window;

use anyhow::Result;

fn main() -> Result<()> {
    let args = cli::parse();
    run::run(args)
}
