use anyhow::Result;
use clap::Parser;

use vladsearch::cli::SubCommandExtend;
use vladsearch::config::{Opts, SubCommand};

fn main() -> Result<()> {
    env_logger::init();

    let opts = Opts::parse();
    match &opts.subcmd {
        SubCommand::Build(cmd) => cmd.run(&opts),
        SubCommand::Search(cmd) => cmd.run(&opts),
    }
}
