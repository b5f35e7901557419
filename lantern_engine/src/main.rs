use anyhow::Result;

mod cli;
mod manifest;
mod provider;
mod runtime;
mod script;

fn main() -> Result<()> {
    env_logger::init();

    match cli::parse()? {
        cli::Command::Run(args) => runtime::run(args),
        cli::Command::Verify(args) => runtime::verify(args),
    }
}
