use anyhow::Result;
use log::info;
use openxr_playground::config::{Command, Options, USAGE};
use openxr_playground::{desktop, playground};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let options = match Options::from_env()? {
        Command::Help => {
            print!("{}", USAGE);
            return Ok(());
        }
        Command::Run(options) => options,
    };
    info!("{:?}", options);

    if options.desktop {
        desktop::run()
    } else {
        playground::run(&options)
    }
}
