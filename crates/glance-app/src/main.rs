use anyhow::Context;
use clap::{CommandFactory, Parser};
use glance_app::cli::{Cli, Commands};
use glance_app::commands::{run, view};
use glance_app::settings::Settings;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    let mut settings = match &cli.config {
        Some(path) => Settings::load_file(path)?,
        None => Settings::default(),
    };
    cli.apply(&mut settings);

    match &cli.command {
        Some(Commands::Run(args)) => {
            args.apply(&mut settings);
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to build async runtime")?;
            let code = runtime.block_on(run::run(settings))?;
            // Don't wait on the stdin thread; it may be parked in a read.
            runtime.shutdown_background();
            if let Some(code) = code.filter(|&code| code != 0) {
                std::process::exit(i32::try_from(code).unwrap_or(1));
            }
            Ok(())
        }
        Some(Commands::Show(args)) => {
            args.apply(&mut settings);
            view::show(&settings)
        }
        Some(Commands::Watch(args)) => {
            args.apply(&mut settings);
            view::watch(&settings)
        }
        Some(Commands::Clear) => view::clear(&settings),
        None => {
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}
