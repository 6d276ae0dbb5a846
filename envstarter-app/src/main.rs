use clap::Parser;
use envstarter_app::cli::{Cli, Commands};
use envstarter_app::config::Config;
use envstarter_app::{commands, init_logging};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("❌ {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    match &cli.command {
        Commands::List => commands::list::run(&config).await,
        Commands::Launch(args) => commands::launch::run(&config, args).await,
        Commands::Status => commands::status::run(&config, cli.config.as_deref()).await,
    }
}
