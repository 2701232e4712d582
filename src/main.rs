use anyhow::Context;

use gator::commands::CommandRegistry;
use gator::{App, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = Config::config_path();
    let config = Config::load_from(&config_path)
        .with_context(|| format!("couldn't load config from {}", config_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(config.log_level().into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let registry = CommandRegistry::with_builtin_commands();

    let mut args = std::env::args().skip(1);
    let Some(command) = args.next() else {
        anyhow::bail!(
            "usage: gator <command> [args...]\ncommands: {}",
            registry.names().join(", ")
        );
    };
    let args: Vec<String> = args.collect();

    let mut app = App::new(config, config_path)
        .await
        .context("couldn't open the database")?;

    registry
        .run(&mut app, &command, &args)
        .await
        .with_context(|| format!("{} failed", command))?;

    Ok(())
}
