use clap::Parser;
use serde_json::json;
use telexec::config::{Cli, Config, LoggingConfig};
use telexec::session::Telnet;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = Config::load(&cli)?;
    init_logging(&config.logging);

    let mut telnet = Telnet::connect(config.connection.clone()).await?;
    tracing::info!(
        session_id = %telnet.id(),
        host = %config.connection.host,
        port = config.connection.port,
        "connected"
    );
    let prompt = telnet.ready().await?;
    tracing::debug!(prompt = %prompt, "shell prompt detected");

    for command in &cli.commands {
        let lines = telnet.exec(command).await?;
        if cli.json {
            println!("{}", json!({ "command": command, "lines": lines }));
        } else {
            for line in &lines {
                println!("{line}");
            }
        }
    }

    telnet.close().await;
    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::new(logging.level.clone());
    if logging.format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}
