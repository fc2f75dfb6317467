use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use fanlink::{Fan, FanConfig, Setting};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Control a fan over its local MQTT broker
#[derive(Parser, Debug)]
#[command(name = "fanlink", version, about)]
struct Cli {
    /// Config file, defaults to <config dir>/fanlink/fanlink.toml
    #[arg(long, short)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Print the fan's current state
    Status,
    /// Print the environmental sensor readings
    Sensors,
    /// Change one setting, e.g. `set fnsp 0004`
    Set { id: String, token: String },
    /// List every known setting
    Settings,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;
    let cli = Cli::parse();

    if let CliCommand::Settings = cli.command {
        for setting in Setting::all() {
            println!("{:<6} {}", setting.id(), setting.name());
        }
        return Ok(());
    }

    let path = cli.config.unwrap_or_else(FanConfig::default_path);
    let config = FanConfig::load(&path)?;
    let fan = Fan::from_config(&config)?;

    fan.connect_with_timeout(config.connect_timeout()).await?;
    let result = run(&fan, cli.command, &config).await;
    fan.disconnect().await;
    result
}

async fn run(fan: &Fan, command: CliCommand, config: &FanConfig) -> Result<()> {
    let timeout = config.reply_timeout();

    match command {
        CliCommand::Status => {
            let status = fan.request_current_state()?.with_timeout(timeout).await?;
            println!("{}", status);
        }
        CliCommand::Sensors => {
            let data = fan.request_sensor_data()?.with_timeout(timeout).await?;
            println!("{}", data);
        }
        CliCommand::Set { id, token } => {
            let setting =
                Setting::describe(&id).ok_or_else(|| eyre!("Unknown setting: {}", id))?;
            let value = setting
                .decode(&token)
                .ok_or_else(|| eyre!("Invalid value {} for {}", token, setting))?;
            fan.set_value(value)?.with_timeout(timeout).await?;
            info!("{} set to {}", setting, token);
        }
        CliCommand::Settings => {}
    }
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
