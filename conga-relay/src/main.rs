use clap::Parser;
use log::{error, LevelFilter};
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use conga_relay::config::{Cli, RelayConfig};
use conga_relay::embedded;

fn init_logging() {
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|raw| raw.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info);

    let appender = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{d(%Y-%m-%dT%H:%M:%S%.3f)} {l} [{t}] {m}{n}")))
        .build();

    let config = Config::builder()
        .appender(Appender::builder().build("console", Box::new(appender)))
        .build(Root::builder().appender("console").build(level))
        .expect("logging config is well-formed");

    log4rs::init_config(config).expect("logging already initialized");
}

#[tokio::main]
async fn main() {
    init_logging();

    let cli = Cli::parse();
    let config = RelayConfig::from(cli);

    if let Err(err) = embedded::run_configured(config).await {
        error!("relay exited with error: {}", err);
        std::process::exit(1);
    }
}
