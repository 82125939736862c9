use clap::Parser;
use log::warn;
use std::process::ExitCode;
use std::time::Duration;

use aprs_feed::{FeedSettings, DEFAULT_HOST, DEFAULT_PORT};

#[derive(Parser)]
#[command(name = "aprs-feed")]
#[command(version)]
#[command(about = "Print the raw feed of an APRS-IS server")]
struct Cli {
    /// APRS-IS server host
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// APRS-IS server port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Callsign to log in with
    #[arg(short, long, default_value = "N0CALL")]
    callsign: String,

    /// APRS-IS passcode (-1 logs in receive-only)
    #[arg(short, long, default_value = "-1", allow_hyphen_values = true)]
    passcode: String,

    /// Server-side filter, e.g. "r/55/-4/600" (only honoured on filtered ports)
    #[arg(short, long)]
    filter: Option<String>,

    /// Give up connecting after this many seconds
    #[arg(long)]
    connect_timeout: Option<u64>,
}

impl Cli {
    fn settings(&self) -> FeedSettings {
        let mut settings = FeedSettings::new(
            self.host.clone(),
            self.port,
            self.callsign.clone(),
            self.passcode.clone(),
        );
        if let Some(filter) = &self.filter {
            settings = settings.with_filter(filter.clone());
        }
        if let Some(secs) = self.connect_timeout {
            settings = settings.with_connect_timeout(Duration::from_secs(secs));
        }
        settings
    }
}

async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for Ctrl+C, running until the server disconnects: {}", e);
        futures::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    pretty_env_logger::init();

    let cli = Cli::parse();
    let settings = cli.settings();

    let mut stdout = std::io::stdout();
    match aprs_feed::run(&settings, &mut stdout, interrupted()).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
