use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use duplex_signal::config::RelayConfig;
use duplex_signal::signaling::SignalingServer;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = RelayConfig::parse();
    init_tracing(config.log_json);

    println!("   Duplex Signaling Relay");
    println!("   Binding to ws://{}", config.bind);
    println!("   Press Ctrl+C to stop\n");

    let server = SignalingServer::new(&config);

    tokio::select! {
        result = server.run(&config.bind) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C received, shutting down");
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
