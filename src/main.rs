use clap::Parser;
use follow_relay::config::Config;
use follow_relay::server;

#[tokio::main]
async fn main() {
    let config = Config::parse();
    if let Err(e) = server::run(config).await {
        eprintln!("fatal: {e}");
        std::process::exit(1);
    }
}
