mod config;
mod ingest;
mod matching;
mod render;
mod server;
mod storage;
#[cfg(test)]
mod test_utils;

use config::MatchViewConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let config = MatchViewConfig::load();
    server::app::run(config).await
}
