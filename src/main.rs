use msgjournal::clock::SystemClock;
use msgjournal::config::JournalConfig;
use msgjournal::journal::Journal;
use msgjournal::server::grpc::{proto, LogService};
use proto::log_server::LogServer;
use std::path::PathBuf;
use std::sync::Arc;
use tonic::transport::Server;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("starting msgjournal gRPC server");

    let mut config = JournalConfig::default();
    config.journal_directory = PathBuf::from("data");

    let mut journal = Journal::open(config.clone(), Arc::new(SystemClock))?;
    journal.start(config);
    let journal = Arc::new(journal);

    info!(directory = "./data", "journal opened");

    let log_service = LogService::new(journal.clone());

    let addr = "[::1]:50051".parse()?;
    info!(%addr, "server listening");

    Server::builder()
        .add_service(LogServer::new(log_service))
        .serve(addr)
        .await?;

    Ok(())
}
