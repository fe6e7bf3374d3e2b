//! Realtime chat delivery server.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin chathub-server
//! cargo run --bin chathub-server -- --host 0.0.0.0 --port 3000 --coalesce-writes
//! ```

use std::{sync::Arc, time::Duration};

use chathub_server::{
    config::HubConfig,
    infrastructure::{hub::Hub, repository::InMemoryConnectionRepository},
    ui::Server,
    usecase::{RouteMessageUseCase, SweepStaleConnectionsUseCase, spawn_janitor},
};
use chathub_shared::{logger::setup_logger, time::SystemClock};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "chathub-server")]
#[command(about = "Realtime chat delivery engine over WebSocket", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,

    /// Per-connection outbox capacity (envelopes)
    #[arg(long, default_value = "256")]
    outbox_capacity: usize,

    /// Read deadline in seconds
    #[arg(long, default_value = "60")]
    read_timeout_secs: u64,

    /// Write deadline in seconds
    #[arg(long, default_value = "10")]
    write_timeout_secs: u64,

    /// Keep-alive ping interval in seconds
    #[arg(long, default_value = "30")]
    ping_interval_secs: u64,

    /// Heartbeat age in seconds after which a connection record is swept
    #[arg(long, default_value = "300")]
    stale_threshold_secs: u64,

    /// Interval between stale-connection sweeps in seconds
    #[arg(long, default_value = "60")]
    sweep_interval_secs: u64,

    /// Capacity of the queues feeding the hub
    #[arg(long, default_value = "1024")]
    hub_queue_capacity: usize,

    /// Join queued envelopes into one newline-separated frame
    #[arg(long)]
    coalesce_writes: bool,

    /// Upper bound of envelopes joined into one frame
    #[arg(long, default_value = "16")]
    max_coalesced_frames: usize,

    /// Default log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn hub_config(&self) -> HubConfig {
        HubConfig {
            outbox_capacity: self.outbox_capacity,
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            write_timeout: Duration::from_secs(self.write_timeout_secs),
            ping_interval: Duration::from_secs(self.ping_interval_secs),
            stale_threshold: Duration::from_secs(self.stale_threshold_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            hub_queue_capacity: self.hub_queue_capacity,
            coalesce_writes: self.coalesce_writes,
            max_coalesced_frames: self.max_coalesced_frames,
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), &args.log_level);

    let config = args.hub_config();
    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(2);
    }

    // Initialize dependencies in order:
    // 1. Repository and clock
    // 2. Hub
    // 3. UseCases and janitor
    // 4. Server

    // 1. Create Repository (in-memory connection audit store)
    let repository = Arc::new(InMemoryConnectionRepository::new());
    let clock = Arc::new(SystemClock);

    // 2. Start the hub task
    let (hub, handle) = Hub::new(&config, repository.clone(), clock.clone());
    let hub_task = tokio::spawn(hub.run());

    // 3. Create UseCases
    let route_message_usecase = Arc::new(RouteMessageUseCase::new(handle.clone(), clock.clone()));
    let sweep_usecase = Arc::new(SweepStaleConnectionsUseCase::new(
        repository.clone(),
        clock,
        config.stale_threshold,
    ));
    let janitor = spawn_janitor(sweep_usecase, config.sweep_interval);

    // 4. Create and run the server
    let server = Server::new(handle, route_message_usecase, repository, config);
    let result = server.run(args.host, args.port).await;

    janitor.abort();
    // Upgraded sockets outlive graceful shutdown and keep their HubHandle clones
    match tokio::time::timeout(Duration::from_secs(5), hub_task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "Hub task ended abnormally"),
        Err(_) => tracing::warn!("Hub still serving open sockets, exiting anyway"),
    }

    if let Err(e) = result {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
