//! Server execution logic.

use std::{future::Future, net::SocketAddr, sync::Arc};

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::{
    config::HubConfig, domain::ConnectionRepository, infrastructure::hub::HubHandle,
    usecase::RouteMessageUseCase,
};

use super::{
    handler::{
        get_chat_subscribers, get_online_users, get_stats, get_user_presence, health_check,
        post_chat_event, websocket_handler,
    },
    signal::shutdown_signal,
    state::AppState,
};

/// Realtime chat delivery server
///
/// The hub must already be running; the server only accepts connections and
/// hands them to it.
///
/// # Example
///
/// ```ignore
/// let (hub, handle) = Hub::new(&config, repository.clone(), clock.clone());
/// tokio::spawn(hub.run());
/// let usecase = Arc::new(RouteMessageUseCase::new(handle.clone(), clock));
/// Server::new(handle, usecase, repository, config)
///     .run("127.0.0.1".to_string(), 8080)
///     .await?;
/// ```
pub struct Server {
    state: Arc<AppState>,
}

impl Server {
    pub fn new(
        hub: HubHandle,
        route_message_usecase: Arc<RouteMessageUseCase>,
        repository: Arc<dyn ConnectionRepository>,
        config: HubConfig,
    ) -> Self {
        Self {
            state: Arc::new(AppState {
                hub,
                route_message_usecase,
                repository,
                config,
            }),
        }
    }

    /// Build the axum router
    pub fn router(&self) -> Router {
        Router::new()
            // WebSocket エンドポイント
            .route("/ws", get(websocket_handler))
            // HTTP エンドポイント
            .route("/api/health", get(health_check))
            .route("/api/stats", get(get_stats))
            .route("/api/users/{user_id}/presence", get(get_user_presence))
            .route("/api/presence/online", get(get_online_users))
            .route("/api/chats/{chat_id}/subscribers", get(get_chat_subscribers))
            .route("/api/chats/{chat_id}/events", post(post_chat_event))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Run the server until Ctrl+C or SIGTERM
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to `host:port` or if
    /// serving fails.
    pub async fn run(self, host: String, port: u16) -> Result<(), Box<dyn std::error::Error>> {
        let bind_addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&bind_addr).await?;

        tracing::info!(
            addr = %listener.local_addr()?,
            "Chat delivery server listening"
        );
        tracing::info!("Connect to: ws://{}/ws?user_id=<user>", bind_addr);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        self.serve(listener, shutdown_signal()).await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
    }
}
