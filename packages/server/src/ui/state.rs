//! Shared application state.

use std::sync::Arc;

use crate::{
    config::HubConfig, domain::ConnectionRepository, infrastructure::hub::HubHandle,
    usecase::RouteMessageUseCase,
};

/// State handed to every handler
pub struct AppState {
    /// Hub（接続レジストリへの窓口）
    pub hub: HubHandle,
    /// RouteMessageUseCase（受信メッセージのルーティング）
    pub route_message_usecase: Arc<RouteMessageUseCase>,
    /// Repository（接続監査ログ）
    pub repository: Arc<dyn ConnectionRepository>,
    pub config: HubConfig,
}
