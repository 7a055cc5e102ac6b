use std::sync::Arc;

use application::GatewayApp;
use config::Config;

#[derive(Clone)]
pub struct AppState {
    pub app: Arc<GatewayApp>,
    pub config: Arc<Config>,
}
