use std::sync::Arc;

use jota_db::ConversationStore;
use jota_domain::config::Config;
use jota_inference::InferenceClient;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn ConversationStore>,
    pub inference: Arc<InferenceClient>,
}
