//! Shared application state handed to every axum handler.

use std::sync::Arc;

use crate::broadcast::Broadcaster;
use crate::presence::PresenceRegistry;
use crate::router::EventRouter;
use crate::service::TaskService;

pub struct AppState {
    pub service: Arc<TaskService>,
    pub router: Arc<EventRouter>,
    pub broadcaster: Arc<Broadcaster>,
    pub presence: Arc<PresenceRegistry>,
}
