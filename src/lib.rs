use std::sync::Arc;

use config::Config;

pub mod cache;
pub mod config;
pub mod database;
pub mod middleware;
pub mod presence;
pub mod queue;
pub mod routes;
pub mod spotify;
pub mod utils;
pub mod ws;

use cache::operations::connection::ConnectionRegistry;
use cache::operations::presence::RedisPresenceStore;
use presence::directory::SocialDirectory;
use ws::transport::LocalTransport;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub directory: Arc<dyn SocialDirectory>,
    pub presence_store: Arc<RedisPresenceStore>,
    pub registry: Arc<dyn ConnectionRegistry>,
    pub transport: Arc<LocalTransport>,
}
