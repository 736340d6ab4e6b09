use std::sync::Arc;

use redis::aio::ConnectionManager;
use tokio::sync::OnceCell;
use tracing::warn;

use crate::{
    config::Config,
    database::{ensure_schema, init_redis},
    model::{ModelInvoker, WorkersAi},
};

pub struct AppState {
    pub config: Config,
    pub redis_connection: ConnectionManager,
    pub invoker: Arc<dyn ModelInvoker>,
    schema_ready: OnceCell<()>,
}

impl AppState {
    pub async fn new() -> Arc<Self> {
        let config = Config::load();

        let redis_connection = init_redis(&config.redis_url).await;
        let invoker = Arc::new(WorkersAi::new(&config));

        Arc::new(Self {
            config,
            redis_connection,
            invoker,
            schema_ready: OnceCell::new(),
        })
    }

    /// Schema ensured at most once per process lifetime, idempotent if re-run.
    pub async fn ensure_schema_once(&self) {
        self.schema_ready
            .get_or_init(|| async {
                let mut connection = self.redis_connection.clone();
                if let Err(e) = ensure_schema(&mut connection).await {
                    warn!("Schema init failed, continuing without marker: {e}");
                }
            })
            .await;
    }
}
