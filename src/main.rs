use std::sync::Arc;

use api_gateway::{build_client, serve, shutdown_signal, Config, GatewayState, RedisStore, TtlStore};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api_gateway=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().into_runtime().unwrap_or_else(|e| {
        eprintln!("fatal: {e}");
        std::process::exit(1);
    });

    let store: Arc<dyn TtlStore> = match RedisStore::connect(&config.redis_url).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("fatal: {e}");
            std::process::exit(1);
        }
    };

    let listen = config.listen;
    let development = config.development;
    let state = Arc::new(GatewayState::new(config, store));
    let client = build_client();

    let listener = TcpListener::bind(listen).await.unwrap_or_else(|e| {
        eprintln!("fatal: failed to bind {listen}: {e}");
        std::process::exit(1);
    });

    info!(%listen, development, "gateway listening");
    serve(listener, client, state, shutdown_signal()).await;

    // The store connection is released when the last reference drops.
    info!("gateway stopped");
}
