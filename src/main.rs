use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{Router, routing::get};
use resona::{
    AppState,
    cache::operations::connection::{ConnectionRegistry, RedisConnectionRegistry},
    cache::operations::presence::{PresenceStore, RedisPresenceStore},
    config::Config,
    middleware::{auth_middleware, log_errors},
    presence::broadcaster::Broadcaster,
    presence::directory::{PgSocialDirectory, SocialDirectory},
    presence::discovery::DiscoveryService,
    presence::fetcher::PresenceFetcher,
    presence::notifier::ChangeNotifier,
    presence::worker,
    queue::{RedisWorkQueue, WorkQueue},
    routes,
    spotify::{PlaybackProvider, SpotifyClient},
    ws,
    ws::transport::{ConnectionTransport, LocalTransport},
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    // 设置数据库连接池
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'resona_backend';")
                    .await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    // 设置 Redis 客户端
    let redis_client =
        redis::Client::open(config.redis_url.clone()).expect("Failed to create Redis client");
    let redis_arc = Arc::new(redis_client);

    // 组装各层组件
    let directory: Arc<dyn SocialDirectory> = Arc::new(PgSocialDirectory::new(pool));
    let presence_store = Arc::new(RedisPresenceStore::new(redis_arc.clone()));
    let registry: Arc<dyn ConnectionRegistry> =
        Arc::new(RedisConnectionRegistry::new(redis_arc.clone()));
    let queue: Arc<dyn WorkQueue> = Arc::new(RedisWorkQueue::new(
        redis_arc,
        config.queue_visibility(),
    ));
    let transport = Arc::new(LocalTransport::new());
    let provider: Arc<dyn PlaybackProvider> =
        Arc::new(SpotifyClient::new(&config).expect("Failed to create Spotify client"));

    let fetcher = Arc::new(PresenceFetcher::new(
        provider,
        directory.clone(),
        presence_store.clone() as Arc<dyn PresenceStore>,
    ));
    let broadcaster = Arc::new(Broadcaster::new(
        registry.clone(),
        transport.clone() as Arc<dyn ConnectionTransport>,
    ));
    let notifier = Arc::new(ChangeNotifier::new(directory.clone(), broadcaster));
    let discovery = Arc::new(DiscoveryService::new(directory.clone(), queue.clone()));

    // 启动后台流水线
    worker::spawn_discovery(discovery, config.discovery_interval());
    worker::spawn_fetch_workers(config.fetch_worker_count, queue.clone(), fetcher);
    worker::spawn_queue_reclaimer(queue.clone());
    worker::spawn_change_notifier(presence_store.clone(), notifier);

    // 设置应用状态
    let state = AppState {
        config: config.clone(),
        directory,
        presence_store,
        registry,
        transport,
    };

    // 将路由分为公开路由和受保护路由
    let public_routes = Router::new()
        .route("/ping", get(routes::health::ping))
        .route("/ws", get(ws::ws_handler));

    let protected_routes = Router::new()
        .route("/presence/network", get(routes::presence::network))
        // 应用认证中间件
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // 创建基础路由
    let router = Router::new().nest(
        "/api",
        Router::new().merge(public_routes).merge(protected_routes),
    );

    // 添加日志中间件
    let router = router.layer(axum::middleware::from_fn(log_errors));

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        let cors = CorsLayer::permissive();
        router.layer(cors)
    };

    // 添加应用状态
    let app = router.with_state(state.clone());

    // 启动服务器
    let addr = SocketAddr::new(
        state.config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        state.config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
