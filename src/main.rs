use pawnshop_inventory::api::{self, AppState};
use pawnshop_inventory::{create_pool, AppConfig, ImportService, PgRecordStore, RecognitionService, RecordStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志 - 本地时间格式
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_target(true)
        .with_level(true)
        .init();

    // 加载配置
    let config = AppConfig::load()?;
    info!("Starting server with config: {:?}", config);

    // 创建数据库连接池
    let pool = create_pool(&config.database).await?;
    info!("Database pool created");

    let store: Arc<dyn RecordStore> = Arc::new(PgRecordStore::new(pool.clone()));
    let imports = Arc::new(
        ImportService::new(store.clone(), config.import.max_upload_bytes)
            .with_session_ttl(Duration::from_secs(config.import.session_ttl_secs)),
    );
    let recognition = Arc::new(RecognitionService::new(config.vision.clone())?);
    if !recognition.is_configured() {
        info!("Vision API key not set, photo recognition disabled");
    }

    let app = api::router(AppState {
        pool,
        store,
        imports,
        recognition,
        max_upload_bytes: config.import.max_upload_bytes,
    });

    // 启动服务器
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server listening on {}", addr);
    info!("API Endpoints:");
    info!("  POST   /api/pricing/reconcile          - 定价联动计算");
    info!("  PUT    /api/products/:id/pricing       - 更新商品定价");
    info!("  POST   /api/import/:target             - 上传 CSV, 开启导入会话");
    info!("  PUT    /api/import/sessions/:id/mapping - 调整列映射");
    info!("  POST   /api/import/sessions/:id/commit  - 批量导入");
    info!("  GET    /api/export/:target/template    - 下载导入模板");
    info!("  GET    /api/export/customers           - 导出已知客户");
    info!("  POST   /api/recognition                - 商品图片识别");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
