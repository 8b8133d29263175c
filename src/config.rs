use ::config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// 应用配置
///
/// 加载顺序 (后者覆盖前者): 内置默认值 -> pawnshop.toml (可选)
/// -> PAWNSHOP__<SECTION>__<KEY> 环境变量 -> DATABASE_URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub import: ImportConfig,
    pub vision: VisionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// 上传文件大小上限 (字节)
    pub max_upload_bytes: usize,
    /// 未提交的导入会话保留时长 (秒)
    pub session_ttl_secs: u64,
}

/// 图片识别 (OpenAI 兼容接口)
#[derive(Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

// 不在日志中输出 api_key
impl std::fmt::Debug for VisionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "****"))
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl AppConfig {
    /// 从配置文件与环境变量加载配置
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder()?
            .add_source(File::with_name("pawnshop").required(false))
            .add_source(Environment::with_prefix("PAWNSHOP").separator("__"))
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .build()?
            .try_deserialize()
    }

    fn builder() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("database.url", "postgres://localhost/pawnshop")?
            .set_default("database.max_connections", 20)?
            .set_default("import.max_upload_bytes", 10 * 1024 * 1024)?
            .set_default("import.session_ttl_secs", 3600)?
            .set_default("vision.endpoint", "https://api.openai.com/v1")?
            .set_default("vision.model", "gpt-4o-mini")?
            .set_default("vision.timeout_secs", 30)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "postgres://localhost/pawnshop".to_string(),
                max_connections: 20,
            },
            import: ImportConfig {
                max_upload_bytes: 10 * 1024 * 1024,
                session_ttl_secs: 3600,
            },
            vision: VisionConfig {
                endpoint: "https://api.openai.com/v1".to_string(),
                api_key: None,
                model: "gpt-4o-mini".to_string(),
                timeout_secs: 30,
            },
        }
    }
}
