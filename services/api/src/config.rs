use kivendi_common::{config::{env_optional, env_or, env_string}, DatabaseConfig, JwtConfig, ServerConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const KKIAPAY_LIVE_URL: &str = "https://api.kkiapay.me";
pub const KKIAPAY_SANDBOX_URL: &str = "https://api-sandbox.kkiapay.me";
pub const FCM_LEGACY_URL: &str = "https://fcm.googleapis.com/fcm/send";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub websocket: WebSocketConfig,
    pub gateway: GatewayConfig,
    pub boost: BoostConfig,
    pub push: PushConfig,
    pub storage: StorageConfig,
}

impl ApiConfig {
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig::from_env(),
            database: DatabaseConfig::from_env(),
            jwt: JwtConfig::from_env(),
            websocket: WebSocketConfig::from_env(),
            gateway: GatewayConfig::from_env(),
            boost: BoostConfig::from_env(),
            push: PushConfig::from_env(),
            storage: StorageConfig::from_env(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketConfig {
    /// Idle sockets are closed once nothing was read for this long.
    pub read_deadline_secs: u64,
    pub heartbeat_secs: u64,
    pub max_frame_bytes: usize,
    /// Frames queued per client before the hub drops it.
    pub outbound_buffer: usize,
}

impl WebSocketConfig {
    pub fn from_env() -> Self {
        Self {
            read_deadline_secs: env_or("WS_READ_DEADLINE_SECS", 600),
            heartbeat_secs: env_or("WS_HEARTBEAT_SECS", 30),
            max_frame_bytes: env_or("WS_MAX_FRAME_BYTES", 16 * 1024 * 1024),
            outbound_buffer: env_or("WS_OUTBOUND_BUFFER", 64),
        }
    }

    pub fn read_deadline(&self) -> Duration {
        Duration::from_secs(self.read_deadline_secs)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub public_key: String,
    pub private_key: String,
    pub secret_key: String,
    pub base_url: String,
    pub sandbox: bool,
    pub webhook_secret: String,
    pub timeout_secs: u64,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let sandbox = env_or("KKIAPAY_SANDBOX", true);
        let default_url = if sandbox { KKIAPAY_SANDBOX_URL } else { KKIAPAY_LIVE_URL };

        Self {
            public_key: env_string("KKIAPAY_PUBLIC_KEY", ""),
            private_key: env_string("KKIAPAY_PRIVATE_KEY", ""),
            secret_key: env_string("KKIAPAY_SECRET_KEY", ""),
            base_url: env_string("KKIAPAY_BASE_URL", default_url),
            sandbox,
            webhook_secret: env_string("KKIAPAY_WEBHOOK_SECRET", ""),
            timeout_secs: env_or("KKIAPAY_TIMEOUT_SECS", 15),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostConfig {
    pub expiration_interval_minutes: u64,
    /// Skip the paid-amount comparison and substitute the offer price when the
    /// gateway reports zero. Meant for sandbox keys only.
    pub relaxed_amount_check: bool,
}

impl BoostConfig {
    pub fn from_env() -> Self {
        Self {
            expiration_interval_minutes: env_or("BOOST_EXPIRATION_INTERVAL_MINUTES", 5),
            relaxed_amount_check: env_or("BOOST_RELAXED_AMOUNT_CHECK", false),
        }
    }

    pub fn expiration_interval(&self) -> Duration {
        Duration::from_secs(self.expiration_interval_minutes.max(1) * 60)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    pub enabled: bool,
    pub fcm_endpoint: String,
    pub fcm_server_key: Option<String>,
    pub timeout_secs: u64,
}

impl PushConfig {
    pub fn from_env() -> Self {
        Self {
            enabled: env_or("PUSH_ENABLED", false),
            fcm_endpoint: env_string("FCM_ENDPOINT", FCM_LEGACY_URL),
            fcm_server_key: env_optional("FCM_SERVER_KEY"),
            timeout_secs: env_or("PUSH_TIMEOUT_SECS", 10),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub root_dir: String,
    pub public_base_url: String,
    pub max_image_bytes: usize,
    pub max_body_bytes: usize,
}

impl StorageConfig {
    pub fn from_env() -> Self {
        Self {
            root_dir: env_string("STORAGE_ROOT", "./media"),
            public_base_url: env_string("STORAGE_PUBLIC_URL", "http://localhost:8080/media"),
            max_image_bytes: env_or("STORAGE_MAX_IMAGE_BYTES", 5 * 1024 * 1024),
            max_body_bytes: env_or("MAX_BODY_BYTES", 32 * 1024 * 1024),
        }
    }
}
