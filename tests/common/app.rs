use std::sync::Arc;

use axum::Router;
use tempfile::TempDir;
use tokio::sync::broadcast;

use convoform_backend::config::{Config, LLMConfig, PlanConfig, RateLimitConfig, WorkerConfig};
use convoform_backend::routes::build_app;
use convoform_backend::state::AppState;
use convoform_backend::store::Store;

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub config: Config,
    _temp_dir: TempDir,
}

pub struct TestOptions {
    pub api_limit: u64,
    pub submission_limit: u64,
    pub llm_enabled: bool,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            api_limit: 1000,
            submission_limit: 200,
            llm_enabled: true,
        }
    }
}

pub async fn spawn_with(options: TestOptions) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let sled_path = temp_dir.path().join("convoform-test.sled");

    // 直接构造 Config，避免使用 set_var 造成多线程测试环境变量竞态
    let config = Config {
        host: std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
        port: 3000,
        log_level: "info".to_string(),
        enable_file_logs: false,
        log_dir: "./logs".to_string(),
        sled_path: sled_path.to_string_lossy().to_string(),
        jwt_secret: format!("integration-test-jwt-secret-{}", uuid::Uuid::new_v4()),
        jwt_expires_in_hours: 24,
        cors_origin: "http://localhost:5173".to_string(),
        trust_proxy: false,
        rate_limit: RateLimitConfig {
            window_secs: 60,
            max_requests: options.api_limit,
        },
        worker: WorkerConfig { is_leader: false },
        llm: LLMConfig {
            enabled: options.llm_enabled,
            mock: true,
            api_url: String::new(),
            api_key: String::new(),
            model: String::new(),
            temperature: 0.0,
            timeout_secs: 30,
        },
        plan: PlanConfig {
            submission_limit: options.submission_limit,
        },
    };

    let store = Arc::new(Store::open(&config.sled_path).expect("open store"));
    store.run_migrations().expect("run migrations");

    let (shutdown_tx, _) = broadcast::channel::<()>(8);
    let state = AppState::new(store, &config, shutdown_tx);
    let app = build_app(state.clone());

    TestApp {
        app,
        state,
        config,
        _temp_dir: temp_dir,
    }
}

pub async fn spawn_test_server() -> TestApp {
    spawn_with(TestOptions::default()).await
}

pub async fn spawn_test_server_with_api_limit(api_limit: u64) -> TestApp {
    spawn_with(TestOptions {
        api_limit,
        ..TestOptions::default()
    })
    .await
}
