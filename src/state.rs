use crate::auth::{
    jwt::JwtKeys,
    password,
    memory::InMemoryUserRepository,
    repo::{PgUserRepository, UserRepository},
    services::AccountService,
};
use crate::config::{AppConfig, JwtConfig};
use crate::db;
use axum::extract::FromRef;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub accounts: Arc<AccountService>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        password::warm_up()?;

        let repo: Arc<dyn UserRepository> = match config.database_url.as_deref() {
            Some(url) => {
                let pool = db::connect(url, config.db_max_connections).await?;
                db::migrate(&pool).await;
                Arc::new(PgUserRepository::new(pool))
            }
            None => {
                tracing::warn!("DATABASE_URL not set; users are kept in memory only");
                Arc::new(InMemoryUserRepository::new())
            }
        };

        Ok(Self::from_parts(config, repo))
    }

    pub fn from_parts(config: Arc<AppConfig>, repo: Arc<dyn UserRepository>) -> Self {
        let keys = JwtKeys::from_config(&config.jwt);
        let accounts = Arc::new(AccountService::new(repo, keys));
        Self { config, accounts }
    }

    /// In-memory state with a fixed test secret.
    pub fn fake() -> Self {
        let config = Arc::new(AppConfig {
            database_url: None,
            db_max_connections: 1,
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test".into(),
                audience: "test".into(),
                ttl_minutes: 60 * 24,
            },
            host: "127.0.0.1".into(),
            port: 0,
        });
        Self::from_parts(config, Arc::new(InMemoryUserRepository::new()))
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.accounts.keys().clone()
    }
}
