use std::sync::Arc;

use sqlx::PgPool;
use tracing::{info, warn};

use crate::auth::{IdentityVerifier, JwksVerifier};
use crate::chat::{ChatModel, OpenAiChat};
use crate::config::AppConfig;
use crate::mailer::{LogMailer, Mailer, ResendMailer};
use crate::storage::{Storage, StorageClient};
use crate::weather::{WeatherApiClient, WeatherProvider};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn StorageClient>,
    pub weather: Arc<dyn WeatherProvider>,
    pub llm: Arc<dyn ChatModel>,
    pub mailer: Arc<dyn Mailer>,
    pub identity: Arc<dyn IdentityVerifier>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await?;

        let storage = Arc::new(Storage::new(&config.storage).await?) as Arc<dyn StorageClient>;

        let p = &config.providers;
        if p.weather_api_key.is_none() {
            warn!("WEATHER_API_KEY not set; weather endpoints will fail");
        }
        if p.openai_api_key.is_none() {
            warn!("OPENAI_API_KEY not set; chat will fail");
        }
        let weather = Arc::new(WeatherApiClient::new(p.weather_api_key.clone())) as Arc<dyn WeatherProvider>;
        let llm = Arc::new(OpenAiChat::new(p.openai_api_key.clone(), p.openai_model.clone()))
            as Arc<dyn ChatModel>;
        let mailer: Arc<dyn Mailer> = match &p.resend_api_key {
            Some(key) => Arc::new(ResendMailer::new(key.clone(), p.email_from.clone())),
            None => {
                info!("RESEND_API_KEY not set; emails go to the log");
                Arc::new(LogMailer)
            }
        };
        let identity = Arc::new(JwksVerifier::new(
            p.google_client_id.clone(),
            p.apple_client_id.clone(),
        )) as Arc<dyn IdentityVerifier>;

        Ok(Self {
            db,
            config,
            storage,
            weather,
            llm,
            mailer,
            identity,
        })
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        use async_trait::async_trait;
        use futures::{stream, StreamExt};

        use crate::auth::{ExternalIdentity, Provider};
        use crate::chat::{ChatMessage, Role, TextStream};
        use crate::weather::{Condition, CurrentConditions, Forecast, Location};

        struct FakeStorage;
        #[async_trait]
        impl StorageClient for FakeStorage {
            async fn presign_put(&self, k: &str, _ct: &str, _s: u64) -> anyhow::Result<String> {
                Ok(format!("https://fake.local/{}?upload", k))
            }
            async fn presign_get(&self, k: &str, _s: u64) -> anyhow::Result<String> {
                Ok(format!("https://fake.local/{}", k))
            }
        }

        struct FakeWeather;
        #[async_trait]
        impl WeatherProvider for FakeWeather {
            async fn search(&self, q: &str) -> anyhow::Result<Vec<Location>> {
                Ok(vec![Location {
                    id: Some(1),
                    name: q.to_string(),
                    region: "Bern".into(),
                    country: "Switzerland".into(),
                    lat: 46.5,
                    lon: 7.9,
                }])
            }
            async fn forecast(&self, lat: f64, lon: f64, _days: u8) -> anyhow::Result<Forecast> {
                Ok(Forecast {
                    location: Location {
                        id: None,
                        name: "Fake Peak".into(),
                        region: String::new(),
                        country: String::new(),
                        lat,
                        lon,
                    },
                    current: CurrentConditions {
                        temp_c: 4.0,
                        feels_like_c: 1.0,
                        wind_kph: 20.0,
                        humidity: 70.0,
                        condition: Condition {
                            text: "Light snow".into(),
                            icon: String::new(),
                            code: 1213,
                        },
                    },
                    days: vec![],
                })
            }
        }

        struct EchoModel;
        #[async_trait]
        impl ChatModel for EchoModel {
            async fn stream(&self, messages: Vec<ChatMessage>) -> anyhow::Result<TextStream> {
                let last = messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.clone())
                    .unwrap_or_default();
                let reply: anyhow::Result<String> = Ok(format!("You asked: {last}"));
                Ok(stream::iter(vec![reply]).boxed())
            }
        }

        struct RejectingIdentity;
        #[async_trait]
        impl IdentityVerifier for RejectingIdentity {
            async fn verify(&self, provider: Provider, _t: &str) -> anyhow::Result<ExternalIdentity> {
                anyhow::bail!("{provider:?} tokens are not accepted in tests")
            }
        }

        let config = AppConfig::for_tests();
        let db = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .expect("lazy pool ok");

        Self {
            db,
            config: Arc::new(config),
            storage: Arc::new(FakeStorage),
            weather: Arc::new(FakeWeather),
            llm: Arc::new(EchoModel),
            mailer: Arc::new(LogMailer),
            identity: Arc::new(RejectingIdentity),
        }
    }
}
