use std::marker::PhantomData;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::{auth::AuthGate, entity::SyncEntity};

/// Remote source of truth for one entity type.
#[async_trait]
pub trait Repository<T: SyncEntity>: Send + Sync {
    async fn fetch(&self, id: Uuid) -> anyhow::Result<Option<T>>;
    /// Everything changed after `since`, tombstones included. `None` lists
    /// live entities only.
    async fn list(&self, since: Option<OffsetDateTime>) -> anyhow::Result<Vec<T>>;
    async fn create(&self, entity: &T) -> anyhow::Result<T>;
    /// `None` when the server no longer has the entity.
    async fn update(&self, entity: &T) -> anyhow::Result<Option<T>>;
    async fn delete(&self, id: Uuid) -> anyhow::Result<()>;
}

/// Talks to the PackRat REST API with the gate's bearer token.
pub struct HttpRepository<T> {
    http: reqwest::Client,
    base_url: String,
    auth: AuthGate,
    _entity: PhantomData<fn() -> T>,
}

impl<T: SyncEntity> HttpRepository<T> {
    /// `base_url` points at the `/api` root, e.g. `https://host/api`.
    pub fn new(base_url: impl Into<String>, auth: AuthGate) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
            _entity: PhantomData,
        }
    }

    fn request(&self, method: Method, path: &str) -> anyhow::Result<reqwest::RequestBuilder> {
        let token = self.auth.token().context("not signed in")?;
        Ok(self
            .http
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(token))
    }
}

#[async_trait]
impl<T: SyncEntity> Repository<T> for HttpRepository<T> {
    async fn fetch(&self, id: Uuid) -> anyhow::Result<Option<T>> {
        let res = self
            .request(Method::GET, &T::resource_path(id))?
            .send()
            .await
            .with_context(|| format!("fetch {} {id}", T::KIND))?;
        if res.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let entity = res.error_for_status()?.json().await.context("decode entity")?;
        Ok(Some(entity))
    }

    async fn list(&self, since: Option<OffsetDateTime>) -> anyhow::Result<Vec<T>> {
        let mut req = self.request(Method::GET, T::list_path())?;
        if let Some(since) = since {
            req = req.query(&[("updatedSince", since.format(&Rfc3339)?)]);
        }
        let rows: Vec<T> = req
            .send()
            .await
            .with_context(|| format!("list {}", T::KIND))?
            .error_for_status()?
            .json()
            .await
            .context("decode entity list")?;
        debug!(kind = T::KIND, count = rows.len(), "pulled changes");
        Ok(rows)
    }

    async fn create(&self, entity: &T) -> anyhow::Result<T> {
        let res = self
            .request(Method::POST, &entity.collection_path())?
            .json(&entity.write_body())
            .send()
            .await
            .with_context(|| format!("create {} {}", T::KIND, entity.id()))?;
        // A retried create that already landed.
        if res.status() == StatusCode::CONFLICT {
            return self
                .fetch(entity.id())
                .await?
                .with_context(|| format!("{} {} conflicts but cannot be fetched", T::KIND, entity.id()));
        }
        Ok(res.error_for_status()?.json().await.context("decode created entity")?)
    }

    async fn update(&self, entity: &T) -> anyhow::Result<Option<T>> {
        let method = Method::from_bytes(T::UPDATE_METHOD.as_bytes())?;
        let res = self
            .request(method, &T::resource_path(entity.id()))?
            .json(&entity.write_body())
            .send()
            .await
            .with_context(|| format!("update {} {}", T::KIND, entity.id()))?;
        // Deleted on the server; retrying cannot succeed.
        if res.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let entity = res.error_for_status()?.json().await.context("decode updated entity")?;
        Ok(Some(entity))
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<()> {
        let res = self
            .request(Method::DELETE, &T::resource_path(id))?
            .send()
            .await
            .with_context(|| format!("delete {} {id}", T::KIND))?;
        // Already gone is as good as deleted.
        if res.status() != StatusCode::NOT_FOUND {
            res.error_for_status()?;
        }
        Ok(())
    }
}
