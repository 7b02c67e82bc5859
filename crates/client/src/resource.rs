//! Generic CRUD over the REST API.
//!
//! Each record type registers itself through the `Resource` trait (endpoint,
//! key field, wire shape). `ResourceClient` then provides one request
//! pipeline for all of them.

use std::sync::Arc;

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;

use hivegate_auth::TokenSource;
use hivegate_core::{Entity, RecordId};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::http::{Auth, HttpPipeline, decode};

/// A record type served under `/api/<ENDPOINT>`.
pub trait Resource: Entity + Sized + Send + Sync {
    /// Kebab-case collection name, e.g. `sensor-reading`.
    const ENDPOINT: &'static str;

    /// Updates go to `/api/<ENDPOINT>/<key>` instead of the collection.
    const UPDATE_BY_KEY: bool = false;

    /// Shape the server speaks. Often `Self`; differs where field names or
    /// encodings diverge from the domain model.
    type Wire: Serialize + DeserializeOwned + Send;

    fn to_wire(&self) -> Self::Wire;

    /// `None` when the wire record does not belong to this view.
    fn from_wire(wire: Self::Wire) -> Option<Self>;
}

/// REST client for every registered `Resource`.
///
/// Stateless apart from configuration: each call is a fresh request, and the
/// bearer token is read from the token source when the call is made.
#[derive(Clone)]
pub struct ResourceClient {
    config: Arc<GatewayConfig>,
    pipeline: HttpPipeline,
}

impl ResourceClient {
    pub fn new(config: GatewayConfig, tokens: Arc<dyn TokenSource>) -> Result<Self, GatewayError> {
        let pipeline = HttpPipeline::new(&config, tokens)?;
        Ok(Self {
            config: Arc::new(config),
            pipeline,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Read one record. A 404 is an ordinary `None`.
    pub async fn get<T: Resource>(&self, id: impl Into<i64>) -> Result<Option<T>, GatewayError> {
        let id = RecordId::new(id.into())?;
        let url = self.record_url::<T>(id);

        match self.pipeline.execute(Method::GET, &url, None, Auth::Session).await {
            Ok(body) => {
                let wire: Option<T::Wire> = decode(&body)?;
                Ok(wire.and_then(T::from_wire))
            }
            Err(err) if err.is_not_found() => {
                tracing::debug!(endpoint = T::ENDPOINT, %id, "record not found");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Read one record that must exist; absence is `NotFound`.
    pub async fn fetch<T: Resource>(&self, id: impl Into<i64>) -> Result<T, GatewayError> {
        self.get(id).await?.ok_or(GatewayError::NotFound)
    }

    /// Read the whole collection.
    pub async fn list<T: Resource>(&self) -> Result<Vec<T>, GatewayError> {
        let url = self.collection_url::<T>();
        self.list_at(&url).await
    }

    /// Read a collection nested under a parent record, e.g.
    /// `/api/hive/<apiary>/hives` or `/api/user/<id>/allowed-regions`.
    pub async fn list_related<T: Resource>(
        &self,
        parent_endpoint: &str,
        parent_id: impl Into<i64>,
        child: &str,
    ) -> Result<Vec<T>, GatewayError> {
        let parent_id = RecordId::new(parent_id.into())?;
        let url = self
            .config
            .api_url(&format!("/api/{parent_endpoint}/{parent_id}/{child}"));
        self.list_at(&url).await
    }

    /// Create a record. The key field is never sent; the server assigns it.
    pub async fn create<T: Resource>(&self, record: &T) -> Result<T, GatewayError> {
        let mut body = to_body(&record.to_wire())?;
        if let Some(object) = body.as_object_mut() {
            object.remove(T::KEY_FIELD);
        }

        let url = self.collection_url::<T>();
        let resp = self
            .pipeline
            .execute(Method::POST, &url, Some(&body), Auth::Session)
            .await?;

        let created = expect_record::<T>(&resp)?;
        tracing::info!(endpoint = T::ENDPOINT, key = ?created.key(), "record created");
        Ok(created)
    }

    /// Replace a persisted record. Records without a key are rejected
    /// before any request.
    pub async fn update<T: Resource>(&self, record: &T) -> Result<T, GatewayError> {
        let Some(key) = record.key() else {
            return Err(GatewayError::Validation(format!(
                "{} record has no {}; create it first",
                T::ENDPOINT,
                T::KEY_FIELD
            )));
        };

        let body = to_body(&record.to_wire())?;
        let url = if T::UPDATE_BY_KEY {
            self.record_url::<T>(key)
        } else {
            self.collection_url::<T>()
        };
        let resp = self
            .pipeline
            .execute(Method::PUT, &url, Some(&body), Auth::Session)
            .await?;

        tracing::info!(endpoint = T::ENDPOINT, %key, "record updated");
        expect_record::<T>(&resp)
    }

    pub async fn remove<T: Resource>(&self, id: impl Into<i64>) -> Result<(), GatewayError> {
        let id = RecordId::new(id.into())?;
        let url = self.record_url::<T>(id);
        self.pipeline
            .execute(Method::DELETE, &url, None, Auth::Session)
            .await?;

        tracing::info!(endpoint = T::ENDPOINT, %id, "record removed");
        Ok(())
    }

    /// Send an arbitrary JSON request to the REST API (auth routes, role
    /// updates and other non-CRUD endpoints).
    pub(crate) async fn send<R: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        auth: Auth<'_>,
    ) -> Result<R, GatewayError> {
        let url = self.config.api_url(path);
        let resp = self.pipeline.execute(method, &url, body, auth).await?;
        decode(&resp)
    }

    async fn list_at<T: Resource>(&self, url: &str) -> Result<Vec<T>, GatewayError> {
        let resp = self
            .pipeline
            .execute(Method::GET, url, None, Auth::Session)
            .await?;

        // The server encodes an empty collection as `null`.
        let wire: Option<Vec<T::Wire>> = decode(&resp)?;
        Ok(wire
            .unwrap_or_default()
            .into_iter()
            .filter_map(T::from_wire)
            .collect())
    }

    fn collection_url<T: Resource>(&self) -> String {
        self.config.api_url(&format!("/api/{}", T::ENDPOINT))
    }

    fn record_url<T: Resource>(&self, id: RecordId) -> String {
        self.config.api_url(&format!("/api/{}/{}", T::ENDPOINT, id))
    }
}

pub(crate) fn to_body<W: Serialize>(wire: &W) -> Result<serde_json::Value, GatewayError> {
    serde_json::to_value(wire)
        .map_err(|e| GatewayError::Validation(format!("failed to encode request body: {e}")))
}

fn expect_record<T: Resource>(body: &[u8]) -> Result<T, GatewayError> {
    let wire: T::Wire = decode(body)?;
    T::from_wire(wire).ok_or_else(|| {
        GatewayError::Transport(format!(
            "server returned a record that is not a valid {}",
            T::ENDPOINT
        ))
    })
}
