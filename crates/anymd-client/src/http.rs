//! HTTP implementation of [`RemoteStore`].
//!
//! Bearer-token auth, JSON envelopes, and a single place where raw
//! transport failures are shaped into the `AnymdError` taxonomy. The
//! engine above never sees a reqwest error.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use anymd_core::types::{CreateObject, ObjectDetail, ObjectSummary, Space, TypeInfo, UpdateObject};
use anymd_core::{AnymdError, AnymdResult, ApiError};

use crate::RemoteStore;

/// Connection settings for the remote store.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub base_url: String,
    pub token: String,
    pub timeout: Duration,
}

impl From<&anymd_core::config::ApiConfig> for HttpConfig {
    fn from(api: &anymd_core::config::ApiConfig) -> Self {
        Self {
            base_url: api.base_url.clone(),
            token: api.token.clone(),
            timeout: Duration::from_secs(api.timeout_secs),
        }
    }
}

pub struct HttpRemoteStore {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

/// Listing responses arrive as `{"data": [...]}`.
///
/// The explicit default fn keeps serde's derive from putting a
/// `T: Default` bound on the envelope; the payload types have none.
#[derive(Debug, Deserialize)]
struct ListEnvelope<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

/// Detail responses arrive as `{"object": {...}}`.
#[derive(Debug, Deserialize)]
struct ObjectEnvelope {
    object: ObjectDetail,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    types: Vec<&'a str>,
}

/// Structured error body the server returns on failure.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl HttpRemoteStore {
    pub fn new(cfg: HttpConfig) -> AnymdResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| AnymdError::RemoteUnavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            token: cfg.token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> AnymdResult<T> {
        let req = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.token)
            .send();
        decode(req.await, path).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> AnymdResult<T> {
        let req = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.token)
            .json(body)
            .send();
        decode(req.await, path).await
    }

    async fn patch_json<B: Serialize>(&self, path: &str, body: &B) -> AnymdResult<()> {
        let req = self
            .client
            .patch(self.url(path))
            .bearer_auth(&self.token)
            .json(body)
            .send();
        check(req.await, path).await
    }

    async fn delete(&self, path: &str) -> AnymdResult<()> {
        let req = self
            .client
            .delete(self.url(path))
            .bearer_auth(&self.token)
            .send();
        check(req.await, path).await
    }
}

/// Decode a JSON response body after shaping any failure.
async fn decode<T: DeserializeOwned>(
    result: Result<reqwest::Response, reqwest::Error>,
    path: &str,
) -> AnymdResult<T> {
    let resp = shape(result, path).await?;
    resp.json::<T>()
        .await
        .map_err(|e| AnymdError::ValidationFailed(format!("decoding {path}: {e}")))
}

/// Like [`decode`] but the caller only cares about success.
async fn check(
    result: Result<reqwest::Response, reqwest::Error>,
    path: &str,
) -> AnymdResult<()> {
    shape(result, path).await.map(|_| ())
}

/// Shape transport and HTTP-status failures into the error taxonomy.
///
/// A structured `{code, message}` body, when present, is preserved so
/// classification can use the code tier instead of the message
/// heuristic.
async fn shape(
    result: Result<reqwest::Response, reqwest::Error>,
    path: &str,
) -> AnymdResult<reqwest::Response> {
    let resp = match result {
        Ok(resp) => resp,
        Err(e) if e.is_timeout() || e.is_connect() => {
            return Err(AnymdError::RemoteUnavailable(format!(
                "no response from server for {path}: {e}"
            )));
        }
        Err(e) => return Err(AnymdError::RemoteUnavailable(format!("{path}: {e}"))),
    };

    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let code = status.as_u16();
    let body: Option<ErrorBody> = resp.json().await.ok();
    debug!(path, status = code, code = body.as_ref().map(|b| b.code.as_str()), "request failed");

    if let Some(body) = body {
        if !body.code.is_empty() {
            return Err(AnymdError::Api(ApiError::new(code, body.code, body.message)));
        }
    }

    Err(match code {
        401 => AnymdError::ValidationFailed(
            "authentication failed; check your API token".into(),
        ),
        403 => AnymdError::ValidationFailed("access forbidden; check your permissions".into()),
        404 => AnymdError::NotFound(format!("resource not found: {path}")),
        500..=599 => AnymdError::RemoteUnavailable(format!(
            "server error {code}; try again later"
        )),
        _ => AnymdError::ValidationFailed(format!("request to {path} failed with status {code}")),
    })
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn list_spaces(&self) -> AnymdResult<Vec<Space>> {
        let env: ListEnvelope<Space> = self.get_json("/v1/spaces").await?;
        Ok(env.data)
    }

    async fn get_space(&self, space_id: &str) -> AnymdResult<Space> {
        #[derive(Deserialize)]
        struct SpaceEnvelope {
            space: Space,
        }
        let env: SpaceEnvelope = self.get_json(&format!("/v1/spaces/{space_id}")).await?;
        Ok(env.space)
    }

    async fn list_types(&self, space_id: &str) -> AnymdResult<Vec<TypeInfo>> {
        let env: ListEnvelope<TypeInfo> =
            self.get_json(&format!("/v1/spaces/{space_id}/types")).await?;
        Ok(env.data)
    }

    async fn search_objects(
        &self,
        space_id: &str,
        type_id: &str,
    ) -> AnymdResult<Vec<ObjectSummary>> {
        let body = SearchRequest {
            query: "",
            types: vec![type_id],
        };
        let env: ListEnvelope<ObjectSummary> = self
            .post_json(&format!("/v1/spaces/{space_id}/search"), &body)
            .await?;
        Ok(env.data)
    }

    async fn list_objects(&self, space_id: &str) -> AnymdResult<Vec<ObjectSummary>> {
        let env: ListEnvelope<ObjectSummary> = self
            .get_json(&format!("/v1/spaces/{space_id}/objects?limit=100"))
            .await?;
        Ok(env.data)
    }

    async fn get_object(&self, space_id: &str, object_id: &str) -> AnymdResult<ObjectDetail> {
        let env: ObjectEnvelope = self
            .get_json(&format!("/v1/spaces/{space_id}/objects/{object_id}"))
            .await?;
        Ok(env.object)
    }

    async fn update_object(
        &self,
        space_id: &str,
        object_id: &str,
        update: &UpdateObject,
    ) -> AnymdResult<()> {
        self.patch_json(&format!("/v1/spaces/{space_id}/objects/{object_id}"), update)
            .await
    }

    async fn create_object(&self, space_id: &str, req: &CreateObject) -> AnymdResult<ObjectDetail> {
        let env: ObjectEnvelope = self
            .post_json(&format!("/v1/spaces/{space_id}/objects"), req)
            .await?;
        Ok(env.object)
    }

    async fn delete_object(&self, space_id: &str, object_id: &str) -> AnymdResult<()> {
        self.delete(&format!("/v1/spaces/{space_id}/objects/{object_id}"))
            .await
    }
}
