//! JSON-over-HTTP remote (JSONPlaceholder-style `/posts` resource).

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use quotesync_engine::{Record, RemoteId};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{RawRecord, RemoteError, RemoteSource};

/// Remote reached over HTTP with reqwest.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct Post {
    #[serde(default)]
    id: serde_json::Value,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    body: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewPost<'a> {
    title: &'a str,
    body: &'a str,
    user_id: u32,
}

#[derive(Debug, Deserialize)]
struct Created {
    #[serde(default)]
    id: serde_json::Value,
}

impl HttpRemote {
    /// Build a client for `base_url` with a per-request `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn posts_url(&self) -> String {
        format!("{}/posts", self.base_url)
    }
}

/// Remote ids arrive as numbers or strings; anything else counts as absent.
fn remote_id(value: serde_json::Value) -> Option<RemoteId> {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn transport(error: reqwest::Error) -> RemoteError {
    if error.is_decode() {
        RemoteError::Decode(error.to_string())
    } else {
        RemoteError::Network(error.to_string())
    }
}

/// Run `call` unless `cancel` fires first.
async fn cancellable<T>(
    cancel: &CancellationToken,
    call: impl Future<Output = Result<T, RemoteError>>,
) -> Result<T, RemoteError> {
    if cancel.is_cancelled() {
        return Err(RemoteError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RemoteError::Cancelled),
        result = call => result,
    }
}

#[async_trait]
impl RemoteSource for HttpRemote {
    async fn fetch(
        &self,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawRecord>, RemoteError> {
        let call = async {
            let response = self
                .client
                .get(self.posts_url())
                .query(&[("_limit", limit)])
                .send()
                .await
                .map_err(transport)?;

            let status = response.status();
            if !status.is_success() {
                return Err(RemoteError::Status(status.as_u16()));
            }

            let posts: Vec<Post> = response
                .json()
                .await
                .map_err(|e| RemoteError::Decode(e.to_string()))?;

            Ok(posts
                .into_iter()
                .take(limit)
                .map(|post| RawRecord {
                    remote_id: remote_id(post.id),
                    title: post.title.unwrap_or_default(),
                    body: post.body.unwrap_or_default(),
                })
                .collect())
        };

        cancellable(cancel, call).await
    }

    async fn push(
        &self,
        record: &Record,
        cancel: &CancellationToken,
    ) -> Result<RemoteId, RemoteError> {
        let call = async {
            let response = self
                .client
                .post(self.posts_url())
                .json(&NewPost {
                    title: &record.category,
                    body: &record.text,
                    user_id: 1,
                })
                .send()
                .await
                .map_err(transport)?;

            let status = response.status();
            if !status.is_success() {
                return Err(RemoteError::Status(status.as_u16()));
            }

            let created: Created = response
                .json()
                .await
                .map_err(|e| RemoteError::Decode(e.to_string()))?;

            remote_id(created.id)
                .ok_or_else(|| RemoteError::Decode("response carries no id".to_string()))
        };

        cancellable(cancel, call).await
    }
}
