use crate::errors::FetchError;
use crate::models::{Envelope, ListQuery, Page, non_empty};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Thin HTTP wrapper: attaches the bearer token and turns every response into
/// an [`Envelope`] or a classified [`FetchError`].
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn get_envelope(
        &self,
        path: &str,
        token: &str,
        query: &[(&str, String)],
    ) -> Result<Envelope<Value>, FetchError> {
        let request = self.http.get(self.url(path)).query(query);
        self.execute(request, token).await
    }

    pub async fn list<T: DeserializeOwned>(
        &self,
        path: &str,
        token: &str,
        query: &ListQuery,
    ) -> Result<Page<T>, FetchError> {
        let payload = self
            .get_envelope(path, token, &query.to_pairs())
            .await?
            .into_result()?
            .unwrap_or(Value::Null);
        serde_json::from_value(payload).map_err(|err| FetchError::Decode(err.to_string()))
    }

    pub async fn create<B: Serialize + ?Sized>(
        &self,
        path: &str,
        token: &str,
        body: &B,
    ) -> Result<Envelope<Value>, FetchError> {
        self.send(Method::POST, path, token, Some(body)).await
    }

    pub async fn update<B: Serialize + ?Sized>(
        &self,
        path: &str,
        id: &str,
        token: &str,
        body: &B,
    ) -> Result<Envelope<Value>, FetchError> {
        let path = format!("{}/{}", path.trim_end_matches('/'), id);
        self.send(Method::PUT, &path, token, Some(body)).await
    }

    pub async fn delete(
        &self,
        path: &str,
        id: &str,
        token: &str,
    ) -> Result<Envelope<Value>, FetchError> {
        let path = format!("{}/{}", path.trim_end_matches('/'), id);
        self.send::<Value>(Method::DELETE, &path, token, None).await
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        token: &str,
        body: Option<&B>,
    ) -> Result<Envelope<Value>, FetchError> {
        let mut request = self.http.request(method, self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        self.execute(request, token).await
    }

    async fn execute(
        &self,
        request: RequestBuilder,
        token: &str,
    ) -> Result<Envelope<Value>, FetchError> {
        let response = request.bearer_auth(token).send().await?;
        let status = response.status();
        debug!(%status, url = %response.url(), "api response");

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FetchError::Unauthorized(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        let envelope = serde_json::from_slice::<Envelope<Value>>(&bytes);

        if !status.is_success() {
            let message = envelope.ok().and_then(|env| non_empty(env.message));
            return Err(FetchError::Status {
                status: status.as_u16(),
                message,
            });
        }

        envelope.map_err(|err| FetchError::Decode(err.to_string()))
    }
}
