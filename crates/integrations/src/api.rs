use crate::error::{ApiError, ApiResult};
use crate::types::{
    ConnectionStatus, CredentialsForm, OAuthUrlResponse, Provider, SaveCredentialsRequest,
};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, COOKIE};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

const USER_AGENT: &str = "chatbuilder/0.1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Remote operations the setup wizard needs. None of them retry.
pub trait IntegrationBackend: Send + Sync + 'static {
    fn status(&self, application_id: &str)
        -> impl Future<Output = ApiResult<ConnectionStatus>> + Send;

    fn save_credentials(
        &self,
        application_id: &str,
        form: &CredentialsForm,
    ) -> impl Future<Output = ApiResult<()>> + Send;

    /// `return_to` is where the authorization page should report back.
    fn oauth_url(
        &self,
        application_id: &str,
        return_to: Option<&Url>,
    ) -> impl Future<Output = ApiResult<Url>> + Send;

    fn disconnect(&self, application_id: &str) -> impl Future<Output = ApiResult<()>> + Send;
}

#[derive(Clone)]
pub struct IntegrationApi {
    client: Client,
    base_url: Url,
    provider: Provider,
}

impl IntegrationApi {
    pub fn new(base_url: Url, provider: Provider) -> ApiResult<Self> {
        Self::builder(base_url, provider).build()
    }

    pub fn builder(base_url: Url, provider: Provider) -> IntegrationApiBuilder {
        IntegrationApiBuilder {
            base_url,
            provider,
            session_token: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn endpoint(&self, action: &str, application_id: Option<&str>) -> ApiResult<Url> {
        let mut url = self
            .base_url
            .join(&format!("api/integrations/{}/{}", self.provider, action))
            .map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
        if let Some(id) = application_id {
            url.query_pairs_mut().append_pair("applicationId", id);
        }
        Ok(url)
    }

    async fn send(request: RequestBuilder) -> ApiResult<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_response(status, &body))
    }

    async fn json<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

impl IntegrationBackend for IntegrationApi {
    async fn status(&self, application_id: &str) -> ApiResult<ConnectionStatus> {
        let url = self.endpoint("status", Some(application_id))?;
        debug!("GET {}", url.path());
        let response = Self::send(self.client.get(url)).await?;
        Self::json(response).await
    }

    async fn save_credentials(&self, application_id: &str, form: &CredentialsForm) -> ApiResult<()> {
        let url = self.endpoint("credentials", None)?;
        let body = SaveCredentialsRequest {
            application_id,
            client_id: &form.client_id,
            client_secret: &form.client_secret,
            signing_secret: &form.signing_secret,
        };
        debug!("POST {}", url.path());
        Self::send(self.client.post(url).json(&body)).await?;
        info!("Saved {} credentials for {}", self.provider, application_id);
        Ok(())
    }

    async fn oauth_url(&self, application_id: &str, return_to: Option<&Url>) -> ApiResult<Url> {
        let mut url = self.endpoint("oauth-url", Some(application_id))?;
        if let Some(return_to) = return_to {
            url.query_pairs_mut().append_pair("returnTo", return_to.as_str());
        }
        debug!("GET {}", url.path());
        let response = Self::send(self.client.get(url)).await?;
        let data: OAuthUrlResponse = Self::json(response).await?;
        // The backend may hand out a path relative to itself.
        self.base_url
            .join(&data.oauth_url)
            .map_err(|e| ApiError::InvalidUrl(e.to_string()))
    }

    async fn disconnect(&self, application_id: &str) -> ApiResult<()> {
        let url = self.endpoint("disconnect", Some(application_id))?;
        debug!("DELETE {}", url.path());
        Self::send(self.client.delete(url)).await?;
        info!("Disconnected {} for {}", self.provider, application_id);
        Ok(())
    }
}

pub struct IntegrationApiBuilder {
    base_url: Url,
    provider: Provider,
    session_token: Option<String>,
    timeout: Duration,
}

impl IntegrationApiBuilder {
    /// Sent both as a bearer token and as the session cookie, matching a
    /// browser request made with credentials included.
    pub fn session_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.session_token = (!token.trim().is_empty()).then_some(token);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> ApiResult<IntegrationApi> {
        let mut headers = HeaderMap::new();
        if let Some(ref token) = self.session_token {
            let header = |value: String| {
                HeaderValue::from_str(&value)
                    .map_err(|_| ApiError::Setup("session token is not a valid header value".to_string()))
            };
            headers.insert(AUTHORIZATION, header(format!("Bearer {token}"))?);
            headers.insert(COOKIE, header(format!("session={token}"))?);
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(5))
            .timeout(self.timeout)
            .build()?;

        let mut base_url = self.base_url;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(IntegrationApi {
            client,
            base_url,
            provider: self.provider,
        })
    }
}
