//! Registry session capability and form construction.
//!
//! The registry expects a page visit (which sets session cookies) before
//! searches are accepted. [`Session`] hides that bootstrap and the HTTP
//! transport so the fetcher can be driven by a scripted session in tests.

use crate::error::{Result, ScanError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use sweep_core::{DoctorType, RegistryConfig, ScanningConfig, SearchKey, SearchParams};

/// Raw HTTP response from a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: String,
}

impl SessionResponse {
    /// Successful response with `body`.
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }
}

/// Transport to the registry search endpoint.
#[async_trait]
pub trait Session: Send + Sync {
    /// Establish (or refresh) the session before searching.
    async fn establish(&self) -> Result<()>;

    /// Submit one search form.
    async fn search(&self, form: &SearchForm) -> Result<SessionResponse>;
}

#[async_trait]
impl<T: Session + ?Sized> Session for Arc<T> {
    async fn establish(&self) -> Result<()> {
        (**self).establish().await
    }

    async fn search(&self, form: &SearchForm) -> Result<SessionResponse> {
        (**self).search(form).await
    }
}

/// Form-encoded search request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchForm {
    fields: Vec<(&'static str, String)>,
}

impl SearchForm {
    /// Build the form for `key`.
    ///
    /// `lastName` is only sent together with a doctor type filter, and
    /// `SpecialistType` only for specialist searches.
    #[must_use]
    pub fn build(key: &SearchKey, params: &SearchParams, registry: &RegistryConfig) -> Self {
        let mut fields = Vec::with_capacity(5);
        if registry.include_inactive {
            fields.push(("cbx-includeinactive", "on".to_string()));
        }
        if params.doctor_type != DoctorType::Any {
            if let Some(last_name) = &params.last_name {
                fields.push(("lastName", last_name.clone()));
            }
        }
        fields.push(("postalCode", key.wire()));
        fields.push(("doctorType", params.doctor_type.wire().to_string()));
        if params.doctor_type == DoctorType::Specialist {
            fields.push(("SpecialistType", registry.specialist_type.clone()));
        }
        Self { fields }
    }

    /// Form fields in submission order.
    #[must_use]
    pub fn fields(&self) -> &[(&'static str, String)] {
        &self.fields
    }

    /// Value of a field, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value.as_str())
    }
}

/// reqwest-backed session with a cookie store.
pub struct HttpSession {
    client: Client,
    session_url: String,
    search_url: String,
}

impl HttpSession {
    /// Create a session for the configured registry.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(registry: &RegistryConfig, scanning: &ScanningConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(
            "x-requested-with",
            HeaderValue::from_static("XMLHttpRequest"),
        );

        let client = Client::builder()
            .cookie_store(true)
            .default_headers(headers)
            .user_agent(scanning.user_agent.clone())
            .timeout(Duration::from_secs(scanning.timeout_secs))
            .build()
            .map_err(|e| ScanError::Client(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            session_url: registry.session_url(),
            search_url: registry.search_url(),
        })
    }
}

#[async_trait]
impl Session for HttpSession {
    async fn establish(&self) -> Result<()> {
        let response = self
            .client
            .get(&self.session_url)
            .send()
            .await
            .map_err(|e| ScanError::TransientNetwork(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ScanError::HttpStatus(status.as_u16()))
        }
    }

    async fn search(&self, form: &SearchForm) -> Result<SessionResponse> {
        let response = self
            .client
            .post(&self.search_url)
            .form(form.fields())
            .send()
            .await
            .map_err(|e| ScanError::TransientNetwork(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ScanError::TransientNetwork(e.to_string()))?;

        Ok(SessionResponse { status, body })
    }
}
