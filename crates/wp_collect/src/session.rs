//! Five9 supervisor session protocol
//!
//! Every statistics read is two calls: `setSessionParameters` fixes the
//! reporting window, then `getStatistics` reads it. Nothing is cached
//! between reads, so each poll re-establishes the session.

use async_trait::async_trait;
use quick_xml::escape::escape;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};
use wp_config::Five9Config;
use wp_store::{MAX_ERROR_BODY_CHARS, body_excerpt};

use crate::{CollectError, StatRecord, parse_statistics};

/// SOAP 1.1 envelope namespace
pub const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// Status and body of one SOAP call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapResponse {
    pub status: u16,
    pub body: String,
}

impl SoapResponse {
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// The service signals success with 200 only
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// Carrier for SOAP method calls against the supervisor service
#[async_trait]
pub trait SoapTransport: Send + Sync {
    /// Invoke `method` with `body_xml` as the method element's content
    async fn call(&self, method: &str, body_xml: &str) -> Result<SoapResponse, CollectError>;
}

/// Wrap a method body in a SOAP envelope, with the service namespace under `ser`
#[must_use]
pub fn soap_envelope(namespace: &str, method: &str, body_xml: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="{SOAP_ENV_NS}" xmlns:ser="{ns}">
  <soapenv:Header/>
  <soapenv:Body>
    <ser:{method}>{body_xml}</ser:{method}>
  </soapenv:Body>
</soapenv:Envelope>"#,
        ns = escape(namespace),
    )
}

/// HTTPS transport with Basic auth and a per-call timeout
pub struct HttpSoapTransport {
    client: reqwest::Client,
    url: String,
    namespace: String,
    username: String,
    password: String,
    timeout: Duration,
}

impl HttpSoapTransport {
    /// Build a transport from the `[five9]` config section
    ///
    /// # Errors
    ///
    /// Returns [`CollectError::HttpError`] if the HTTP client cannot be built.
    pub fn new(config: &Five9Config) -> Result<Self, CollectError> {
        let timeout = config.timeout();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CollectError::HttpError(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: config.soap_url.clone(),
            namespace: config.namespace.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            timeout,
        })
    }

    fn transport_error(&self, err: &reqwest::Error) -> CollectError {
        if err.is_timeout() {
            CollectError::Timeout(self.timeout)
        } else {
            CollectError::HttpError(err.to_string())
        }
    }
}

#[async_trait]
impl SoapTransport for HttpSoapTransport {
    #[instrument(skip(self, body_xml), fields(url = %self.url))]
    async fn call(&self, method: &str, body_xml: &str) -> Result<SoapResponse, CollectError> {
        let envelope = soap_envelope(&self.namespace, method, body_xml);

        let response = self
            .client
            .post(&self.url)
            .basic_auth(&self.username, Some(&self.password))
            .header(reqwest::header::CONTENT_TYPE, "text/xml; charset=UTF-8")
            .header("SOAPAction", "")
            .body(envelope)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.transport_error(&e))?;

        debug!(status, bytes = body.len(), "SOAP call returned");
        Ok(SoapResponse { status, body })
    }
}

/// Two-step agent state query
pub struct SessionQuery {
    transport: Arc<dyn SoapTransport>,
    statistic_type: String,
    rolling_period: String,
    statistics_range: String,
}

impl SessionQuery {
    #[must_use]
    pub fn new(transport: Arc<dyn SoapTransport>, config: &Five9Config) -> Self {
        Self {
            transport,
            statistic_type: config.statistic_type.clone(),
            rolling_period: config.rolling_period.clone(),
            statistics_range: config.statistics_range.clone(),
        }
    }

    fn session_body(&self) -> String {
        format!(
            "<viewSettings><rollingPeriod>{}</rollingPeriod><statisticsRange>{}</statisticsRange></viewSettings>",
            escape(&self.rolling_period),
            escape(&self.statistics_range),
        )
    }

    fn statistics_body(&self) -> String {
        format!(
            "<statisticType>{}</statisticType>",
            escape(&self.statistic_type)
        )
    }

    /// Establish the reporting window for the next statistics call
    ///
    /// # Errors
    ///
    /// Any transport failure or non-success status is a
    /// [`CollectError::SessionError`].
    pub async fn set_session(&self) -> Result<(), CollectError> {
        let response = self
            .transport
            .call("setSessionParameters", &self.session_body())
            .await
            .map_err(|e| CollectError::SessionError(e.to_string()))?;

        if !response.is_success() {
            return Err(CollectError::SessionError(format!(
                "status {}",
                response.status
            )));
        }

        debug!("Five9 session parameters set");
        Ok(())
    }

    /// Read the configured statistic and parse it into records
    ///
    /// # Errors
    ///
    /// Returns [`CollectError::RemoteError`] on a non-success status, the
    /// transport error on failure to call, or the parser's error.
    pub async fn fetch_statistics(&self) -> Result<Vec<StatRecord>, CollectError> {
        let response = self
            .transport
            .call("getStatistics", &self.statistics_body())
            .await?;

        if !response.is_success() {
            return Err(CollectError::RemoteError {
                status: response.status,
                body: body_excerpt(&response.body, MAX_ERROR_BODY_CHARS),
            });
        }

        let records = parse_statistics(&response.body)?;
        debug!(records = records.len(), "Parsed statistics");
        Ok(records)
    }

    /// Set the session, then fetch; the fetch is skipped if the session fails
    ///
    /// # Errors
    ///
    /// See [`SessionQuery::set_session`] and [`SessionQuery::fetch_statistics`].
    pub async fn fetch_agent_states(&self) -> Result<Vec<StatRecord>, CollectError> {
        self.set_session().await?;
        self.fetch_statistics().await
    }
}
