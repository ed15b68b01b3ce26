use std::time::Duration;

use bytes::Bytes;
use url::Url;

use super::BackendFetcher;
use crate::error::FetchError;
use crate::graphql;

/// A fetcher for backend data that posts GraphQL over HTTP.
#[derive(Debug, Clone)]
pub struct HttpBackendFetcher {
    service: String,
    url: Url,
    http_client: reqwest::Client,
}

impl HttpBackendFetcher {
    /// Construct a new http backend fetcher that will fetch from the supplied URL.
    pub fn new(service: impl Into<String>, url: Url) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .tcp_keepalive(Some(Duration::from_secs(5)))
            .build()?;
        Ok(Self::with_client(service, url, http_client))
    }

    /// Shares `http_client` and its connection pool with other fetchers.
    pub fn with_client(service: impl Into<String>, url: Url, http_client: reqwest::Client) -> Self {
        Self {
            service: service.into(),
            url,
            http_client,
        }
    }

    fn http_error(&self, status_code: Option<u16>, err: impl ToString) -> FetchError {
        FetchError::SubrequestHttpError {
            status_code,
            service: self.service.clone(),
            reason: err.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl BackendFetcher for HttpBackendFetcher {
    async fn fetch(&self, request: graphql::Request) -> Result<Bytes, FetchError> {
        let response = self
            .http_client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await
            .map_err(|err| self.http_error(err.status().map(|status| status.as_u16()), err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.http_error(
                Some(status.as_u16()),
                format!("backend answered with {status}"),
            ));
        }

        response
            .bytes()
            .await
            .map_err(|err| self.http_error(Some(status.as_u16()), err))
    }
}
