use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;

use crate::backend::RetrievalBackend;
use crate::classify::RawResponse;
use crate::config::ApiSettings;
use crate::domain::ContractId;
use crate::error::HarvestError;

pub fn http_client(timeout: Duration) -> Result<Client, HarvestError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&format!("contract-harvest/{}", env!("CARGO_PKG_VERSION")))
            .map_err(|err| HarvestError::ApiHttp(err.to_string()))?,
    );
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|err| HarvestError::ApiHttp(err.to_string()))
}

#[derive(Clone)]
pub struct ApiBackend {
    client: Client,
    base_url: String,
}

impl ApiBackend {
    pub fn new(settings: &ApiSettings) -> Result<Self, HarvestError> {
        Ok(Self {
            client: http_client(settings.timeout)?,
            base_url: settings.base_url.clone(),
        })
    }

    pub fn contract_url(&self, id: &ContractId) -> String {
        format!("{}/{}", self.base_url, id.as_str())
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, HarvestError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .ok()
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| "API request failed".to_string());
        Err(HarvestError::ApiStatus { status, message })
    }
}

impl RetrievalBackend for ApiBackend {
    fn name(&self) -> &'static str {
        "api"
    }

    fn fetch(&mut self, id: &ContractId) -> Result<RawResponse, HarvestError> {
        let url = self.contract_url(id);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| HarvestError::ApiHttp(err.to_string()))?;
        let response = Self::handle_status(response)?;
        let body: Value = response
            .json()
            .map_err(|err| HarvestError::Malformed(err.to_string()))?;
        Ok(RawResponse::Record(body))
    }
}

/// Existence check used before driving a page: only a 200 counts as present.
#[derive(Clone)]
pub struct ExistenceProbe {
    client: Client,
}

impl ExistenceProbe {
    pub fn new(timeout: Duration) -> Result<Self, HarvestError> {
        Ok(Self {
            client: http_client(timeout)?,
        })
    }

    pub fn status(&self, url: &str) -> Result<u16, HarvestError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| HarvestError::ApiHttp(err.to_string()))?;
        Ok(response.status().as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_url_joins_base_and_id() {
        let backend = ApiBackend::new(&ApiSettings {
            base_url: "https://api.example.test/contract".to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap();
        let id: ContractId = "NHcmwGhtyMtHYuvj7QL1V8rdBmu3kHB6".parse().unwrap();
        assert_eq!(
            backend.contract_url(&id),
            "https://api.example.test/contract/NHcmwGhtyMtHYuvj7QL1V8rdBmu3kHB6"
        );
    }
}
