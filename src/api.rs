use reqwest::{
    header::{AUTHORIZATION, REFERER, USER_AGENT},
    StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_aux::prelude::*;

use crate::{config::Config, stream::StreamData, util};

pub const API_BASE: &str = "https://apiv3.fansly.com";
pub const ORIGIN: &str = "https://fansly.com";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountData {
    #[serde(default, deserialize_with = "deserialize_default_from_null")]
    pub success: bool,
    #[serde(default, deserialize_with = "deserialize_default_from_null")]
    pub response: Vec<Account>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    #[serde(default, deserialize_with = "deserialize_default_from_null")]
    pub username: String,
    pub display_name: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest_middleware::Error),
    #[error("could not read response: {0}")]
    Body(#[from] reqwest::Error),
    #[error("{url} returned {status}")]
    Status { url: String, status: StatusCode },
    #[error("could not decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("no account named {0}")]
    NotFound(String),
    #[error("API reported failure for {0}")]
    Unsuccessful(String),
}

impl ApiError {
    /// Whether trying again later could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Request(_) | ApiError::Body(_) => true,
            ApiError::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            ApiError::Decode(_) | ApiError::NotFound(_) | ApiError::Unsuccessful(_) => false,
        }
    }
}

/// Authenticated access to the two Fansly endpoints we need.
pub struct FanslyClient {
    http: util::HttpClient,
    base_url: String,
    token: String,
    user_agent: String,
}

impl FanslyClient {
    pub fn new(config: &Config) -> reqwest::Result<Self> {
        Ok(Self {
            http: util::HttpClient::new(config.http_timeout)?,
            base_url: config.api_base.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            user_agent: config.user_agent.clone(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        debug!("GET {}", url);
        let resp = self
            .http
            .client
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .header(REFERER, ORIGIN)
            .header(AUTHORIZATION, &self.token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                url: url.to_string(),
                status,
            });
        }

        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    pub async fn fetch_account(&self, creator: &str) -> Result<Account, ApiError> {
        let url = format!("{}/api/v1/account?usernames={}", self.base_url, creator);
        let data: AccountData = self.get_json(&url).await?;

        data.response
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::NotFound(creator.to_string()))
    }

    pub async fn fetch_stream(&self, account_id: &str) -> Result<StreamData, ApiError> {
        let url = format!("{}/api/v1/streaming/channel/{}", self.base_url, account_id);
        let data: StreamData = self.get_json(&url).await?;

        if !data.success {
            return Err(ApiError::Unsuccessful(account_id.to_string()));
        }

        Ok(data)
    }
}
