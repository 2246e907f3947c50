// Copyright PingCAP Inc. 2025.
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; version 2 of the License.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Client for the `/states` API, as used by game bridges and players.

use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, ETAG, IF_MATCH, IF_NONE_MATCH};
use reqwest::StatusCode;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Minimum spacing between consecutive GETs in [`StateClient::poll_until_changed`].
pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("state not found: {0}")]
    NotFound(String),
    #[error("{operation} failed with status {status}")]
    UnexpectedStatus {
        operation: &'static str,
        status: StatusCode,
    },
    #[error("server returned an empty state id")]
    EmptyId,
    #[error("response for {0} carried no ETag")]
    MissingEtag(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    Applied,
    /// The expected etag was stale; re-read and retry.
    Conflict,
    NotFound,
}

#[derive(Debug, Clone)]
pub struct StateClient {
    http: reqwest::Client,
    states_url: String,
    request_delay: Duration,
}

impl StateClient {
    /// `states_url` is the collection URL, e.g. `http://localhost:8027/states`.
    pub fn new(states_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            states_url: states_url.into().trim_end_matches('/').to_string(),
            request_delay: DEFAULT_REQUEST_DELAY,
        }
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    pub fn state_url(&self, id: &str) -> String {
        format!("{}/{}", self.states_url, id)
    }

    pub async fn create(&self, data: impl Into<Bytes>) -> Result<String, ClientError> {
        let response = self
            .http
            .post(&self.states_url)
            .header(CONTENT_TYPE, "text/plain")
            .body(data.into())
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(ClientError::UnexpectedStatus {
                operation: "create",
                status: response.status(),
            });
        }
        let id = response.text().await?.trim().to_string();
        if id.is_empty() {
            return Err(ClientError::EmptyId);
        }
        Ok(id)
    }

    /// One GET. `Ok(None)` means the server answered 304 for `known_etag`.
    pub async fn get(
        &self,
        id: &str,
        known_etag: Option<&str>,
    ) -> Result<Option<(Bytes, String)>, ClientError> {
        let mut request = self.http.get(self.state_url(id));
        if let Some(etag) = known_etag {
            request = request.header(IF_NONE_MATCH, etag);
        }
        let response = request.send().await?;
        match response.status() {
            StatusCode::OK => {
                let etag = response
                    .headers()
                    .get(ETAG)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
                    .ok_or_else(|| ClientError::MissingEtag(id.to_string()))?;
                Ok(Some((response.bytes().await?, etag)))
            }
            StatusCode::NOT_MODIFIED => Ok(None),
            StatusCode::NOT_FOUND => Err(ClientError::NotFound(id.to_string())),
            status => Err(ClientError::UnexpectedStatus {
                operation: "get",
                status,
            }),
        }
    }

    /// Block until the state differs from `known_data`, returning the new
    /// data and etag.
    ///
    /// 304s, unchanged data and unexpected statuses are retried, with at
    /// least the request delay between the start of consecutive GETs.
    /// Transport errors and 404 end the loop.
    pub async fn poll_until_changed(
        &self,
        id: &str,
        known_data: Option<&[u8]>,
        known_etag: Option<&str>,
    ) -> Result<(Bytes, String), ClientError> {
        let mut etag = known_etag.map(str::to_string);
        loop {
            let start = Instant::now();
            match self.get(id, etag.as_deref()).await {
                Ok(Some((data, new_etag))) => {
                    if known_data != Some(&data[..]) {
                        return Ok((data, new_etag));
                    }
                    tracing::warn!(state_id = %id, "state did not change");
                    etag = Some(new_etag);
                }
                Ok(None) => {}
                Err(ClientError::UnexpectedStatus { status, .. }) => {
                    tracing::warn!(state_id = %id, %status, "GET failed, will retry");
                }
                Err(e) => return Err(e),
            }

            let elapsed = start.elapsed();
            if elapsed < self.request_delay {
                let delay = self.request_delay - elapsed;
                tracing::debug!(state_id = %id, ?delay, "waiting before next poll");
                tokio::time::sleep(delay).await;
            }
        }
    }

    pub async fn compare_and_swap(
        &self,
        id: &str,
        data: impl Into<Bytes>,
        expected_etag: &str,
    ) -> Result<CasOutcome, ClientError> {
        let response = self
            .http
            .put(self.state_url(id))
            .header(CONTENT_TYPE, "text/plain")
            .header(IF_MATCH, expected_etag)
            .body(data.into())
            .send()
            .await?;
        match response.status() {
            StatusCode::OK => Ok(CasOutcome::Applied),
            StatusCode::PRECONDITION_FAILED => Ok(CasOutcome::Conflict),
            StatusCode::NOT_FOUND => Ok(CasOutcome::NotFound),
            status => Err(ClientError::UnexpectedStatus {
                operation: "compare_and_swap",
                status,
            }),
        }
    }
}
