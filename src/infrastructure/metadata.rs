//! Post-metadata fetching. The HTTP fetcher talks to a metadata resolver
//! service; the null fetcher stands in when none is configured, so missing
//! fields surface as ordinary compile errors.

use crate::domain::ports::{Account, MetadataFetcher, PostMetadata};
use crate::infrastructure::http_client::{HttpClientFactory, build_url_with_query};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;

pub struct HttpMetadataFetcher {
    client: ClientWithMiddleware,
    endpoint: String,
}

impl HttpMetadataFetcher {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: HttpClientFactory::create_client(),
            endpoint,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetadataResponse {
    author: String,
    author_handle: String,
    posted_at: DateTime<Utc>,
    account: AccountResponse,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    handle: String,
    url: String,
    created_at: Option<DateTime<Utc>>,
}

#[async_trait]
impl MetadataFetcher for HttpMetadataFetcher {
    async fn fetch(&self, post_url: &str) -> Result<(PostMetadata, Account)> {
        let url = build_url_with_query(&self.endpoint, &[("url", post_url)])
            .context("building metadata request URL")?;
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("requesting post metadata")?;
        if !response.status().is_success() {
            bail!(
                "metadata resolver returned {} for {post_url}",
                response.status()
            );
        }
        let parsed: MetadataResponse = response
            .json()
            .await
            .context("parsing metadata response")?;
        Ok((
            PostMetadata {
                author: parsed.author,
                author_handle: parsed.author_handle,
                posted_at: parsed.posted_at,
            },
            Account {
                handle: parsed.account.handle,
                url: parsed.account.url,
                created_at: parsed.account.created_at,
            },
        ))
    }
}

/// Fetcher used when no resolver endpoint is configured.
pub struct NullMetadataFetcher;

#[async_trait]
impl MetadataFetcher for NullMetadataFetcher {
    async fn fetch(&self, post_url: &str) -> Result<(PostMetadata, Account)> {
        bail!("no metadata resolver configured, cannot enrich {post_url}")
    }
}
