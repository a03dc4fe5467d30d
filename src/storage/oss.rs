//! Aliyun OSS client over the REST API.
//!
//! Requests go to the virtual-hosted bucket endpoint and are signed with
//! OSS4-HMAC-SHA256 when credentials are configured; otherwise they are sent
//! anonymously, which works for public-read buckets.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use super::listing::parse_list_bucket_result;
use super::{ListPage, ListRequest, ObjectStore, StorageError};
use crate::config::OssConfig;
use crate::retry::{retry_with_backoff, RetryAction, RetryPolicy};

type HmacSha256 = Hmac<Sha256>;

const SIGNING_ALGORITHM: &str = "OSS4-HMAC-SHA256";
const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

pub struct OssClient {
    http: reqwest::Client,
    config: OssConfig,
    /// Signing region; only resolved when credentials are present.
    region: Option<String>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for OssClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OssClient")
            .field("config", &self.config)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl OssClient {
    pub fn new(config: OssConfig) -> Result<Self, StorageError> {
        let region = match (&config.access_key, &config.region) {
            (None, _) => None,
            (Some(_), Some(region)) => Some(region.clone()),
            (Some(_), None) => Some(region_from_endpoint(&config.endpoint).ok_or_else(|| {
                StorageError::Config(format!(
                    "cannot derive a signing region from endpoint '{}', set --oss-region",
                    config.endpoint
                ))
            })?),
        };

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StorageError::Config(format!("failed to build HTTP client: {e}")))?;

        tracing::debug!(
            bucket = %config.bucket,
            endpoint = %config.endpoint,
            signed = region.is_some(),
            "Created OSS client"
        );

        Ok(Self {
            http,
            config,
            region,
            retry: RetryPolicy::default(),
        })
    }

    fn host(&self) -> String {
        format!("{}.{}", self.config.bucket, self.config.endpoint)
    }

    /// Send one GET with per-request retries on transient failures.
    async fn get_bytes(
        &self,
        key: &str,
        query: &[(String, String)],
        timeout: Duration,
    ) -> Result<Vec<u8>, StorageError> {
        retry_with_backoff(
            &self.retry,
            |e: &StorageError| {
                if e.is_retryable() {
                    RetryAction::Retry
                } else {
                    RetryAction::Abort
                }
            },
            || self.attempt_get(key, query, timeout),
        )
        .await
    }

    async fn attempt_get(
        &self,
        key: &str,
        query: &[(String, String)],
        timeout: Duration,
    ) -> Result<Vec<u8>, StorageError> {
        let path = format!("/{}", uri_encode(key, false));
        let canonical_query = canonical_query_string(query);
        let mut url = format!("{}://{}{}", self.config.scheme, self.host(), path);
        if !canonical_query.is_empty() {
            url.push('?');
            url.push_str(&canonical_query);
        }

        let mut request = self.http.get(&url).timeout(timeout);
        if let (Some(region), Some(access_key), Some(secret_key)) = (
            &self.region,
            &self.config.access_key,
            &self.config.secret_key,
        ) {
            let signed = sign_v4(
                &SigningInput {
                    method: "GET",
                    bucket: &self.config.bucket,
                    key,
                    query,
                    region,
                    access_key,
                    secret_key,
                },
                Utc::now(),
            )?;
            request = request
                .header("x-oss-date", signed.timestamp)
                .header("x-oss-content-sha256", UNSIGNED_PAYLOAD)
                .header("authorization", signed.authorization);
        }

        let response = request.send().await.map_err(|e| transport_error(key, timeout, e))?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(key.to_string()));
        }
        if !status.is_success() {
            return Err(StorageError::HttpStatus {
                status: status.as_u16(),
                key: key.to_string(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(key, timeout, e))?;
        Ok(body.to_vec())
    }
}

fn transport_error(key: &str, timeout: Duration, source: reqwest::Error) -> StorageError {
    if source.is_timeout() {
        StorageError::Timeout {
            key: key.to_string(),
            timeout,
        }
    } else {
        StorageError::Transport {
            key: key.to_string(),
            source,
        }
    }
}

#[async_trait]
impl ObjectStore for OssClient {
    async fn list(&self, request: &ListRequest) -> Result<ListPage, StorageError> {
        let mut query = vec![
            ("max-keys".to_string(), request.max_keys.to_string()),
            ("prefix".to_string(), request.prefix.clone()),
        ];
        if let Some(marker) = &request.marker {
            query.push(("marker".to_string(), marker.clone()));
        }

        tracing::debug!(
            prefix = %request.prefix,
            marker = request.marker.as_deref().unwrap_or_default(),
            "Listing objects"
        );
        let body = self.get_bytes("", &query, self.config.timeout).await?;
        parse_list_bucket_result(&body)
    }

    async fn get(&self, key: &str, timeout: Duration) -> Result<Vec<u8>, StorageError> {
        tracing::debug!(key = %key, "Fetching object");
        self.get_bytes(key, &[], timeout).await
    }
}

/// Derive the signing region from a public or internal endpoint host.
///
/// `oss-cn-hangzhou.aliyuncs.com` and `oss-cn-hangzhou-internal.aliyuncs.com`
/// both yield `cn-hangzhou`.
pub fn region_from_endpoint(endpoint: &str) -> Option<String> {
    let first = endpoint.split('.').next()?;
    let region = first.strip_prefix("oss-")?;
    let region = region.strip_suffix("-internal").unwrap_or(region);
    (!region.is_empty()).then(|| region.to_string())
}

struct SigningInput<'a> {
    method: &'a str,
    bucket: &'a str,
    key: &'a str,
    query: &'a [(String, String)],
    region: &'a str,
    access_key: &'a str,
    secret_key: &'a str,
}

#[derive(Debug, PartialEq, Eq)]
struct SignedHeaders {
    timestamp: String,
    authorization: String,
}

fn sign_v4(input: &SigningInput<'_>, now: DateTime<Utc>) -> Result<SignedHeaders, StorageError> {
    let timestamp = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();
    let scope = format!("{date}/{}/oss/aliyun_v4_request", input.region);

    let canonical_uri = format!(
        "/{}/{}",
        uri_encode(input.bucket, true),
        uri_encode(input.key, false)
    );
    // Headers are already in lexicographic order.
    let canonical_headers =
        format!("x-oss-content-sha256:{UNSIGNED_PAYLOAD}\nx-oss-date:{timestamp}\n");
    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n\n{}",
        input.method,
        canonical_uri,
        canonical_query_string(input.query),
        canonical_headers,
        UNSIGNED_PAYLOAD
    );

    let string_to_sign = format!(
        "{SIGNING_ALGORITHM}\n{timestamp}\n{scope}\n{}",
        hex(&Sha256::digest(canonical_request.as_bytes()))
    );

    let mut key = hmac_sha256(format!("aliyun_v4{}", input.secret_key).as_bytes(), &date)?;
    for part in [input.region, "oss", "aliyun_v4_request"] {
        key = hmac_sha256(&key, part)?;
    }
    let signature = hex(&hmac_sha256(&key, &string_to_sign)?);

    Ok(SignedHeaders {
        authorization: format!(
            "{SIGNING_ALGORITHM} Credential={}/{scope},Signature={signature}",
            input.access_key
        ),
        timestamp,
    })
}

fn hmac_sha256(key: &[u8], data: &str) -> Result<Vec<u8>, StorageError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| StorageError::Config(format!("invalid signing key: {e}")))?;
    mac.update(data.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Percent-encode everything except RFC 3986 unreserved characters.
/// `/` is kept when `encode_slash` is false.
fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Sorted, encoded `k=v` pairs joined by `&`; empty values render as `k`.
fn canonical_query_string(query: &[(String, String)]) -> String {
    let mut pairs: Vec<(String, String)> = query
        .iter()
        .map(|(k, v)| (uri_encode(k, true), uri_encode(v, true)))
        .collect();
    pairs.sort();
    pairs
        .into_iter()
        .map(|(k, v)| if v.is_empty() { k } else { format!("{k}={v}") })
        .collect::<Vec<_>>()
        .join("&")
}
