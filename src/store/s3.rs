//! Amazon S3 object store.
//!
//! Talks to the S3 REST API directly with AWS Signature V4 authentication
//! (`ListObjectsV2`, `GetObject`, `PutObject`, `DeleteObject`,
//! `HeadObject`). Uses only pure-Rust dependencies (`hmac`, `sha2`) for
//! signing.
//!
//! # Configuration
//!
//! ```toml
//! [store]
//! kind = "s3"
//! bucket = "crash-uploads"
//! region = "us-east-1"
//! prefix = "uploadedfiles/app-crashes/"
//! # endpoint_url = "http://localhost:9000"   # MinIO
//! ```
//!
//! Credentials are read from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`
//! and optionally `AWS_SESSION_TOKEN`.
//!
//! With the default endpoint requests use virtual-hosted style
//! (`<bucket>.s3.<region>.amazonaws.com/<key>`); a custom `endpoint_url`
//! switches to path style (`<endpoint>/<bucket>/<key>`), which is what
//! MinIO and LocalStack expect.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Method;
use sha2::{Digest, Sha256};

use super::{ListPage, ObjectMeta, ObjectStore};
use crate::config::StoreConfig;

type HmacSha256 = Hmac<Sha256>;

/// AWS credentials loaded from environment variables.
struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .context("AWS_ACCESS_KEY_ID environment variable not set")?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

/// An S3 bucket accessed over HTTPS.
pub struct S3Store {
    bucket: String,
    region: String,
    /// `http(s)://host` without trailing slash.
    endpoint: String,
    host: String,
    path_style: bool,
    creds: AwsCredentials,
    client: reqwest::Client,
}

impl S3Store {
    /// Create a store for `[store]`, reading credentials from the environment.
    pub fn from_env(config: &StoreConfig) -> Result<Self> {
        let creds = AwsCredentials::from_env()?;
        let (endpoint, path_style) = match &config.endpoint_url {
            Some(url) => (url.trim_end_matches('/').to_string(), true),
            None => (
                format!("https://{}.s3.{}.amazonaws.com", config.bucket, config.region),
                false,
            ),
        };
        let host = endpoint
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .to_string();

        Ok(Self {
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            endpoint,
            host,
            path_style,
            creds,
            client: reqwest::Client::new(),
        })
    }

    /// Canonical (already URI-encoded) path for `key`.
    fn canonical_uri(&self, key: &str) -> String {
        let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        if self.path_style {
            format!("/{}/{}", uri_encode(&self.bucket), encoded_key)
        } else {
            format!("/{}", encoded_key)
        }
    }

    /// Build a SigV4-signed request.
    fn signed_request(
        &self,
        method: Method,
        canonical_uri: &str,
        query_params: &[(String, String)],
        payload: &[u8],
    ) -> reqwest::RequestBuilder {
        let now = Utc::now();
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

        // Canonical query string must be sorted.
        let mut sorted_params = query_params.to_vec();
        sorted_params.sort_by(|a, b| a.0.cmp(&b.0));
        let canonical_querystring: String = sorted_params
            .iter()
            .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let payload_hash = hex_sha256(payload);

        let mut headers = vec![
            ("host".to_string(), self.host.clone()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(ref token) = self.creds.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let signed_headers: String = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method.as_str(),
            canonical_uri,
            canonical_querystring,
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key =
            derive_signing_key(&self.creds.secret_access_key, &date_stamp, &self.region, "s3");
        let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.creds.access_key_id, credential_scope, signed_headers, signature
        );

        let url = if canonical_querystring.is_empty() {
            format!("{}{}", self.endpoint, canonical_uri)
        } else {
            format!("{}{}?{}", self.endpoint, canonical_uri, canonical_querystring)
        };

        let mut req_builder = self
            .client
            .request(method, &url)
            .header("Authorization", &authorization)
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", &amz_date);

        if let Some(ref token) = self.creds.session_token {
            req_builder = req_builder.header("x-amz-security-token", token);
        }
        req_builder
    }

    fn bucket_uri(&self) -> String {
        if self.path_style {
            format!("/{}", uri_encode(&self.bucket))
        } else {
            "/".to_string()
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn describe(&self) -> String {
        format!("s3://{}", self.bucket)
    }

    async fn list_page(&self, prefix: &str, token: Option<String>) -> Result<ListPage> {
        let mut query_params = vec![
            ("list-type".to_string(), "2".to_string()),
            ("max-keys".to_string(), "1000".to_string()),
        ];
        if !prefix.is_empty() {
            query_params.push(("prefix".to_string(), prefix.to_string()));
        }
        if let Some(token) = token {
            query_params.push(("continuation-token".to_string(), token));
        }

        let resp = self
            .signed_request(Method::GET, &self.bucket_uri(), &query_params, b"")
            .send()
            .await
            .with_context(|| {
                format!("Failed to list S3 objects in s3://{}/{}", self.bucket, prefix)
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "S3 ListObjectsV2 failed (HTTP {}): {}",
                status,
                body.chars().take(500).collect::<String>()
            );
        }

        let xml_body = resp.text().await?;
        Ok(parse_list_objects_response(&xml_body))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let resp = self
            .signed_request(Method::GET, &self.canonical_uri(key), &[], b"")
            .send()
            .await
            .with_context(|| format!("Failed to get s3://{}/{}", self.bucket, key))?;

        if !resp.status().is_success() {
            bail!("S3 GetObject failed (HTTP {}) for key '{}'", resp.status(), key);
        }
        Ok(resp.bytes().await?.to_vec())
    }

    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        let resp = self
            .signed_request(Method::PUT, &self.canonical_uri(key), &[], &body)
            .header("Content-Type", content_type)
            .body(body)
            .send()
            .await
            .with_context(|| format!("Failed to put s3://{}/{}", self.bucket, key))?;

        if !resp.status().is_success() {
            bail!("S3 PutObject failed (HTTP {}) for key '{}'", resp.status(), key);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let resp = self
            .signed_request(Method::DELETE, &self.canonical_uri(key), &[], b"")
            .send()
            .await
            .with_context(|| format!("Failed to delete s3://{}/{}", self.bucket, key))?;

        let status = resp.status();
        if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
            bail!("S3 DeleteObject failed (HTTP {}) for key '{}'", status, key);
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let resp = self
            .signed_request(Method::HEAD, &self.canonical_uri(key), &[], b"")
            .send()
            .await
            .with_context(|| format!("Failed to stat s3://{}/{}", self.bucket, key))?;

        match resp.status() {
            s if s.is_success() => Ok(true),
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            s => bail!("S3 HeadObject failed (HTTP {}) for key '{}'", s, key),
        }
    }
}

// ============ AWS SigV4 Helpers ============

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length, so this cannot fail.
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn hex_hmac_sha256(key: &[u8], data: &[u8]) -> String {
    hex::encode(hmac_sha256(key, data))
}

/// Derive the AWS SigV4 signing key for a given date, region, and service.
///
/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// URI-encode a string per RFC 3986, leaving only `A-Z a-z 0-9 - _ . ~`.
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

// ============ XML Parsing (minimal, no extra deps) ============

/// Parse a `ListObjectsV2` XML response.
fn parse_list_objects_response(xml: &str) -> ListPage {
    let mut objects = Vec::new();
    let is_truncated = extract_xml_value(xml, "IsTruncated")
        .map(|v| v == "true")
        .unwrap_or(false);
    let next_token = extract_xml_value(xml, "NextContinuationToken");

    let mut remaining = xml;
    while let Some(start) = remaining.find("<Contents>") {
        let block_start = start + "<Contents>".len();
        let Some(end) = remaining[block_start..].find("</Contents>") else {
            break;
        };
        let block = &remaining[block_start..block_start + end];
        remaining = &remaining[block_start + end + "</Contents>".len()..];

        let key = extract_xml_value(block, "Key")
            .map(|k| xml_unescape(&k))
            .unwrap_or_default();
        if key.is_empty() || key.ends_with('/') {
            continue;
        }

        let etag = extract_xml_value(block, "ETag")
            .map(|e| xml_unescape(&e))
            .unwrap_or_default()
            .trim_matches('"')
            .to_string();

        let size = extract_xml_value(block, "Size")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);

        objects.push(ObjectMeta { key, size, etag });
    }

    ListPage {
        objects,
        next_token: if is_truncated { next_token } else { None },
    }
}

/// Extract the text content of an XML tag (simple, non-nested).
fn extract_xml_value(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)?;
    Some(xml[start..start + end].to_string())
}

fn xml_unescape(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
