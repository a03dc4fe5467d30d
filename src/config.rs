use std::path::PathBuf;
use std::time::Duration;

use crate::cli::{ExportArgs, SyncArgs};
use crate::retry::RetryPolicy;

/// Placeholder replaced by the object key in public URLs.
pub const KEY_PLACEHOLDER: &str = "{key}";

/// Application configuration for the commands that talk to storage.
pub struct Config {
    pub db_path: PathBuf,
    pub webhook_secret: Option<String>,
    pub oss: OssConfig,
    pub sync: SyncConfig,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("db_path", &self.db_path)
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("oss", &self.oss)
            .field("sync", &self.sync)
            .finish()
    }
}

/// Connection settings for the object storage client.
#[derive(Clone)]
pub struct OssConfig {
    /// `https` unless the endpoint was given with an explicit `http://`.
    pub scheme: String,
    /// Endpoint host without scheme or trailing slash.
    pub endpoint: String,
    pub bucket: String,
    pub region: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub timeout: Duration,
}

impl std::fmt::Debug for OssConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OssConfig")
            .field("scheme", &self.scheme)
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Settings for one sync run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Album folder prefix, ending in `/`, or empty for the bucket root.
    pub gallery_prefix: String,
    pub exif_key: String,
    /// Public URL template with bucket and endpoint already filled in; only
    /// [`KEY_PLACEHOLDER`] remains.
    pub public_url_template: String,
    pub request_timeout: Duration,
    pub exif_retry: RetryPolicy,
}

impl SyncConfig {
    /// Public URL for an object key. Each path segment is percent-encoded,
    /// so `#` and `?` in a key stay part of the path.
    pub fn public_url(&self, key: &str) -> String {
        let encoded = key
            .split('/')
            .map(urlencoding::encode)
            .collect::<Vec<_>>()
            .join("/");
        self.public_url_template.replace(KEY_PLACEHOLDER, &encoded)
    }
}

#[cfg(test)]
impl SyncConfig {
    /// Default layout with a fixed public host and no retry delay.
    pub(crate) fn for_tests() -> Self {
        Self {
            gallery_prefix: "gallery/".to_string(),
            exif_key: "gallery/exif_data.json".to_string(),
            public_url_template: "https://portfolio.oss.example.com/{key}".to_string(),
            request_timeout: Duration::from_secs(5),
            exif_retry: RetryPolicy::fixed(3, Duration::ZERO),
        }
    }
}

/// Output locations for the `export` command.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub albums_json_path: PathBuf,
    pub exif_json_path: PathBuf,
}

impl ExportConfig {
    pub fn from_args(args: ExportArgs) -> Self {
        Self {
            albums_json_path: expand_tilde(&args.albums_json_path),
            exif_json_path: expand_tilde(&args.exif_json_path),
        }
    }
}

pub(crate) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Split an endpoint into scheme and bare host.
fn split_endpoint(endpoint: &str) -> (String, String) {
    let endpoint = endpoint.trim().trim_end_matches('/');
    let (scheme, host) = match endpoint.split_once("://") {
        Some((scheme, host)) => (scheme.to_ascii_lowercase(), host),
        None => ("https".to_string(), endpoint),
    };
    (scheme, host.to_string())
}

impl Config {
    pub fn from_cli(
        db_path: &str,
        args: SyncArgs,
        webhook_secret: Option<String>,
    ) -> anyhow::Result<Self> {
        let oss = args.oss;
        let (scheme, endpoint) = split_endpoint(&oss.oss_endpoint);
        if endpoint.is_empty() {
            anyhow::bail!("--oss-endpoint must not be empty");
        }
        if scheme != "https" && scheme != "http" {
            anyhow::bail!("Unsupported endpoint scheme '{}'", scheme);
        }
        if oss.oss_bucket.trim().is_empty() {
            anyhow::bail!("--oss-bucket must not be empty");
        }
        if oss.oss_access_key.is_some() != oss.oss_secret_key.is_some() {
            anyhow::bail!("--oss-access-key and --oss-secret-key must be given together");
        }
        if oss.request_timeout_secs == 0 {
            anyhow::bail!("--request-timeout-secs must be greater than zero");
        }
        if !args.public_url_template.contains(KEY_PLACEHOLDER) {
            anyhow::bail!(
                "--public-url-template must contain {}, got '{}'",
                KEY_PLACEHOLDER,
                args.public_url_template
            );
        }

        // An empty prefix keeps album folders at the bucket root.
        let gallery_prefix = match args.gallery_prefix.trim_matches('/') {
            "" => String::new(),
            prefix => format!("{prefix}/"),
        };
        let public_url_template = args
            .public_url_template
            .replace("{bucket}", &oss.oss_bucket)
            .replace("{endpoint}", &endpoint);
        let timeout = Duration::from_secs(oss.request_timeout_secs);

        Ok(Self {
            db_path: expand_tilde(db_path),
            webhook_secret: webhook_secret.filter(|s| !s.is_empty()),
            sync: SyncConfig {
                gallery_prefix,
                exif_key: args.exif_key,
                public_url_template,
                request_timeout: timeout,
                exif_retry: RetryPolicy::fixed(
                    args.exif_attempts,
                    Duration::from_secs(args.exif_retry_delay_secs),
                ),
            },
            oss: OssConfig {
                scheme,
                endpoint,
                bucket: oss.oss_bucket,
                region: oss.oss_region,
                access_key: oss.oss_access_key,
                secret_key: oss.oss_secret_key,
                timeout,
            },
        })
    }
}
