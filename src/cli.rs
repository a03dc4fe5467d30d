use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand};

use crate::types::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "momentography",
    version,
    about = "Sync a photography portfolio from object storage into a local cache and serve it"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,

    /// Path to the cache database
    #[arg(long, env = "DB_PATH", default_value = "data/gallery.db", global = true)]
    pub db_path: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Discover albums and EXIF data in the bucket and reconcile the cache
    Sync {
        #[command(flatten)]
        sync: SyncArgs,

        /// Run continuously, waiting N seconds between runs
        #[arg(long)]
        watch_with_interval: Option<u64>,
    },

    /// Serve the data API and the sync webhook
    Serve {
        #[command(flatten)]
        sync: SyncArgs,

        /// Address to listen on
        #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3000")]
        bind: SocketAddr,

        /// Shared secret expected in the x-webhook-secret header.
        /// The webhook is disabled when unset.
        #[arg(long, env = "WEBHOOK_SECRET")]
        webhook_secret: Option<String>,
    },

    /// Show cache contents and the last update of each kind
    Status,

    /// Write the albums and EXIF projections as JSON files
    Export(ExportArgs),

    /// Set the star rating of one image
    Star {
        /// Image id (`{album}/{file}`)
        photo_id: String,
        /// Rating from 0 to 5
        star: u8,
    },

    /// Set the like count of one image
    Like {
        /// Image id (`{album}/{file}`)
        photo_id: String,
        likes: u64,
    },
}

/// Object storage connection options.
#[derive(Args, Debug, Clone)]
pub struct OssArgs {
    /// Access key id. Requests are anonymous when unset.
    #[arg(long, env = "OSS_ACCESS_KEY")]
    pub oss_access_key: Option<String>,

    /// Access key secret.
    /// WARNING: passing via --oss-secret-key is visible in process listings.
    /// Prefer the OSS_SECRET_KEY environment variable instead.
    #[arg(long, env = "OSS_SECRET_KEY")]
    pub oss_secret_key: Option<String>,

    /// Endpoint host, e.g. oss-cn-hangzhou.aliyuncs.com
    #[arg(long, env = "OSS_ENDPOINT")]
    pub oss_endpoint: String,

    #[arg(long, env = "OSS_BUCKET")]
    pub oss_bucket: String,

    /// Signing region (derived from the endpoint when unset)
    #[arg(long, env = "OSS_REGION")]
    pub oss_region: Option<String>,

    /// Timeout for each storage request, in seconds
    #[arg(long, env = "OSS_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,
}

#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    #[command(flatten)]
    pub oss: OssArgs,

    /// Key prefix holding album folders
    #[arg(long, env = "OSS_GALLERY_PREFIX", default_value = "gallery")]
    pub gallery_prefix: String,

    /// Key of the bulk EXIF JSON document
    #[arg(long, env = "OSS_EXIF_DATA_KEY", default_value = "gallery/exif_data.json")]
    pub exif_key: String,

    /// Public URL for an object; {bucket}, {endpoint} and {key} are substituted
    #[arg(
        long,
        env = "PUBLIC_URL_TEMPLATE",
        default_value = "https://{bucket}.{endpoint}/{key}"
    )]
    pub public_url_template: String,

    /// Attempts for the EXIF phase of a sync
    #[arg(long, default_value_t = 3)]
    pub exif_attempts: u32,

    /// Delay between EXIF attempts, in seconds
    #[arg(long, default_value_t = 3)]
    pub exif_retry_delay_secs: u64,
}

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    #[arg(long, env = "EXIF_JSON_PATH", default_value = "public/data/exif_data.json")]
    pub exif_json_path: String,

    #[arg(long, env = "ALBUMS_JSON_PATH", default_value = "public/data/albums.json")]
    pub albums_json_path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const OSS: [&str; 4] = [
        "--oss-endpoint",
        "oss-cn-hangzhou.aliyuncs.com",
        "--oss-bucket",
        "portfolio",
    ];

    #[test]
    fn test_sync_defaults() {
        let cli = Cli::try_parse_from(["momentography", "sync"].into_iter().chain(OSS)).unwrap();
        assert_eq!(cli.log_level, LogLevel::Info);
        let Command::Sync {
            sync,
            watch_with_interval,
        } = cli.command
        else {
            panic!("expected sync");
        };
        assert_eq!(watch_with_interval, None);
        assert_eq!(sync.gallery_prefix, "gallery");
        assert_eq!(sync.exif_key, "gallery/exif_data.json");
        assert_eq!(sync.exif_attempts, 3);
        assert_eq!(sync.exif_retry_delay_secs, 3);
        assert_eq!(sync.oss.request_timeout_secs, 30);
        assert!(sync.oss.oss_access_key.is_none());
    }

    #[test]
    fn test_sync_requires_bucket() {
        let result = Cli::try_parse_from([
            "momentography",
            "sync",
            "--oss-endpoint",
            "oss-cn-hangzhou.aliyuncs.com",
        ]);
        if std::env::var_os("OSS_BUCKET").is_none() {
            assert!(result.is_err());
        }
    }

    #[test]
    fn test_serve_bind_and_global_flags() {
        let cli = Cli::try_parse_from(
            [
                "momentography",
                "serve",
                "--bind",
                "0.0.0.0:8080",
                "--log-level",
                "debug",
                "--db-path",
                "/tmp/g.db",
            ]
            .into_iter()
            .chain(OSS),
        )
        .unwrap();
        assert_eq!(cli.log_level, LogLevel::Debug);
        assert_eq!(cli.db_path, "/tmp/g.db");
        let Command::Serve { bind, .. } = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(bind.port(), 8080);
    }

    #[test]
    fn test_star_positional_args() {
        let cli = Cli::try_parse_from(["momentography", "star", "tokyo/a.webp", "4"]).unwrap();
        let Command::Star { photo_id, star } = cli.command else {
            panic!("expected star");
        };
        assert_eq!(photo_id, "tokyo/a.webp");
        assert_eq!(star, 4);
    }

    #[test]
    fn test_like_rejects_negative() {
        assert!(Cli::try_parse_from(["momentography", "like", "tokyo/a.webp", "-1"]).is_err());
    }

    #[test]
    fn test_status_needs_no_storage() {
        let cli = Cli::try_parse_from(["momentography", "status"]).unwrap();
        assert!(matches!(cli.command, Command::Status));
    }
}
