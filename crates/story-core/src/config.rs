use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Number of concurrent media downloads.
pub const POOL_WIDTH: usize = 5;

/// Timeout for the profile/story listing calls.
pub const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for a single media download.
pub const MEDIA_TIMEOUT: Duration = Duration::from_secs(60);

/// Video `url` fields are path suffixes under this host.
pub const VIDEO_CDN_BASE: &str = "https://stories-cdn.fun/";

pub const SERVICE_BASE_URL: &str = "https://storynavigation.com";

pub const DEFAULT_USERNAME: &str = "umaaclara";

pub const DOWNLOAD_DIR_NAME: &str = "auto_archive";

/// Date bucket for stories without a capture timestamp.
pub const UNKNOWN_DATE_DIR: &str = "unknown_date";

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// HTTP settings shared by the listing API and the media downloader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    pub user_agent: String,
    #[serde(with = "secs")]
    pub api_timeout: Duration,
    #[serde(with = "secs")]
    pub media_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: SERVICE_BASE_URL.to_string(),
            user_agent: USER_AGENT.to_string(),
            api_timeout: API_TIMEOUT,
            media_timeout: MEDIA_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveOptions {
    pub username: String,
    pub output: PathBuf,
    #[serde(default)]
    pub client: ClientConfig,
}

impl ArchiveOptions {
    pub fn new(username: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            username: username.into(),
            output: output.into(),
            client: ClientConfig::default(),
        }
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
