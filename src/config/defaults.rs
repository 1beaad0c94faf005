/// Configuration default values
///
/// All defaults live here so they can be changed in one place.
// Web server defaults
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;

// Upstream defaults
pub const DEFAULT_RADAR_BASE_URL: &str = "https://api.cloudflare.com/client/v4";
pub const DEFAULT_PROBE_BASE_URL: &str = "https://api.pingdom.com/api/3.1";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

// Fallback credential variables, read when the config leaves tokens empty
pub const RADAR_TOKEN_ENV: &str = "CLOUDFLARE_API_TOKEN";
pub const PROBE_TOKEN_ENV: &str = "PINGDOM_API_TOKEN";

// Stream defaults
pub const DEFAULT_NEAREST_K: usize = 8;
pub const DEFAULT_LOCATION_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 15;

// Storage defaults
pub const DEFAULT_PROBE_CACHE_PATH: &str = "./data/probe-cache.json";
pub const DEFAULT_HISTORY_DIR: &str = "./data/history";

// History defaults
pub const DEFAULT_HISTORY_ENABLED: bool = true;

// Environment overrides, e.g. GLOBE_LATENCY_WEB__PORT=9000
pub const ENV_PREFIX: &str = "GLOBE_LATENCY_";
pub const ENV_SEPARATOR: &str = "__";
