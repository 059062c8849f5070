use serde::Deserialize;
use serde::de::DeserializeOwned;

pub use config::ConfigError;

pub trait EnvConfig: Sized {
    fn from_env() -> Result<Self, ConfigError>;
    fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError>;
}

impl<D> EnvConfig for D
where
    D: DeserializeOwned,
{
    fn from_env() -> Result<Self, ConfigError> {
        let c = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .expect("basic config builder");
        c.try_deserialize()
    }

    fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError> {
        let c = config::Config::builder()
            .add_source(config::Environment::with_prefix(prefix))
            .build()
            .expect("basic config builder");
        c.try_deserialize()
    }
}

/// Parse the truthy/falsy vocabulary accepted across form and env inputs.
/// Returns `None` for anything unrecognized.
pub fn coerce_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Application settings, read from the environment via [`EnvConfig`].
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,

    #[serde(default = "default_true")]
    pub reg_notify_enabled: bool,

    #[serde(default = "default_team_address")]
    pub reg_notify_to: String,

    #[serde(default = "default_team_address")]
    pub bootcamp_request_to: String,

    /// JSONL fallback archive for cohort requests. Empty disables archiving.
    #[serde(default = "default_archive_path")]
    pub bootcamp_request_archive: String,

    #[serde(default = "default_team_address")]
    pub contact_to: String,

    #[serde(default = "default_brand_name")]
    pub brand_name: String,

    #[serde(default = "default_brand_logo_url")]
    pub brand_logo_url: String,

    #[serde(default = "default_brand_accent")]
    pub brand_accent: String,

    #[serde(default = "default_site_url")]
    pub site_url: String,

    #[serde(default = "default_access_code")]
    pub course_access_code: String,

    #[serde(default = "default_base_price")]
    pub base_price_eur: u32,

    #[serde(default = "default_promo_code")]
    pub promo_code: String,

    #[serde(default = "default_promo_price")]
    pub promo_price_eur: u32,

    #[serde(default = "default_promo_code_free")]
    pub promo_code_free: String,

    #[serde(default)]
    pub promo_price_free_eur: u32,

    #[serde(default = "default_bootcamp_code")]
    pub bootcamp_code: String,

    #[serde(default = "default_bootcamp_price")]
    pub bootcamp_price_eur: u32,

    #[serde(default = "default_bootcamp_seat_cap")]
    pub bootcamp_seat_cap: u32,
}

fn default_http_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_team_address() -> String {
    "connect@aiforimpact.net".to_string()
}

fn default_archive_path() -> String {
    "instance/bootcamp_requests.jsonl".to_string()
}

fn default_brand_name() -> String {
    "Ai For Impact".to_string()
}

fn default_brand_logo_url() -> String {
    "https://i.imgur.com/STm5VaG.png".to_string()
}

fn default_brand_accent() -> String {
    "#5ca9ff".to_string()
}

fn default_site_url() -> String {
    "https://aiforimpact.net".to_string()
}

fn default_access_code() -> String {
    "letmein".to_string()
}

fn default_base_price() -> u32 {
    900
}

fn default_promo_code() -> String {
    "IMPACT-439".to_string()
}

fn default_promo_price() -> u32 {
    439
}

fn default_promo_code_free() -> String {
    "IMPACT-100".to_string()
}

fn default_bootcamp_code() -> String {
    "BOOT-AI-2024".to_string()
}

fn default_bootcamp_price() -> u32 {
    350
}

fn default_bootcamp_seat_cap() -> u32 {
    20
}
