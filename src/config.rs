use anyhow::{Context, anyhow};
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub api_prefix: String,

    // Rate limiting
    pub rate_protected_per_min: u32,

    pub log_level: Level,

    // Payslips
    pub company_name: String,
    pub payslip_font_path: PathBuf,
    pub payslip_bold_font_path: Option<PathBuf>,
    pub payslip_logo_path: Option<PathBuf>,
    /// `false` forces the individual-download fallback
    pub archive_compression: bool,

    pub batch_list_cache_ttl: Duration,

    /// Offset of the overtime scanner's local clock from UTC
    pub scan_timezone_offset_hours: i32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads settings through `lookup`; malformed values are errors, not defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let required = |key: &str| lookup(key).ok_or_else(|| anyhow!("{} must be set", key));

        fn parsed<T>(raw: Option<String>, key: &str, default: T) -> anyhow::Result<T>
        where
            T: FromStr,
            T::Err: Display,
        {
            match raw {
                Some(value) => value
                    .trim()
                    .parse()
                    .map_err(|e| anyhow!("{}", e))
                    .with_context(|| format!("{} has an invalid value: {:?}", key, value)),
                None => Ok(default),
            }
        }

        let optional_path = |key: &str| lookup(key).filter(|v| !v.trim().is_empty()).map(PathBuf::from);

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            api_prefix: lookup("API_PREFIX").unwrap_or_else(|| "/api".to_string()),

            rate_protected_per_min: parsed(
                lookup("RATE_PROTECTED_PER_MIN"),
                "RATE_PROTECTED_PER_MIN",
                1000,
            )?,

            log_level: parsed(lookup("LOG_LEVEL"), "LOG_LEVEL", Level::DEBUG)?,

            company_name: lookup("COMPANY_NAME").unwrap_or_else(|| "Unitop".to_string()),
            payslip_font_path: optional_path("PAYSLIP_FONT_PATH")
                .unwrap_or_else(|| PathBuf::from("assets/fonts/DejaVuSans.ttf")),
            payslip_bold_font_path: optional_path("PAYSLIP_BOLD_FONT_PATH")
                .or_else(|| Some(PathBuf::from("assets/fonts/DejaVuSans-Bold.ttf"))),
            payslip_logo_path: optional_path("PAYSLIP_LOGO_PATH"),
            archive_compression: parsed(
                lookup("ARCHIVE_COMPRESSION"),
                "ARCHIVE_COMPRESSION",
                true,
            )?,

            batch_list_cache_ttl: Duration::from_secs(parsed(
                lookup("BATCH_LIST_CACHE_TTL_SECS"),
                "BATCH_LIST_CACHE_TTL_SECS",
                30,
            )?),

            scan_timezone_offset_hours: parsed(
                lookup("SCAN_TIMEZONE_OFFSET_HOURS"),
                "SCAN_TIMEZONE_OFFSET_HOURS",
                8,
            )?,
        })
    }
}
