use config::ConfigError;

use crate::auth::PasswordPolicy;

/// Bounds accepted by the bcrypt crate
const MIN_BCRYPT_COST: u32 = 4;
const MAX_BCRYPT_COST: u32 = 31;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    #[serde(default)]
    pub password: PasswordSettings,
    #[serde(default)]
    pub security: SecuritySettings,
}

impl Settings {
    /// Checks run at startup, before anything binds or connects
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.jwt.validate()?;
        self.password.validate()?;
        self.security.validate()
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// JWT authentication settings
///
/// Access and refresh tokens are signed with different secrets.
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub access_secret: String,
    pub refresh_secret: String,
    #[serde(default = "default_access_token_expiry")]
    pub access_token_expiry: i64, // seconds
    #[serde(default = "default_refresh_token_expiry")]
    pub refresh_token_expiry: i64, // seconds
    pub issuer: String,
    pub audience: String,
}

impl JwtSettings {
    /// Reject secrets that are empty or shared between token kinds
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_secret.trim().is_empty() || self.refresh_secret.trim().is_empty() {
            return Err(ConfigError::Message(
                "jwt.access_secret and jwt.refresh_secret must not be empty".to_string(),
            ));
        }
        if self.access_secret == self.refresh_secret {
            return Err(ConfigError::Message(
                "jwt.access_secret and jwt.refresh_secret must differ".to_string(),
            ));
        }
        if self.access_token_expiry <= 0 || self.refresh_token_expiry <= 0 {
            return Err(ConfigError::Message(
                "jwt token expiries must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Password policy and hashing settings
#[derive(serde::Deserialize, Clone)]
#[serde(default)]
pub struct PasswordSettings {
    pub min_length: usize,
    pub max_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_number: bool,
    pub require_special: bool,
    pub forbidden_words: Vec<String>,
    pub max_consecutive: usize,
    pub bcrypt_cost: u32,
}

impl Default for PasswordSettings {
    fn default() -> Self {
        let policy = PasswordPolicy::default();
        Self {
            min_length: policy.min_length,
            max_length: policy.max_length,
            require_uppercase: policy.require_uppercase,
            require_lowercase: policy.require_lowercase,
            require_number: policy.require_number,
            require_special: policy.require_special,
            forbidden_words: policy.forbidden_words,
            max_consecutive: policy.max_consecutive,
            bcrypt_cost: crate::auth::password::DEFAULT_BCRYPT_COST,
        }
    }
}

impl PasswordSettings {
    pub fn policy(&self) -> PasswordPolicy {
        PasswordPolicy {
            min_length: self.min_length,
            max_length: self.max_length,
            require_uppercase: self.require_uppercase,
            require_lowercase: self.require_lowercase,
            require_number: self.require_number,
            require_special: self.require_special,
            forbidden_words: self.forbidden_words.clone(),
            max_consecutive: self.max_consecutive,
        }
    }

    /// Reject a bcrypt cost the hasher refuses and inverted length bounds
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&self.bcrypt_cost) {
            return Err(ConfigError::Message(format!(
                "password.bcrypt_cost must be between {} and {}",
                MIN_BCRYPT_COST, MAX_BCRYPT_COST
            )));
        }
        if self.min_length == 0 || self.min_length > self.max_length {
            return Err(ConfigError::Message(
                "password.min_length must be positive and not above password.max_length"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(serde::Deserialize, Clone)]
#[serde(default)]
pub struct SecuritySettings {
    pub login_attempts_per_minute: u32,
    pub sweep_interval_seconds: u64,
    /// Peers whose `X-Forwarded-For` / `Forwarded` headers are believed
    pub trusted_proxies: Vec<String>,
    /// CORS origins; empty allows any origin
    pub allowed_origins: Vec<String>,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            login_attempts_per_minute: 10,
            sweep_interval_seconds: 3600,
            trusted_proxies: Vec::new(),
            allowed_origins: Vec::new(),
        }
    }
}

impl SecuritySettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.login_attempts_per_minute == 0 {
            return Err(ConfigError::Message(
                "security.login_attempts_per_minute must be positive".to_string(),
            ));
        }
        if self.sweep_interval_seconds == 0 {
            return Err(ConfigError::Message(
                "security.sweep_interval_seconds must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_access_token_expiry() -> i64 {
    900
}

fn default_refresh_token_expiry() -> i64 {
    604_800
}

/// Load settings from `configuration.yaml`, overridden by `APP__SECTION__KEY`
/// environment variables
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    let settings = settings.try_deserialize::<Settings>()?;
    settings.validate()?;
    Ok(settings)
}
