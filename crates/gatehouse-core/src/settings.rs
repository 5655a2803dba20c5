//! # Settings Loader
//!
//! Builds the single immutable [`Settings`] value from environment
//! variables. Loading happens once at startup; the result is shared as
//! `Arc<Settings>` and never mutated.
//!
//! ## Failure Model
//!
//! Every variable is checked before returning. If anything is missing or
//! malformed the loader returns one [`ConfigurationError`] listing all of
//! the problems, so a misconfigured deployment is fixed in one round trip.
//! List-shaped variables (`BACKEND_CORS_ORIGINS`, `ALLOWED_HOSTS`) are JSON
//! arrays of strings; anything else fails rather than defaulting.
//!
//! ## Variables
//!
//! | Variable | Default |
//! |---|---|
//! | `SECRET_KEY` | required unless `ENVIRONMENT=TEST` |
//! | `ENVIRONMENT` | `DEV` |
//! | `BACKEND_CORS_ORIGINS` | `[]` |
//! | `ALLOWED_HOSTS` | `["localhost","127.0.0.1"]` |
//! | `POSTGRES_SERVER` / `_USER` / `_PASSWORD` / `_PORT` / `_DB` | `db` / `postgres` / empty / `5432` / `app-db` |
//! | `DATABASE_URL` (or `SQLALCHEMY_DATABASE_URI`) | assembled from the `POSTGRES_*` fields |
//! | `ACCESS_TOKEN_EXPIRE_MINUTES` | `30` |
//! | `REFRESH_TOKEN_EXPIRE_MINUTES` | `10080` |
//! | `TOKEN_LEEWAY_SECONDS` | `0` |
//! | `SECURITY_HASH_MEMORY_KIB` / `_ITERATIONS` / `_PARALLELISM` | `19456` / `2` / `1` |
//! | `SERVER_HOST` / `SERVER_PORT` | `0.0.0.0` / `8000` |
//! | `USERS_OPEN_REGISTRATION` | `true` |
//! | `FIRST_SUPERUSER` / `FIRST_SUPERUSER_PASSWORD` | unset |
//! | `LOGIN_RATE_LIMIT_MAX` / `LOGIN_RATE_LIMIT_WINDOW_SECS` | `10` / `60` |
//! | `TRUSTED_PROXIES` | `[]` |

use std::collections::{BTreeSet, HashMap};
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use chrono::Duration;
use url::Url;
use zeroize::Zeroizing;

use crate::credential::{check_password_policy, normalize_identifier};
use crate::error::{ConfigProblem, ConfigurationError};
use crate::secret::SecretKey;

/// Minimum secret length accepted in production.
pub const PROD_MIN_SECRET_LEN: usize = 32;

/// Upper bound on configurable token lifetimes (ten years), in minutes.
const MAX_LIFETIME_MINUTES: i64 = 10 * 365 * 24 * 60;

const DEFAULT_ALLOWED_HOSTS: &[&str] = &["localhost", "127.0.0.1"];

/// Variables holding an explicit connection URI, in precedence order.
const DATABASE_URI_VARS: &[&str] = &["DATABASE_URL", "SQLALCHEMY_DATABASE_URI"];

// ── Environment ─────────────────────────────────────────────────────────────

/// Deployment environment tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Environment {
    #[default]
    Dev,
    Staging,
    Prod,
    /// Explicitly-marked test mode. The only environment allowed to run
    /// without a configured secret key.
    Test,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dev => "DEV",
            Self::Staging => "STAGING",
            Self::Prod => "PROD",
            Self::Test => "TEST",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Prod)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEV" => Ok(Self::Dev),
            "STAGING" | "PREPROD" => Ok(Self::Staging),
            "PROD" => Ok(Self::Prod),
            "TEST" | "PYTEST" => Ok(Self::Test),
            other => Err(format!(
                "unknown environment '{other}', expected one of DEV, STAGING, PROD, TEST"
            )),
        }
    }
}

// ── Sub-settings ────────────────────────────────────────────────────────────

/// Database connection parameters. Passed through untouched to the
/// data-access layer; nothing in this workspace opens a connection.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseSettings {
    pub server: String,
    pub user: String,
    pub password: String,
    pub port: u16,
    pub name: String,
    uri: String,
}

impl DatabaseSettings {
    /// Connection URI: `DATABASE_URL` if set, otherwise assembled from the
    /// individual fields with user and password percent-encoded.
    pub fn connection_uri(&self) -> &str {
        &self.uri
    }
}

impl std::fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("server", &self.server)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("port", &self.port)
            .field("name", &self.name)
            .finish()
    }
}

/// Argon2id work factor. Fixed by configuration; callers of the hasher
/// cannot lower it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl HashCost {
    fn problems(&self) -> Vec<ConfigProblem> {
        let mut problems = Vec::new();
        if self.iterations < 1 {
            problems.push(problem("SECURITY_HASH_ITERATIONS", "must be at least 1"));
        }
        if !(1..=64).contains(&self.parallelism) {
            problems.push(problem(
                "SECURITY_HASH_PARALLELISM",
                "must be between 1 and 64",
            ));
        }
        if self.memory_kib < 8 * self.parallelism.max(1) {
            problems.push(problem(
                "SECURITY_HASH_MEMORY_KIB",
                "must be at least 8 KiB per lane of parallelism",
            ));
        }
        problems
    }
}

/// Listener address for the HTTP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerSettings {
    pub addr: SocketAddr,
}

/// Fixed-window limit on login attempts per client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub max_attempts: u64,
    pub window: std::time::Duration,
    /// Peers whose `X-Forwarded-For` header is believed. Empty means the
    /// client is always the TCP peer.
    pub trusted_proxies: BTreeSet<IpAddr>,
}

/// Account created at startup when the user store has no such identifier.
#[derive(Clone)]
pub struct SuperuserSeed {
    pub identifier: String,
    pub password: Zeroizing<String>,
}

impl std::fmt::Debug for SuperuserSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuperuserSeed")
            .field("identifier", &self.identifier)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

// ── Settings ────────────────────────────────────────────────────────────────

/// Process-wide configuration. Constructed once, then read-only.
#[derive(Debug, Clone)]
pub struct Settings {
    pub secret_key: SecretKey,
    pub environment: Environment,
    pub cors_origins: BTreeSet<String>,
    pub allowed_hosts: BTreeSet<String>,
    pub database: DatabaseSettings,
    pub access_token_lifetime: Duration,
    pub refresh_token_lifetime: Duration,
    /// Clock-skew tolerance applied to token time checks.
    pub token_leeway: Duration,
    pub hash_cost: HashCost,
    pub server: ServerSettings,
    pub open_registration: bool,
    pub first_superuser: Option<SuperuserSeed>,
    pub login_rate_limit: RateLimitSettings,
}

impl Settings {
    /// Load settings from the process environment.
    ///
    /// Variables whose names or values are not valid UTF-8 are ignored,
    /// which surfaces as "missing" for required ones.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_vars(
            std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?))),
        )
    }

    /// Load settings from an explicit set of variables.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut env = VarReader::new(vars);

        let environment = env.parsed("ENVIRONMENT", Environment::default());
        let secret_key = env.secret_key(environment);
        let cors_origins = env.origins("BACKEND_CORS_ORIGINS");
        let allowed_hosts = env.hosts("ALLOWED_HOSTS");
        let database = env.database();

        let access_token_lifetime = env.minutes("ACCESS_TOKEN_EXPIRE_MINUTES", 30);
        let refresh_token_lifetime = env.minutes("REFRESH_TOKEN_EXPIRE_MINUTES", 7 * 24 * 60);
        let leeway_secs: u32 = env.parsed("TOKEN_LEEWAY_SECONDS", 0);

        let hash_cost = HashCost {
            memory_kib: env.parsed("SECURITY_HASH_MEMORY_KIB", HashCost::default().memory_kib),
            iterations: env.parsed("SECURITY_HASH_ITERATIONS", HashCost::default().iterations),
            parallelism: env.parsed(
                "SECURITY_HASH_PARALLELISM",
                HashCost::default().parallelism,
            ),
        };
        env.problems.extend(hash_cost.problems());

        let host: IpAddr = env.parsed("SERVER_HOST", IpAddr::from([0, 0, 0, 0]));
        let port: u16 = env.parsed("SERVER_PORT", 8000);

        let open_registration = env.flag("USERS_OPEN_REGISTRATION", true);
        let first_superuser = env.superuser_seed();

        let max_attempts: u64 = env.parsed("LOGIN_RATE_LIMIT_MAX", 10);
        let window_secs: u64 = env.parsed("LOGIN_RATE_LIMIT_WINDOW_SECS", 60);
        if max_attempts == 0 {
            env.push("LOGIN_RATE_LIMIT_MAX", "must be greater than 0");
        }
        if window_secs == 0 {
            env.push("LOGIN_RATE_LIMIT_WINDOW_SECS", "must be greater than 0");
        }
        let trusted_proxies = env.addresses("TRUSTED_PROXIES");

        if !env.problems.is_empty() {
            return Err(ConfigurationError::new(env.problems));
        }

        Ok(Self {
            secret_key,
            environment,
            cors_origins,
            allowed_hosts,
            database,
            access_token_lifetime,
            refresh_token_lifetime,
            token_leeway: Duration::seconds(i64::from(leeway_secs)),
            hash_cost,
            server: ServerSettings {
                addr: SocketAddr::new(host, port),
            },
            open_registration,
            first_superuser,
            login_rate_limit: RateLimitSettings {
                max_attempts,
                window: std::time::Duration::from_secs(window_secs),
                trusted_proxies,
            },
        })
    }
}

// ── Variable reader ─────────────────────────────────────────────────────────

fn problem(field: &'static str, reason: impl Into<String>) -> ConfigProblem {
    ConfigProblem {
        field,
        reason: reason.into(),
    }
}

/// Reads variables and accumulates problems instead of returning early.
///
/// Each accessor returns a usable placeholder on failure so that loading
/// can continue and report later fields too.
struct VarReader {
    vars: HashMap<String, String>,
    problems: Vec<ConfigProblem>,
}

impl VarReader {
    fn new<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            problems: Vec::new(),
        }
    }

    fn push(&mut self, field: &'static str, reason: impl Into<String>) {
        self.problems.push(problem(field, reason));
    }

    /// Value of a variable; blank values count as unset.
    fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    fn string(&self, name: &str, default: &str) -> String {
        self.get(name).unwrap_or(default).trim().to_string()
    }

    fn parsed<T>(&mut self, name: &'static str, default: T) -> T
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let Some(raw) = self.get(name).map(|v| v.trim().to_string()) else {
            return default;
        };
        match raw.parse() {
            Ok(value) => value,
            Err(e) => {
                let reason = format!("could not parse '{raw}': {e}");
                self.push(name, reason);
                default
            }
        }
    }

    fn flag(&mut self, name: &'static str, default: bool) -> bool {
        let Some(raw) = self.get(name) else {
            return default;
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                self.push(name, "expected a boolean (true/false)");
                default
            }
        }
    }

    fn minutes(&mut self, name: &'static str, default: i64) -> Duration {
        let minutes: i64 = self.parsed(name, default);
        if !(1..=MAX_LIFETIME_MINUTES).contains(&minutes) {
            self.push(
                name,
                format!("must be between 1 and {MAX_LIFETIME_MINUTES} minutes"),
            );
            return Duration::minutes(default);
        }
        Duration::minutes(minutes)
    }

    fn secret_key(&mut self, environment: Environment) -> SecretKey {
        let raw = self.vars.get("SECRET_KEY").cloned().map(Zeroizing::new);
        match raw {
            Some(value) if !value.trim().is_empty() => {
                if environment.is_production() && value.len() < PROD_MIN_SECRET_LEN {
                    self.push(
                        "SECRET_KEY",
                        format!("must be at least {PROD_MIN_SECRET_LEN} bytes in PROD"),
                    );
                }
                SecretKey::new(value.as_bytes().to_vec())
            }
            _ if environment == Environment::Test => {
                tracing::warn!("SECRET_KEY not set in TEST mode; using an ephemeral random key");
                SecretKey::generate()
            }
            Some(_) => {
                self.push("SECRET_KEY", "must not be empty");
                SecretKey::new(Vec::new())
            }
            None => {
                self.push("SECRET_KEY", "is required outside TEST mode");
                SecretKey::new(Vec::new())
            }
        }
    }

    /// Parse a JSON array of strings. `None` means the variable is unset.
    fn json_list(&mut self, name: &'static str) -> Option<Vec<String>> {
        let raw = self.get(name)?.to_string();
        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(items) => {
                let mut cleaned = Vec::with_capacity(items.len());
                for item in items {
                    let item = item.trim().to_string();
                    if item.is_empty() {
                        self.push(name, "entries must not be empty");
                    } else if item.contains('*') {
                        self.push(
                            name,
                            format!("wildcard entry '{item}' is not supported; list exact values"),
                        );
                    } else {
                        cleaned.push(item);
                    }
                }
                Some(cleaned)
            }
            Err(e) => {
                self.push(name, format!("expected a JSON array of strings: {e}"));
                Some(Vec::new())
            }
        }
    }

    fn origins(&mut self, name: &'static str) -> BTreeSet<String> {
        self.json_list(name)
            .unwrap_or_default()
            .into_iter()
            .map(|o| o.trim_end_matches('/').to_string())
            .collect()
    }

    fn hosts(&mut self, name: &'static str) -> BTreeSet<String> {
        let hosts: BTreeSet<String> = match self.json_list(name) {
            Some(list) => list
                .into_iter()
                .map(|h| crate::admission::normalize_configured_host(&h))
                .collect(),
            None => DEFAULT_ALLOWED_HOSTS.iter().map(|h| h.to_string()).collect(),
        };
        if hosts.is_empty() && !self.problems.iter().any(|p| p.field == name) {
            self.push(name, "must list at least one host");
        }
        hosts
    }

    fn addresses(&mut self, name: &'static str) -> BTreeSet<IpAddr> {
        let mut addresses = BTreeSet::new();
        for item in self.json_list(name).unwrap_or_default() {
            match item.parse::<IpAddr>() {
                Ok(ip) => {
                    addresses.insert(ip);
                }
                Err(_) => self.push(name, format!("'{item}' is not an IP address")),
            }
        }
        addresses
    }

    fn database(&mut self) -> DatabaseSettings {
        let server = self.string("POSTGRES_SERVER", "db");
        let user = self.string("POSTGRES_USER", "postgres");
        let password = self.vars.get("POSTGRES_PASSWORD").cloned().unwrap_or_default();
        let port: u16 = self.parsed("POSTGRES_PORT", 5432);
        let name = self.string("POSTGRES_DB", "app-db");

        let explicit = DATABASE_URI_VARS
            .iter()
            .find_map(|&name| Some((name, self.get(name)?.trim().to_string())));
        let uri = match explicit {
            Some((var, explicit)) => match Url::parse(&explicit) {
                Ok(url) if matches!(url.scheme(), "postgres" | "postgresql") => url.to_string(),
                Ok(url) => {
                    let reason = format!("unsupported scheme '{}'", url.scheme());
                    self.push(var, reason);
                    String::new()
                }
                Err(e) => {
                    self.push(var, format!("not a valid URL: {e}"));
                    String::new()
                }
            },
            None => match assemble_postgres_uri(&server, &user, &password, port, &name) {
                Ok(uri) => uri,
                Err(reason) => {
                    self.push("POSTGRES_SERVER", reason);
                    String::new()
                }
            },
        };

        DatabaseSettings {
            server,
            user,
            password,
            port,
            name,
            uri,
        }
    }

    fn superuser_seed(&mut self) -> Option<SuperuserSeed> {
        let identifier = self.get("FIRST_SUPERUSER").map(normalize_identifier);
        let password = self
            .vars
            .get("FIRST_SUPERUSER_PASSWORD")
            .filter(|p| !p.is_empty())
            .cloned()
            .map(Zeroizing::new);

        match (identifier, password) {
            (None, None) => None,
            (Some(identifier), Some(password)) => {
                if let Err(reason) = check_password_policy(&password) {
                    self.push("FIRST_SUPERUSER_PASSWORD", reason);
                }
                Some(SuperuserSeed {
                    identifier,
                    password,
                })
            }
            (Some(_), None) => {
                self.push(
                    "FIRST_SUPERUSER_PASSWORD",
                    "is required when FIRST_SUPERUSER is set",
                );
                None
            }
            (None, Some(_)) => {
                self.push(
                    "FIRST_SUPERUSER",
                    "is required when FIRST_SUPERUSER_PASSWORD is set",
                );
                None
            }
        }
    }
}

fn assemble_postgres_uri(
    server: &str,
    user: &str,
    password: &str,
    port: u16,
    db: &str,
) -> Result<String, String> {
    let mut url = Url::parse(&format!("postgresql://{server}"))
        .map_err(|e| format!("'{server}' is not a valid host: {e}"))?;
    url.set_port(Some(port))
        .map_err(|()| format!("'{server}' cannot carry a port"))?;
    url.set_username(user)
        .map_err(|()| format!("'{server}' cannot carry credentials"))?;
    if !password.is_empty() {
        url.set_password(Some(password))
            .map_err(|()| format!("'{server}' cannot carry credentials"))?;
    }
    url.set_path(&format!("/{db}"));
    Ok(url.to_string())
}
