//! DSN parsing and connection options for MS SQL Server
//!
//! A DSN is a list of `key=value` pairs separated by `;`, for example
//! `server=localhost;user id=sa;password=secret;database=pubs`. Keys are
//! case-insensitive and several ADO.NET spellings are accepted. A value that
//! contains `;` can be wrapped in braces: `password={a;b}` (a literal `}` is
//! written `}}`).

use crate::connection::MssqlConnectionError;
use std::time::Duration;
use tdsql_core::{ConnectionConfig, Result, TdsqlError, parse_bool};
use tiberius::{AuthMethod, Config, EncryptionLevel};

/// Default SQL Server port
pub const DEFAULT_PORT: u16 = 1433;

/// Parse a DSN into a connection configuration for the `mssql` driver
///
/// Recognised keys end up in the typed fields of [`ConnectionConfig`] or under
/// their canonical name in `params`; unknown keys are kept as they were
/// written (lowercased).
pub fn parse_dsn(dsn: &str) -> Result<ConnectionConfig> {
    let mut config = ConnectionConfig::new("mssql");

    for (key, value) in split_pairs(dsn)? {
        match key.as_str() {
            "host" | "server" | "data source" | "addr" | "address" => {
                let (host, port) = split_host_port(&value)?;
                config.host = host;
                if let Some(port) = port {
                    config.port = port;
                }
            }
            "port" => config.port = parse_port(&value)?,
            "database" | "initial catalog" => config.database = Some(value),
            "user" | "user id" | "uid" | "username" => config.username = Some(value),
            "password" | "pwd" => config.password = Some(value),
            "mirror" | "failover partner" => {
                split_host_port(&value)?;
                config.params.insert("mirror".into(), value);
            }
            "app" | "application name" => {
                config.params.insert("application_name".into(), value);
            }
            "encrypt" => {
                parse_encryption(&value)?;
                config.params.insert("encrypt".into(), value);
            }
            "trust_server_certificate" | "trustservercertificate" | "trust server certificate"
            | "trust_cert" => {
                require_bool(&key, &value)?;
                config.params.insert("trust_server_certificate".into(), value);
            }
            "max_pool_size" | "max pool size" => {
                require_number(&key, &value)?;
                config.params.insert("max_pool_size".into(), value);
            }
            "lock_timeout" | "lock timeout" => {
                require_number(&key, &value)?;
                config.params.insert("lock_timeout".into(), value);
            }
            "connect_timeout" | "connect timeout" | "connection timeout" => {
                require_number(&key, &value)?;
                config.params.insert("connect_timeout".into(), value);
            }
            _ => {
                tracing::debug!(key = %key, "keeping unrecognised DSN key");
                config.params.insert(key, value);
            }
        }
    }

    if config.host.is_empty() {
        return Err(TdsqlError::Configuration(
            "DSN does not name a server (host=...)".into(),
        ));
    }

    Ok(config)
}

/// Build an ADO-style connection string from a configuration
///
/// Values that would not survive a round trip through [`parse_dsn`] are
/// brace-quoted.
pub fn build_connection_string(config: &ConnectionConfig) -> String {
    let host = if config.host.is_empty() {
        "localhost"
    } else {
        config.host.as_str()
    };
    let port = if config.port > 0 {
        config.port
    } else {
        DEFAULT_PORT
    };

    let mut parts = vec![format!("Server={},{}", quote_value(host), port)];

    if let Some(db) = &config.database {
        parts.push(format!("Database={}", quote_value(db)));
    }
    if let Some(user) = &config.username {
        parts.push(format!("User Id={}", quote_value(user)));
        if let Some(password) = &config.password {
            parts.push(format!("Password={}", quote_value(password)));
        }
    }

    let mut keys: Vec<&String> = config.params.keys().collect();
    keys.sort();
    for key in keys {
        parts.push(format!("{}={}", key, quote_value(&config.params[key])));
    }

    parts.join(";")
}

/// Options needed to open a TDS connection, resolved from a [`ConnectionConfig`]
#[derive(Clone)]
pub struct MssqlConnectOptions {
    pub host: String,
    pub port: u16,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Failover partner tried when the primary host cannot be reached
    pub mirror: Option<(String, u16)>,
    pub application_name: Option<String>,
    pub encryption: EncryptionLevel,
    pub trust_cert: bool,
    /// `SET LOCK_TIMEOUT` value in milliseconds
    pub lock_timeout: Option<u64>,
    pub connect_timeout: Option<Duration>,
}

impl MssqlConnectOptions {
    /// Resolve options from a configuration
    pub fn from_config(config: &ConnectionConfig) -> Result<Self> {
        let host = if config.host.is_empty() {
            "localhost".to_string()
        } else {
            config.host.clone()
        };
        let port = if config.port > 0 {
            config.port
        } else {
            DEFAULT_PORT
        };

        let mirror = match config.params.get("mirror") {
            Some(raw) => {
                let (host, port) = split_host_port(raw)?;
                Some((host, port.unwrap_or(DEFAULT_PORT)))
            }
            None => None,
        };

        let encryption = match config.params.get("encrypt") {
            Some(raw) => parse_encryption(raw)?,
            None => EncryptionLevel::Required,
        };

        let trust_cert = config
            .get_bool("trust_server_certificate")?
            .or(config.get_bool("trust_cert")?)
            .unwrap_or(false);

        Ok(Self {
            host,
            port,
            database: config.database.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            mirror,
            application_name: config.params.get("application_name").cloned(),
            encryption,
            trust_cert,
            lock_timeout: config.get_u64("lock_timeout")?,
            connect_timeout: config.get_u64("connect_timeout")?.map(Duration::from_secs),
        })
    }

    /// Build the tiberius configuration for one concrete endpoint
    pub(crate) fn tiberius_config(
        &self,
        host: &str,
        port: u16,
    ) -> std::result::Result<Config, MssqlConnectionError> {
        let mut config = Config::new();
        config.host(host);
        config.port(port);

        if let Some(db) = &self.database {
            config.database(db);
        }
        if let Some(app) = &self.application_name {
            config.application_name(app);
        }
        if self.trust_cert {
            config.trust_cert();
        }
        config.encryption(self.encryption);

        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => {
                config.authentication(AuthMethod::sql_server(user, pass));
            }
            (Some(user), None) => {
                config.authentication(AuthMethod::sql_server(user, ""));
            }
            (None, _) => {
                #[cfg(windows)]
                {
                    config.authentication(AuthMethod::Integrated);
                }
                #[cfg(not(windows))]
                {
                    return Err(MssqlConnectionError::AuthenticationFailed(
                        "no user id given and Windows authentication is only supported on Windows"
                            .to_string(),
                    ));
                }
            }
        }

        Ok(config)
    }
}

impl std::fmt::Debug for MssqlConnectOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlConnectOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("mirror", &self.mirror)
            .field("application_name", &self.application_name)
            .field("encryption", &self.encryption)
            .field("trust_cert", &self.trust_cert)
            .field("lock_timeout", &self.lock_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// Split `host,port`, `host:port` or a bare host
///
/// A `tcp:` prefix is accepted and dropped. Named instances (`host\name`)
/// need the SQL Browser service and are rejected.
pub fn split_host_port(raw: &str) -> Result<(String, Option<u16>)> {
    let raw = raw.trim();
    let raw = raw
        .strip_prefix("tcp:")
        .or_else(|| raw.strip_prefix("TCP:"))
        .unwrap_or(raw);

    if raw.contains('\\') {
        return Err(TdsqlError::Configuration(format!(
            "named instances are not supported, use host,port instead: {}",
            raw
        )));
    }

    let split = raw.rsplit_once(',').or_else(|| raw.rsplit_once(':'));
    let (host, port) = match split {
        Some((host, port)) => (host.trim(), Some(parse_port(port)?)),
        None => (raw, None),
    };

    if host.is_empty() {
        return Err(TdsqlError::Configuration(format!(
            "missing host name in '{}'",
            raw
        )));
    }

    Ok((host.to_string(), port))
}

fn parse_port(raw: &str) -> Result<u16> {
    raw.trim()
        .parse::<u16>()
        .map_err(|_| TdsqlError::Configuration(format!("invalid port: {}", raw)))
}

/// Map the accepted `encrypt` spellings to a tiberius encryption level
pub fn parse_encryption(raw: &str) -> Result<EncryptionLevel> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "required" | "strict" | "mandatory" => Ok(EncryptionLevel::Required),
        "on" => Ok(EncryptionLevel::On),
        "false" | "no" | "off" | "optional" => Ok(EncryptionLevel::Off),
        "not_supported" | "disable" | "none" => Ok(EncryptionLevel::NotSupported),
        other => Err(TdsqlError::Configuration(format!(
            "invalid value for 'encrypt': {}",
            other
        ))),
    }
}

fn require_bool(key: &str, raw: &str) -> Result<()> {
    match parse_bool(raw) {
        Some(_) => Ok(()),
        None => Err(TdsqlError::Configuration(format!(
            "invalid boolean for '{}': {}",
            key, raw
        ))),
    }
}

fn require_number(key: &str, raw: &str) -> Result<()> {
    raw.trim().parse::<u64>().map(|_| ()).map_err(|_| {
        TdsqlError::Configuration(format!("invalid number for '{}': {}", key, raw))
    })
}

/// Split a DSN into lowercased keys and their values
fn split_pairs(dsn: &str) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    let mut chars = dsn.chars().peekable();

    loop {
        let mut key = String::new();
        let mut saw_equals = false;
        for c in chars.by_ref() {
            match c {
                '=' => {
                    saw_equals = true;
                    break;
                }
                ';' => break,
                _ => key.push(c),
            }
        }

        let key = key.trim().to_ascii_lowercase();
        if !saw_equals {
            if !key.is_empty() {
                return Err(TdsqlError::Configuration(format!(
                    "DSN segment '{}' is not a key=value pair",
                    key
                )));
            }
            if chars.peek().is_none() {
                break;
            }
            continue;
        }
        if key.is_empty() {
            return Err(TdsqlError::Configuration("DSN segment without a key".into()));
        }

        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }

        let mut value = String::new();
        if chars.peek() == Some(&'{') {
            chars.next();
            let mut closed = false;
            while let Some(c) = chars.next() {
                if c == '}' {
                    if chars.peek() == Some(&'}') {
                        chars.next();
                        value.push('}');
                        continue;
                    }
                    closed = true;
                    break;
                }
                value.push(c);
            }
            if !closed {
                return Err(TdsqlError::Configuration(format!(
                    "unterminated braced value for '{}'",
                    key
                )));
            }
            for c in chars.by_ref() {
                match c {
                    ';' => break,
                    c if c.is_whitespace() => {}
                    c => {
                        return Err(TdsqlError::Configuration(format!(
                            "unexpected '{}' after braced value for '{}'",
                            c, key
                        )));
                    }
                }
            }
        } else {
            for c in chars.by_ref() {
                if c == ';' {
                    break;
                }
                value.push(c);
            }
            value = value.trim().to_string();
        }

        pairs.push((key, value));
        if chars.peek().is_none() {
            break;
        }
    }

    Ok(pairs)
}

fn quote_value(value: &str) -> String {
    let needs_braces = value.contains([';', '{', '}'])
        || value.starts_with(char::is_whitespace)
        || value.ends_with(char::is_whitespace);
    if needs_braces {
        format!("{{{}}}", value.replace('}', "}}"))
    } else {
        value.to_string()
    }
}
