use anyhow::{Context, Result};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use postgres_native_tls::MakeTlsConnector;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio_postgres::NoTls;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    pub ssl_mode: SslMode,
    /// Accept invalid/self-signed certificates. Use with caution.
    /// Ignored in the verifying modes.
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// Optional path to a custom CA certificate bundle (PEM format).
    /// If not set, the system CA store is used.
    #[serde(default)]
    pub ca_cert_path: Option<String>,
    /// Size of the connection pool.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    8
}

/// SSL/TLS connection modes for PostgreSQL.
///
/// These match the standard PostgreSQL sslmode parameter:
/// - `Disable`: No SSL (unencrypted)
/// - `Prefer`: Try SSL first, fall back to non-SSL (default)
/// - `Require`: Require SSL but don't verify certificate
/// - `VerifyCa`: Require SSL and verify the server certificate is signed by a trusted CA
/// - `VerifyFull`: Like VerifyCa, but also verify the server hostname matches the certificate
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub enum SslMode {
    Disable,
    #[default]
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl ConnectionConfig {
    pub fn connection_string(&self) -> String {
        // tokio-postgres only knows disable/prefer/require; certificate
        // verification for the verify modes is done by the TLS connector.
        let sslmode = match self.ssl_mode {
            SslMode::Disable => "disable",
            SslMode::Prefer => "prefer",
            SslMode::Require | SslMode::VerifyCa | SslMode::VerifyFull => "require",
        };
        format!(
            "host={} port={} dbname={} user={} password={} sslmode={} connect_timeout=10",
            quote_conn_value(&self.host),
            self.port,
            quote_conn_value(&self.database),
            quote_conn_value(&self.username),
            quote_conn_value(&self.password),
            sslmode
        )
    }

    pub fn display_string(&self) -> String {
        format!(
            "{}@{}:{}/{}",
            self.username, self.host, self.port, self.database
        )
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            name: String::from("Local PostgreSQL"),
            host: String::from("localhost"),
            port: 5432,
            database: String::from("postgres"),
            username: String::from("postgres"),
            password: String::new(),
            ssl_mode: SslMode::default(),
            accept_invalid_certs: false,
            ca_cert_path: None,
            pool_size: default_pool_size(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SavedConnections {
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
}

impl SavedConnections {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("querymodel")
            .join("connections.toml")
    }

    pub fn load() -> Result<Vec<ConnectionConfig>> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(vec![]);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let saved: SavedConnections = toml::from_str(&content)?;
        Ok(saved.connections)
    }

    pub fn find(name: &str) -> Result<Option<ConnectionConfig>> {
        Ok(Self::load()?
            .into_iter()
            .find(|c| c.name.eq_ignore_ascii_case(name)))
    }
}

/// TLS settings kept around so timed-out queries can be cancelled over the
/// same kind of connection they were issued on.
#[derive(Clone)]
pub enum CancelTls {
    Plain,
    Tls(MakeTlsConnector),
}

/// Build a lazily-connecting pool; no connection is opened until first use.
pub fn create_pool(config: &ConnectionConfig) -> Result<(Pool, CancelTls)> {
    let pg_config: tokio_postgres::Config = config
        .connection_string()
        .parse()
        .context("Invalid PostgreSQL connection settings")?;
    let manager_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };

    let (manager, cancel_tls) = match config.ssl_mode {
        SslMode::Disable => (
            Manager::from_config(pg_config, NoTls, manager_config),
            CancelTls::Plain,
        ),
        SslMode::Prefer | SslMode::Require => {
            let tls = build_tls_connector(config, false)?;
            (
                Manager::from_config(pg_config, tls.clone(), manager_config),
                CancelTls::Tls(tls),
            )
        }
        SslMode::VerifyCa | SslMode::VerifyFull => {
            let tls = build_tls_connector(config, true)?;
            (
                Manager::from_config(pg_config, tls.clone(), manager_config),
                CancelTls::Tls(tls),
            )
        }
    };

    let pool = Pool::builder(manager)
        .max_size(config.pool_size.max(1))
        .build()
        .context("Failed to build PostgreSQL connection pool")?;

    Ok((pool, cancel_tls))
}

/// Build a TLS connector with appropriate certificate configuration.
///
/// # Arguments
/// * `config` - Connection configuration
/// * `strict_verify` - If true, always verify certificates (for verify-ca/verify-full modes)
fn build_tls_connector(config: &ConnectionConfig, strict_verify: bool) -> Result<MakeTlsConnector> {
    let mut builder = native_tls::TlsConnector::builder();

    if config.accept_invalid_certs && !strict_verify {
        builder.danger_accept_invalid_certs(true);
        builder.danger_accept_invalid_hostnames(true);
    } else if let Some(ca_path) = &config.ca_cert_path {
        let ca_data = std::fs::read(ca_path)
            .with_context(|| format!("Failed to read CA certificate file: {}", ca_path))?;
        for cert in parse_pem_certificates(&ca_data)? {
            builder.add_root_certificate(cert);
        }
    }

    let connector = builder.build().context("Failed to build TLS connector")?;

    Ok(MakeTlsConnector::new(connector))
}

/// Split a PEM bundle into individual certificates.
fn parse_pem_certificates(pem_data: &[u8]) -> Result<Vec<native_tls::Certificate>> {
    const BEGIN: &str = "-----BEGIN CERTIFICATE-----";
    const END: &str = "-----END CERTIFICATE-----";

    let pem_str =
        std::str::from_utf8(pem_data).context("CA certificate file is not valid UTF-8")?;

    let mut certs = Vec::new();
    let mut rest = pem_str;
    while let Some(start) = rest.find(BEGIN) {
        let Some(len) = rest[start..].find(END) else {
            break;
        };
        let block = &rest[start..start + len + END.len()];
        let cert = native_tls::Certificate::from_pem(block.as_bytes())
            .context("Failed to parse certificate")?;
        certs.push(cert);
        rest = &rest[start + len + END.len()..];
    }

    if certs.is_empty() {
        anyhow::bail!("No valid certificates found in PEM data");
    }

    Ok(certs)
}

/// Quote a value for use in a libpq key=value connection string.
/// Wraps in single quotes and escapes backslashes and single quotes.
fn quote_conn_value(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_string_quotes_values() {
        let config = ConnectionConfig {
            password: String::from("it's"),
            ..Default::default()
        };
        let conn = config.connection_string();
        assert!(conn.contains("password='it\\'s'"));
        assert!(conn.contains("sslmode=prefer"));
        assert!(conn.parse::<tokio_postgres::Config>().is_ok());
    }

    #[test]
    fn test_verify_modes_use_require() {
        let config = ConnectionConfig {
            ssl_mode: SslMode::VerifyFull,
            ..Default::default()
        };
        assert!(config.connection_string().contains("sslmode=require"));
    }

    #[test]
    fn test_display_string() {
        assert_eq!(
            ConnectionConfig::default().display_string(),
            "postgres@localhost:5432/postgres"
        );
    }

    #[test]
    fn test_saved_connections_parse() {
        let saved: SavedConnections = toml::from_str(
            r#"
            [[connections]]
            name = "prod"
            host = "db.internal"
            port = 5433
            database = "crm"
            username = "reader"
            ssl_mode = "Require"
            "#,
        )
        .unwrap();
        let prod = &saved.connections[0];
        assert_eq!(prod.ssl_mode, SslMode::Require);
        assert_eq!(prod.pool_size, 8);
        assert!(prod.password.is_empty());
    }

    #[test]
    fn test_create_pool_is_lazy() {
        let config = ConnectionConfig {
            ssl_mode: SslMode::Disable,
            port: 1,
            ..Default::default()
        };
        assert!(create_pool(&config).is_ok());
    }

    #[test]
    fn test_pem_without_certificates() {
        assert!(parse_pem_certificates(b"not a pem").is_err());
    }
}
