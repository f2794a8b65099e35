//! Docker container management for integration tests.
//!
//! A SQL Server container is started lazily on first use and shared by every
//! test in the process. It is seeded once with the `pubs` sample rows the
//! suite reads from (see [`crate::fixtures`]).
//!
//! ```rust,ignore
//! use crate::test_containers::mssql_container;
//!
//! let info = mssql_container().await?;
//! let dsn = info.dsn();
//! ```

use once_cell::sync::Lazy;
use std::sync::{Arc, Mutex};
use testcontainers::{ContainerAsync, ContainerRequest, ImageExt, runners::AsyncRunner};
use testcontainers_modules::mssql_server::MssqlServer;

/// Password for the `sa` login inside the test container
const SA_PASSWORD: &str = "Tdsql_Test_Passw0rd";

/// Database created inside the container for the suite
pub const TEST_DATABASE: &str = "pubs";

/// Information about a running test container
#[derive(Clone, Debug)]
pub struct ContainerInfo {
    /// Host address (typically 127.0.0.1)
    pub host: String,
    /// Port number (randomly assigned by testcontainers)
    pub port: u16,
    /// Login name
    pub username: String,
    /// Login password
    pub password: String,
}

impl ContainerInfo {
    /// DSN for `database` on this server
    pub fn dsn_for(&self, database: &str) -> String {
        format!(
            "server={},{};user id={};password={};database={};trust_server_certificate=true",
            self.host, self.port, self.username, self.password, database
        )
    }

    /// DSN for the seeded test database
    pub fn dsn(&self) -> String {
        self.dsn_for(TEST_DATABASE)
    }
}

struct MssqlContainer {
    #[allow(dead_code)]
    inner: ContainerAsync<MssqlServer>,
    info: ContainerInfo,
}

static MSSQL_CONTAINER: Lazy<Arc<Mutex<Option<MssqlContainer>>>> =
    Lazy::new(|| Arc::new(Mutex::new(None)));

fn image() -> ContainerRequest<MssqlServer> {
    MssqlServer::default()
        .with_sa_password(SA_PASSWORD)
        .with_env_var("ACCEPT_EULA", "Y")
}

/// Get or start the SQL Server test container
///
/// The container is started on first access, the test database is created
/// and seeded, and the connection details are cached for later calls.
pub async fn mssql_container() -> anyhow::Result<ContainerInfo> {
    {
        let guard = MSSQL_CONTAINER
            .lock()
            .map_err(|e| anyhow::anyhow!("failed to lock mssql container: {}", e))?;

        if let Some(ref container) = *guard {
            return Ok(container.info.clone());
        }
    }

    tracing::info!("starting SQL Server test container");

    let container = image()
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("failed to start mssql container: {}", e))?;

    let host_port = container
        .get_host_port_ipv4(1433)
        .await
        .map_err(|e| anyhow::anyhow!("failed to get mssql port: {}", e))?;

    let info = ContainerInfo {
        host: "127.0.0.1".to_string(),
        port: host_port,
        username: "sa".to_string(),
        password: SA_PASSWORD.to_string(),
    };

    tracing::info!(port = host_port, "SQL Server test container started, seeding pubs");

    crate::fixtures::create_database(&info.dsn_for("master"), TEST_DATABASE).await?;
    crate::fixtures::seed(&info.dsn()).await?;

    {
        let mut guard = MSSQL_CONTAINER
            .lock()
            .map_err(|e| anyhow::anyhow!("failed to lock mssql container: {}", e))?;

        // Another test may have raced us here; keep the first container.
        if let Some(ref existing) = *guard {
            return Ok(existing.info.clone());
        }
        *guard = Some(MssqlContainer {
            inner: container,
            info: info.clone(),
        });
    }

    Ok(info)
}
