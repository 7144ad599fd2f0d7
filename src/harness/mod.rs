//! Black-box test harness for the user API binary
//!
//! Each test run recreates the API's PostgreSQL schema from its create file,
//! seeds the root location the API needs to boot, launches the binary with
//! its config file and waits a fixed delay before talking to it over HTTP.
//! Runs are strictly sequential: the database and port are shared.

use crate::api::{ApiClient, HttpUserApi};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

pub const API_BINARY_ENV: &str = "OSSM_API_BINARY";
pub const API_CONFIG_ENV: &str = "OSSM_API_CONFIG";

/// How long a freshly spawned API gets before the first request.
pub const READINESS_DELAY: Duration = Duration::from_millis(500);

const SEED_ROOT_LOCATION: &str = "INSERT INTO locations (parent_pk, name) VALUES (NULL, 'World')";

pub const TEST_USER_EMAIL: &str = "test@test.com";
pub const TEST_USER_PASSWORD: &str = "password";
pub const TEST_USER_TOKEN: &str = "ABCDEFabcdef12345678";
// Hash of TEST_USER_PASSWORD under the API's test secret key
const TEST_USER_PASSWORD_HASH: &str =
    "06b8cc0b030d942ee8689e440413d2e63e141c220cfeea03c01c4c68f1b4d88e";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    pub db_name: String,
    pub username: String,
    pub host: String,
    pub password: String,
    pub create_file_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// The API's own JSON config file, read for the parts the harness needs.
#[derive(Debug, Clone, Deserialize)]
pub struct HarnessConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
}

impl HarnessConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read API config {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Invalid API config {}", path.display()))
    }

    pub fn api_url(&self) -> String {
        format!("http://{}:{}", self.server.host, self.server.port)
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.database.host)
            .username(&self.database.username)
            .password(&self.database.password)
            .database(&self.database.db_name)
    }

    pub fn create_file(&self) -> PathBuf {
        expand_home(&self.database.create_file_path)
    }
}

/// Expands a leading `~` to `$HOME`.
pub fn expand_home(path: &str) -> PathBuf {
    let home = env::var_os("HOME").map(PathBuf::from);
    match (path.strip_prefix('~'), home) {
        (Some(""), Some(home)) => home,
        (Some(rest), Some(home)) if rest.starts_with('/') => home.join(&rest[1..]),
        _ => PathBuf::from(path),
    }
}

/// Splits a SQL script on `;`, dropping blank statements.
pub fn split_queries(script: &str) -> Vec<String> {
    script
        .split(';')
        .map(str::trim)
        .filter(|query| !query.is_empty())
        .map(String::from)
        .collect()
}

/// A user seeded straight into the database.
#[derive(Debug, Clone)]
pub struct TestUser {
    pub pk: i64,
    pub email: String,
    pub password: String,
    pub auth_token: String,
}

pub struct Harness {
    config: HarnessConfig,
    config_path: PathBuf,
    api_binary: PathBuf,
    create_queries: Vec<String>,
    pool: PgPool,
}

impl Harness {
    pub async fn from_paths(api_binary: impl Into<PathBuf>, config_path: impl Into<PathBuf>) -> Result<Self> {
        let api_binary = api_binary.into();
        let config_path = config_path.into();
        let config = HarnessConfig::load(&config_path)?;

        let create_file = config.create_file();
        let script = std::fs::read_to_string(&create_file)
            .with_context(|| format!("Could not read create file {}", create_file.display()))?;
        let create_queries = split_queries(&script);

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_with(config.connect_options())
            .await
            .with_context(|| {
                format!(
                    "Could not connect to database {} on {}",
                    config.database.db_name, config.database.host
                )
            })?;

        Ok(Self {
            config,
            config_path,
            api_binary,
            create_queries,
            pool,
        })
    }

    /// Reads the binary and config paths from `OSSM_API_BINARY` and
    /// `OSSM_API_CONFIG`.
    pub async fn from_env() -> Result<Self> {
        let api_binary =
            env::var(API_BINARY_ENV).with_context(|| format!("{} must be set", API_BINARY_ENV))?;
        let config_path =
            env::var(API_CONFIG_ENV).with_context(|| format!("{} must be set", API_CONFIG_ENV))?;
        Self::from_paths(api_binary, config_path).await
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn api_url(&self) -> String {
        self.config.api_url()
    }

    pub fn api_client(&self) -> ApiClient {
        ApiClient::new(self.api_url())
    }

    pub fn user_api(&self) -> HttpUserApi {
        HttpUserApi::new(self.api_client())
    }

    /// Recreates the schema and seeds the root location.
    pub async fn reset_database(&self) -> Result<()> {
        for query in &self.create_queries {
            sqlx::raw_sql(query)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Create statement failed: {}", query))?;
        }
        sqlx::raw_sql(SEED_ROOT_LOCATION)
            .execute(&self.pool)
            .await
            .context("Could not seed the root location")?;

        debug!("Recreated schema with {} statements", self.create_queries.len());
        Ok(())
    }

    /// Resets the database, then launches the API and waits for it to settle.
    pub async fn start_api(&self) -> Result<RunningApi> {
        self.reset_database().await?;

        let child = Command::new(&self.api_binary)
            .arg(&self.config_path)
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Could not launch {}", self.api_binary.display()))?;

        info!(
            "Started {} (pid {:?}), waiting {:?}",
            self.api_binary.display(),
            child.id(),
            READINESS_DELAY
        );
        tokio::time::sleep(READINESS_DELAY).await;

        Ok(RunningApi { child })
    }

    /// Inserts an active user with a known password and token.
    pub async fn insert_test_user(&self) -> Result<TestUser> {
        let (pk, auth_token): (i64, String) = sqlx::query_as(
            "INSERT INTO users \
             (email, password, auth_token, is_active, access_level, nickname, timezone_name, \
              language_code, face_recipe, date_created) \
             VALUES ($1, $2, $3, TRUE, 1, 'testuser', 'Australia/Sydney', 'en-au', '', \
                     '2016-01-01 00:00:00+0000') \
             RETURNING pk::bigint, auth_token",
        )
        .bind(TEST_USER_EMAIL)
        .bind(TEST_USER_PASSWORD_HASH)
        .bind(TEST_USER_TOKEN)
        .fetch_one(&self.pool)
        .await
        .context("Could not insert the test user")?;

        Ok(TestUser {
            pk,
            email: TEST_USER_EMAIL.to_string(),
            password: TEST_USER_PASSWORD.to_string(),
            auth_token,
        })
    }
}

/// How long `RunningApi::stop` waits after SIGTERM before killing.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// A launched API process; stopped by `stop`, killed when dropped.
pub struct RunningApi {
    child: Child,
}

impl RunningApi {
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Asks the process to shut down with SIGTERM and waits for it to exit.
    /// A process still running after `SHUTDOWN_GRACE` is killed.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(status) = self.child.try_wait()? {
            warn!("API process had already exited with {}", status);
            bail!("API process exited early with {}", status);
        }

        if let Some(pid) = self.child.id() {
            let signalled = Command::new("kill")
                .arg("-TERM")
                .arg(pid.to_string())
                .status()
                .await
                .map(|status| status.success())
                .unwrap_or(false);

            if signalled {
                match tokio::time::timeout(SHUTDOWN_GRACE, self.child.wait()).await {
                    Ok(status) => {
                        debug!("API process exited with {}", status?);
                        return Ok(());
                    }
                    Err(_) => warn!(
                        "API process ignored SIGTERM for {:?}, killing it",
                        SHUTDOWN_GRACE
                    ),
                }
            } else {
                warn!("Could not send SIGTERM to pid {}, killing it", pid);
            }
        }

        self.child.kill().await.context("Could not stop the API")?;
        debug!("API process killed");
        Ok(())
    }

    /// Waits for the process to exit on its own.
    pub async fn wait(mut self) -> Result<std::process::ExitStatus> {
        Ok(self.child.wait().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_split_queries_skips_blanks() {
        let script = "DROP TABLE IF EXISTS users;\n\nCREATE TABLE users (pk SERIAL);\n  ;\n";
        assert_eq!(
            split_queries(script),
            vec![
                "DROP TABLE IF EXISTS users".to_string(),
                "CREATE TABLE users (pk SERIAL)".to_string(),
            ]
        );
    }

    #[test]
    fn test_expand_home() {
        let home = env::var("HOME").unwrap();
        assert_eq!(expand_home("~/ossm/create.sql"), Path::new(&home).join("ossm/create.sql"));
        assert_eq!(expand_home("/abs/create.sql"), PathBuf::from("/abs/create.sql"));
        assert_eq!(expand_home("~other/file"), PathBuf::from("~other/file"));
    }

    #[test]
    fn test_load_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "database": {{
                    "dbName": "ossm_test",
                    "username": "ossm",
                    "host": "localhost",
                    "password": "secret",
                    "createFilePath": "~/create.sql"
                }},
                "server": {{"host": "127.0.0.1", "port": 8181}}
            }}"#
        )
        .unwrap();

        let config = HarnessConfig::load(file.path()).unwrap();
        assert_eq!(config.database.db_name, "ossm_test");
        assert_eq!(config.api_url(), "http://127.0.0.1:8181");
        assert!(config.create_file().ends_with("create.sql"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_sends_sigterm_first() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("terminated");
        let script = format!(
            "trap 'touch {}; exit 0' TERM; while true; do sleep 0.1; done",
            marker.display()
        );
        let child = Command::new("sh")
            .arg("-c")
            .arg(script)
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        // Let the shell install its trap
        tokio::time::sleep(Duration::from_millis(200)).await;

        RunningApi { child }.stop().await.unwrap();

        assert!(marker.exists(), "the process should see SIGTERM");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_reports_an_early_exit() {
        let child = Command::new("true").kill_on_drop(true).spawn().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(RunningApi { child }.stop().await.is_err());
    }

    #[test]
    fn test_load_config_rejects_missing_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"server": {{"host": "127.0.0.1", "port": 8181}}}}"#).unwrap();
        assert!(HarnessConfig::load(file.path()).is_err());
    }
}
