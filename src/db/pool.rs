use deadpool::managed::{self, Metrics, PoolError, RecycleError, RecycleResult};
use deadpool_postgres::{ManagerConfig, RecyclingMethod};
use postgres_native_tls::MakeTlsConnector;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, Config};
use tracing::debug;

use super::connection::{self, Connection, SessionInfo};
use crate::config::Configuration;
use crate::error::ConnectionError;

const CLEAN_SESSION: &str = "CLOSE ALL; SET SESSION AUTHORIZATION DEFAULT; RESET ALL; \
     UNLISTEN *; SELECT pg_advisory_unlock_all(); DISCARD TEMP; DISCARD SEQUENCES;";

/// One pooled backend session and the task driving its socket.
pub(crate) struct PooledSession {
    pub(crate) client: Client,
    pub(crate) driver: JoinHandle<()>,
}

/// Opens pool sessions the same way `Connection::connect` opens direct ones,
/// so server notices are logged for both.
pub(crate) struct SessionManager {
    config: Config,
    tls: MakeTlsConnector,
    manager_config: ManagerConfig,
}

impl SessionManager {
    fn new(config: Config, tls: MakeTlsConnector, manager_config: ManagerConfig) -> Self {
        Self {
            config,
            tls,
            manager_config,
        }
    }

    /// Statement run before a session is handed out again, if any.
    fn recycle_query(&self) -> Option<&str> {
        match &self.manager_config.recycling_method {
            RecyclingMethod::Fast => None,
            RecyclingMethod::Verified => Some(""),
            RecyclingMethod::Clean => Some(CLEAN_SESSION),
            RecyclingMethod::Custom(sql) => Some(sql.as_str()),
        }
    }
}

impl managed::Manager for SessionManager {
    type Type = PooledSession;
    type Error = ConnectionError;

    async fn create(&self) -> Result<PooledSession, ConnectionError> {
        let (client, driver) = connection::establish(&self.config, self.tls.clone()).await?;
        debug!("pool session opened");
        Ok(PooledSession { client, driver })
    }

    async fn recycle(
        &self,
        session: &mut PooledSession,
        _: &Metrics,
    ) -> RecycleResult<ConnectionError> {
        if session.client.is_closed() {
            return Err(RecycleError::Message("session closed".into()));
        }
        if let Some(sql) = self.recycle_query() {
            session
                .client
                .simple_query(sql)
                .await
                .map_err(|e| RecycleError::Backend(ConnectionError::Connect(e.to_string())))?;
        }
        Ok(())
    }
}

pub(crate) type PooledObject = managed::Object<SessionManager>;

/// A bounded set of sessions shared by concurrent callers.
///
/// `acquire` waits while every session is in use. The returned
/// `Connection` goes back to the pool when dropped.
pub struct Pool {
    inner: managed::Pool<SessionManager>,
    session: OnceCell<SessionInfo>,
    host: String,
}

impl Pool {
    /// Sessions are opened lazily on first use, so this does no I/O.
    pub fn new(config: &Configuration) -> Result<Pool, ConnectionError> {
        let pg_config = connection::parse_config(&config.connection_string)?;
        let host = connection::host_of(&pg_config);
        let manager = SessionManager::new(
            pg_config,
            connection::tls_connector()?,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );

        let mut builder = managed::Pool::builder(manager);
        if let Some(size) = config.pool_size {
            builder = builder.max_size(size);
        }
        let inner = builder
            .build()
            .map_err(|e| ConnectionError::Pool(e.to_string()))?;
        debug!(host = %host, max_size = inner.status().max_size, "pool created");

        Ok(Pool {
            inner,
            session: OnceCell::new(),
            host,
        })
    }

    /// Take an idle session, opening one if the pool is below capacity.
    pub async fn acquire(&self) -> Result<Connection, ConnectionError> {
        let object = self.inner.get().await.map_err(|e| match e {
            PoolError::Backend(err) => err,
            other => ConnectionError::Pool(other.to_string()),
        })?;
        // Every session of the pool shares database, user and settings.
        let info = self
            .session
            .get_or_try_init(|| connection::session_info(&object.client, self.host.clone()))
            .await?
            .clone();
        Ok(Connection::pooled(object, info))
    }

    pub fn max_size(&self) -> usize {
        self.inner.status().max_size
    }

    /// Stop handing out sessions and drop the idle ones.
    pub fn close(&self) {
        self.inner.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    fn config(connection_string: &str, pool_size: Option<usize>) -> Configuration {
        Configuration {
            connection_string: connection_string.to_string(),
            pool_size,
        }
    }

    fn manager(recycling_method: RecyclingMethod) -> SessionManager {
        SessionManager::new(
            connection::parse_config("host=localhost").unwrap(),
            connection::tls_connector().unwrap(),
            ManagerConfig { recycling_method },
        )
    }

    #[test]
    fn test_pool_size_from_config() {
        let pool = Pool::new(&config("postgresql://app@localhost/blog", Some(5))).unwrap();
        assert_eq!(pool.max_size(), 5);
    }

    #[test]
    fn test_invalid_connection_string() {
        assert!(matches!(
            Pool::new(&config("bad://nonexistent", None)),
            Err(ConnectionError::InvalidConnectionString(_))
        ));
    }

    #[test]
    fn test_recycle_query() {
        assert_eq!(manager(RecyclingMethod::Fast).recycle_query(), None);
        assert_eq!(manager(RecyclingMethod::Verified).recycle_query(), Some(""));
        assert_eq!(
            manager(RecyclingMethod::Clean).recycle_query(),
            Some(CLEAN_SESSION)
        );
        assert_eq!(
            manager(RecyclingMethod::Custom("SELECT 1".into())).recycle_query(),
            Some("SELECT 1")
        );
    }

    #[tokio::test]
    async fn test_acquire_reports_connect_failure() {
        // Nothing listens on port 1, so opening the session itself fails and
        // the error comes back unwrapped.
        let pool = Pool::new(&config(
            "host=127.0.0.1 port=1 user=app sslmode=disable",
            Some(1),
        ))
        .unwrap();
        assert!(matches!(
            pool.acquire().await,
            Err(ConnectionError::Connect(_)) | Err(ConnectionError::Timeout(_))
        ));
    }

    #[tokio::test]
    #[ignore = "requires PGREL_TEST_DATABASE_URL"]
    async fn test_acquire_reuses_sessions() {
        let url = std::env::var("PGREL_TEST_DATABASE_URL").expect("PGREL_TEST_DATABASE_URL not set");
        let pool = Pool::new(&config(&url, Some(2))).unwrap();

        let mut a = pool.acquire().await.unwrap();
        let mut b = pool.acquire().await.unwrap();
        assert_eq!(a.execute("SELECT 1").await.unwrap().height(), 1);
        assert_eq!(b.execute("SELECT 1").await.unwrap().height(), 1);
        assert_eq!(a.database(), b.database());
        drop(a);

        let mut c = pool.acquire().await.unwrap();
        assert_eq!(c.execute("SELECT 1").await.unwrap().height(), 1);
        c.close().await;
        b.close().await;
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    #[ignore = "requires PGREL_TEST_DATABASE_URL"]
    async fn test_pooled_notice_is_logged() {
        let url = std::env::var("PGREL_TEST_DATABASE_URL").expect("PGREL_TEST_DATABASE_URL not set");
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        // The current-thread runtime polls the driver task on this thread.
        let _guard = tracing::subscriber::set_default(subscriber);

        let pool = Pool::new(&config(&url, Some(1))).unwrap();
        let mut conn = pool.acquire().await.unwrap();
        conn.execute("DO $$ BEGIN RAISE NOTICE 'pgrel pooled notice'; END $$")
            .await
            .unwrap();
        assert_eq!(conn.execute("SELECT 1").await.unwrap().height(), 1);

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("WARN"), "{}", output);
        assert!(output.contains("pgrel pooled notice"), "{}", output);
        conn.close().await;
    }
}
