use std::time::{Duration, Instant};

use postgres_native_tls::MakeTlsConnector;
use tokio::task::JoinHandle;
use tokio_postgres::config::{Host, SslMode};
use tokio_postgres::tls::{MakeTlsConnect, TlsConnect};
use tokio_postgres::{AsyncMessage, Client, Config, NoTls, Socket};
use tracing::{debug, error, warn};

use super::pool::PooledObject;
use super::result::ResultSet;
use crate::ast::{compile, Dialect, Query};
use crate::error::{ConnectionError, QueryExecutionError, Result, SanitizeError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

const SESSION_QUERY: &str = "SELECT current_database() AS database, \
     current_user AS \"user\", \
     current_setting('standard_conforming_strings') AS standard_conforming_strings";

/// Static metadata of a backend session, read once after connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub database: String,
    pub user: String,
    pub host: String,
    pub dialect: Dialect,
}

enum Session {
    Direct {
        client: Client,
        driver: JoinHandle<()>,
    },
    Pooled(PooledObject),
}

/// Exclusive owner of one backend session.
///
/// `execute` takes `&mut self`, so a connection never has more than one
/// statement in flight. Dropping a direct connection closes the session;
/// dropping a pooled one hands it back to its pool.
pub struct Connection {
    session: Session,
    info: SessionInfo,
}

impl Connection {
    /// Open a dedicated session. `connection_string` is either a URI
    /// (`postgresql://user@host/db`) or libpq key=value pairs.
    pub async fn connect(connection_string: &str) -> Result<Connection, ConnectionError> {
        let config = parse_config(connection_string)?;
        let host = host_of(&config);

        let (client, driver) = match config.get_ssl_mode() {
            SslMode::Disable => establish(&config, NoTls).await?,
            _ => establish(&config, tls_connector()?).await?,
        };
        let info = session_info(&client, host).await?;
        debug!(
            database = %info.database,
            user = %info.user,
            host = %info.host,
            "connected"
        );

        Ok(Connection {
            session: Session::Direct { client, driver },
            info,
        })
    }

    pub(crate) fn pooled(object: PooledObject, info: SessionInfo) -> Self {
        Connection {
            session: Session::Pooled(object),
            info,
        }
    }

    pub fn database(&self) -> &str {
        &self.info.database
    }

    pub fn user(&self) -> &str {
        &self.info.user
    }

    pub fn host(&self) -> &str {
        &self.info.host
    }

    pub fn session_info(&self) -> &SessionInfo {
        &self.info
    }

    /// Escaping rules of this session.
    pub fn dialect(&self) -> Dialect {
        self.info.dialect
    }

    pub fn is_closed(&self) -> bool {
        self.client().is_closed()
    }

    /// Run one SQL string. Multiple statements are allowed; the last one's
    /// result is returned.
    pub async fn execute(&mut self, sql: &str) -> Result<ResultSet, QueryExecutionError> {
        debug!(sql, "executing");
        let start = Instant::now();
        let messages = self.client().simple_query(sql).await.map_err(|e| {
            let err = QueryExecutionError::from_pg_error(&e);
            debug!(error = %err, "statement failed");
            err
        })?;
        Ok(ResultSet::from_messages(messages, start.elapsed()))
    }

    /// Render `query` with this session's dialect and run it.
    pub async fn execute_query(&mut self, query: &Query) -> Result<ResultSet> {
        let sql = self.to_sql(query)?;
        Ok(self.execute(&sql).await?)
    }

    pub fn to_sql(&self, query: &Query) -> Result<String> {
        compile(query, &self.info.dialect)
    }

    /// Escape `text` for use between single quotes in this session.
    pub fn sanitize(&self, text: &str) -> Result<String, SanitizeError> {
        self.info.dialect.escape_string(text)
    }

    /// Release the session now. A pooled session is detached from its pool
    /// instead of being returned, so the pool opens a fresh one in its place.
    pub async fn close(self) {
        let (client, driver) = match self.session {
            Session::Direct { client, driver } => (client, driver),
            Session::Pooled(object) => {
                let session = PooledObject::take(object);
                (session.client, session.driver)
            }
        };
        drop(client);
        if let Err(e) = driver.await {
            error!("connection driver task failed: {}", e);
        }
        debug!(host = %self.info.host, "connection closed");
    }

    fn client(&self) -> &Client {
        match &self.session {
            Session::Direct { client, .. } => client,
            Session::Pooled(object) => &object.client,
        }
    }
}

pub(crate) fn parse_config(connection_string: &str) -> Result<Config, ConnectionError> {
    connection_string
        .parse::<Config>()
        .map_err(|e| ConnectionError::InvalidConnectionString(e.to_string()))
}

pub(crate) fn host_of(config: &Config) -> String {
    match config.get_hosts().first() {
        Some(Host::Tcp(host)) => host.clone(),
        #[cfg(unix)]
        Some(Host::Unix(path)) => path.display().to_string(),
        _ => "localhost".to_string(),
    }
}

/// TLS for `sslmode=prefer|require`. As with libpq, these modes encrypt
/// without verifying the server certificate.
pub(crate) fn tls_connector() -> Result<MakeTlsConnector, ConnectionError> {
    let connector = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()
        .map_err(|e| ConnectionError::Tls(e.to_string()))?;
    Ok(MakeTlsConnector::new(connector))
}

/// Connect and spawn the task that drives the socket. Used for direct and
/// pooled sessions alike.
pub(crate) async fn establish<T>(
    config: &Config,
    tls: T,
) -> Result<(Client, JoinHandle<()>), ConnectionError>
where
    T: MakeTlsConnect<Socket> + Send + 'static,
    T::Stream: Send + 'static,
    T::TlsConnect: Send,
    <T::TlsConnect as TlsConnect<Socket>>::Future: Send,
{
    let (client, mut connection) = tokio::time::timeout(CONNECT_TIMEOUT, config.connect(tls))
        .await
        .map_err(|_| ConnectionError::Timeout(CONNECT_TIMEOUT.as_secs()))?
        .map_err(|e| ConnectionError::Connect(e.to_string()))?;

    // Drive the socket and surface server notices.
    let driver = tokio::spawn(async move {
        loop {
            match std::future::poll_fn(|cx| connection.poll_message(cx)).await {
                Some(Ok(AsyncMessage::Notice(notice))) => {
                    warn!(
                        severity = notice.severity(),
                        code = notice.code().code(),
                        "{}",
                        notice.message()
                    );
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("connection error: {}", e);
                    break;
                }
                None => break,
            }
        }
    });

    Ok((client, driver))
}

pub(crate) async fn session_info(
    client: &Client,
    host: String,
) -> Result<SessionInfo, ConnectionError> {
    let messages = client
        .simple_query(SESSION_QUERY)
        .await
        .map_err(|e| ConnectionError::Connect(e.to_string()))?;
    let rs = ResultSet::from_messages(messages, Duration::ZERO);
    if rs.height() != 1 {
        return Err(ConnectionError::Connect(
            "session query returned no row".to_string(),
        ));
    }
    Ok(SessionInfo {
        database: rs.get(0, "database").to_string(),
        user: rs.get(0, "user").to_string(),
        host,
        dialect: Dialect::from_setting(rs.get(0, "standard_conforming_strings")),
    })
}
