//! MS SQL Server connection implementation using tiberius

use crate::dialect::MssqlDialect;
use crate::dsn::{MssqlConnectOptions, parse_dsn};
use crate::statement::MssqlPreparedStatement;
use crate::transaction::MssqlTransaction;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tdsql_core::{
    ColumnMeta, Connection, ConnectionConfig, ExecResult, PreparedStatement, QueryResult, Result,
    Row, TdsqlError, Transaction, Value, check_parameter_count,
};
use tiberius::{Client, ColumnData, FromSql, Row as TiberiusRow, ToSql};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use uuid::Uuid;

pub(crate) type TdsClient = Client<Compat<TcpStream>>;

const ROLLBACK_IF_OPEN: &str = "IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION";

/// MS SQL Server connection errors
#[derive(Debug, thiserror::Error)]
pub enum MssqlConnectionError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Type conversion error: {0}")]
    TypeConversion(String),

    #[error("Timed out connecting to {0}")]
    Timeout(String),

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("Tiberius error: {0}")]
    Tiberius(#[from] tiberius::error::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<MssqlConnectionError> for TdsqlError {
    fn from(err: MssqlConnectionError) -> Self {
        match err {
            MssqlConnectionError::ConnectionFailed(_)
            | MssqlConnectionError::AuthenticationFailed(_) => {
                TdsqlError::Connection(err.to_string())
            }
            MssqlConnectionError::QueryFailed(msg) => TdsqlError::Query(msg),
            MssqlConnectionError::TypeConversion(msg) => TdsqlError::Conversion(msg),
            MssqlConnectionError::Timeout(_) => TdsqlError::Timeout(err.to_string()),
            MssqlConnectionError::ConnectionClosed => TdsqlError::ConnectionClosed,
            MssqlConnectionError::Tiberius(e) => map_tiberius_error(e),
            MssqlConnectionError::Io(e) => TdsqlError::Connection(e.to_string()),
        }
    }
}

/// Translate a tiberius error, keeping the server's error number and text
pub(crate) fn map_tiberius_error(err: tiberius::error::Error) -> TdsqlError {
    use tiberius::error::Error;

    match err {
        Error::Server(token) => TdsqlError::Query(format!(
            "mssql: {} (error {}, state {}, class {})",
            token.message(),
            token.code(),
            token.state(),
            token.class()
        )),
        Error::Io { .. } | Error::Tls(_) => TdsqlError::Connection(err.to_string()),
        Error::Conversion(msg) => TdsqlError::Conversion(msg.into_owned()),
        other => TdsqlError::Driver(other.to_string()),
    }
}

/// State shared by a connection and the transactions and statements made
/// from it
///
/// All of them drive the same TDS session, so every round trip goes through
/// [`Session::lock`].
pub(crate) struct Session {
    client: Mutex<Option<TdsClient>>,
    closed: AtomicBool,
    /// Set when a transaction is dropped without commit or rollback
    pending_rollback: AtomicBool,
    pub(crate) dialect: MssqlDialect,
}

impl Session {
    fn new(client: TdsClient) -> Self {
        Self {
            client: Mutex::new(Some(client)),
            closed: AtomicBool::new(false),
            pending_rollback: AtomicBool::new(false),
            dialect: MssqlDialect::new(),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_pending_rollback(&self) {
        if !self.is_closed() {
            self.pending_rollback.store(true, Ordering::SeqCst);
        }
    }

    /// Lock the client for one round trip
    ///
    /// Rolls back a transaction abandoned by a dropped handle before handing
    /// the client out.
    pub(crate) async fn lock(&self) -> Result<MutexGuard<'_, Option<TdsClient>>> {
        if self.is_closed() {
            return Err(TdsqlError::ConnectionClosed);
        }

        let mut guard = self.client.lock().await;
        let client = guard.as_mut().ok_or(TdsqlError::ConnectionClosed)?;

        if self.pending_rollback.swap(false, Ordering::SeqCst) {
            tracing::warn!("rolling back transaction dropped without commit or rollback");
            run_batch(client, ROLLBACK_IF_OPEN).await?;
        }

        Ok(guard)
    }

    /// Run a statement whose placeholders are already rewritten
    pub(crate) async fn execute_rewritten(&self, sql: &str, params: &[Value]) -> Result<ExecResult> {
        let batch = self.dialect.with_exec_metadata(sql);
        let mut guard = self.lock().await?;
        let client = guard.as_mut().ok_or(TdsqlError::ConnectionClosed)?;
        run_execute(client, &batch, params).await
    }

    /// Run a query whose placeholders are already rewritten
    pub(crate) async fn query_rewritten(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let mut guard = self.lock().await?;
        let client = guard.as_mut().ok_or(TdsqlError::ConnectionClosed)?;
        run_query(client, sql, params).await
    }

    pub(crate) async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult> {
        let rewritten = self.dialect.rewrite_placeholders(sql);
        check_parameter_count(rewritten.parameter_count, params)?;
        self.execute_rewritten(&rewritten.sql, params).await
    }

    pub(crate) async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let rewritten = self.dialect.rewrite_placeholders(sql);
        check_parameter_count(rewritten.parameter_count, params)?;
        self.query_rewritten(&rewritten.sql, params).await
    }

    /// Run a parameterless batch, discarding any results
    pub(crate) async fn batch(&self, sql: &str) -> Result<()> {
        let mut guard = self.lock().await?;
        let client = guard.as_mut().ok_or(TdsqlError::ConnectionClosed)?;
        run_batch(client, sql).await
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        let client = self.client.lock().await.take();
        if let Some(client) = client {
            client.close().await.map_err(map_tiberius_error)?;
        }
        Ok(())
    }
}

/// MS SQL Server connection using tiberius
pub struct MssqlConnection {
    session: Arc<Session>,
    database: Option<String>,
}

impl MssqlConnection {
    /// Open a connection described by a DSN
    ///
    /// ```ignore
    /// let conn = MssqlConnection::open("server=localhost;user id=sa;password=...").await?;
    /// ```
    pub async fn open(dsn: &str) -> Result<Self> {
        let config = parse_dsn(dsn)?;
        Self::from_config(&config).await
    }

    /// Create connection from config with standard keys
    pub async fn from_config(config: &ConnectionConfig) -> Result<Self> {
        let opts = MssqlConnectOptions::from_config(config)?;
        Self::connect(&opts).await
    }

    /// Open a connection, trying the mirror when the primary is unreachable
    #[tracing::instrument(skip(opts), fields(host = %opts.host, port = opts.port, database = opts.database.as_deref()))]
    pub async fn connect(opts: &MssqlConnectOptions) -> Result<Self> {
        let connecting = connect_with_failover(opts);
        let client = match opts.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connecting)
                .await
                .map_err(|_| {
                    MssqlConnectionError::Timeout(format!("{}:{}", opts.host, opts.port))
                })??,
            None => connecting.await?,
        };

        let session = Arc::new(Session::new(client));

        if let Some(ms) = opts.lock_timeout {
            session.batch(&format!("SET LOCK_TIMEOUT {}", ms)).await?;
        }

        tracing::debug!("successfully connected to MS SQL Server");

        Ok(Self {
            session,
            database: opts.database.clone(),
        })
    }

    /// Database selected at login, if any
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }
}

async fn connect_with_failover(
    opts: &MssqlConnectOptions,
) -> std::result::Result<TdsClient, MssqlConnectionError> {
    match connect_endpoint(opts, &opts.host, opts.port).await {
        Ok(client) => Ok(client),
        Err(err) => match &opts.mirror {
            Some((mirror_host, mirror_port)) => {
                tracing::warn!(
                    error = %err,
                    mirror = %mirror_host,
                    "primary server unreachable, trying mirror"
                );
                connect_endpoint(opts, mirror_host, *mirror_port).await
            }
            None => Err(err),
        },
    }
}

async fn connect_endpoint(
    opts: &MssqlConnectOptions,
    host: &str,
    port: u16,
) -> std::result::Result<TdsClient, MssqlConnectionError> {
    tracing::debug!("connecting to MS SQL Server at {}:{}", host, port);

    match login(opts, host, port).await {
        Err(MssqlConnectionError::Tiberius(tiberius::error::Error::Routing { host, port })) => {
            tracing::debug!(host = %host, port = port, "server requested a routing redirect");
            login(opts, &host, port).await
        }
        other => other,
    }
}

async fn login(
    opts: &MssqlConnectOptions,
    host: &str,
    port: u16,
) -> std::result::Result<TdsClient, MssqlConnectionError> {
    let config = opts.tiberius_config(host, port)?;

    let tcp = TcpStream::connect(config.get_addr())
        .await
        .map_err(|e| MssqlConnectionError::ConnectionFailed(format!("{}:{}: {}", host, port, e)))?;
    tcp.set_nodelay(true)?;

    match Client::connect(config, tcp.compat_write()).await {
        Ok(client) => Ok(client),
        Err(e @ tiberius::error::Error::Routing { .. }) => Err(e.into()),
        Err(tiberius::error::Error::Server(token)) if token.code() == 18456 => Err(
            MssqlConnectionError::AuthenticationFailed(token.message().to_string()),
        ),
        Err(e) => Err(MssqlConnectionError::ConnectionFailed(e.to_string())),
    }
}

#[async_trait]
impl Connection for MssqlConnection {
    fn driver_name(&self) -> &str {
        "mssql"
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult> {
        self.session.execute(sql, params).await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.session.query(sql, params).await
    }

    async fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedStatement>> {
        if self.session.is_closed() {
            return Err(TdsqlError::ConnectionClosed);
        }
        Ok(Box::new(MssqlPreparedStatement::new(
            Arc::clone(&self.session),
            sql,
        )))
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        let tx = MssqlTransaction::begin(Arc::clone(&self.session)).await?;
        Ok(Box::new(tx))
    }

    async fn close(&self) -> Result<()> {
        self.session.close().await?;
        tracing::debug!("MS SQL Server connection closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.session.is_closed()
    }
}

impl std::fmt::Debug for MssqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlConnection")
            .field("database", &self.database)
            .field("closed", &self.session.is_closed())
            .finish()
    }
}

/// Run a statement followed by the exec metadata select and read the
/// metadata from the last result set
async fn run_execute(client: &mut TdsClient, batch: &str, params: &[Value]) -> Result<ExecResult> {
    let start = Instant::now();
    let tiberius_params = values_to_tiberius_params(params)?;
    let param_refs: Vec<&dyn ToSql> = tiberius_params.iter().map(|p| p as &dyn ToSql).collect();

    let results = match client.query(batch, &param_refs[..]).await {
        Ok(stream) => stream.into_results().await,
        Err(e) => Err(e),
    }
    .map_err(|e| {
        tracing::error!(error = %e, "execute failed");
        map_tiberius_error(e)
    })?;

    let metadata = results
        .last()
        .and_then(|rows| rows.first())
        .ok_or_else(|| TdsqlError::Driver("statement returned no exec metadata".into()))?;

    let rows_affected = metadata
        .try_get::<i64, _>("rows_affected")
        .map_err(map_tiberius_error)?
        .unwrap_or(0);
    let last_insert_id = metadata
        .try_get::<i64, _>("last_insert_id")
        .map_err(map_tiberius_error)?;

    tracing::debug!(
        affected_rows = rows_affected,
        last_insert_id = last_insert_id,
        duration_ms = start.elapsed().as_millis() as u64,
        "execute completed"
    );

    Ok(ExecResult::new(
        u64::try_from(rows_affected).unwrap_or(0),
        last_insert_id,
    ))
}

/// Run a query and collect its first result set
async fn run_query(client: &mut TdsClient, sql: &str, params: &[Value]) -> Result<QueryResult> {
    let start = Instant::now();
    let tiberius_params = values_to_tiberius_params(params)?;
    let param_refs: Vec<&dyn ToSql> = tiberius_params.iter().map(|p| p as &dyn ToSql).collect();

    let mut stream = client.query(sql, &param_refs[..]).await.map_err(|e| {
        tracing::error!(error = %e, "query failed");
        map_tiberius_error(e)
    })?;

    let columns: Vec<ColumnMeta> = stream
        .columns()
        .await
        .map_err(map_tiberius_error)?
        .map(|cols| {
            cols.iter()
                .enumerate()
                .map(|(idx, col)| tiberius_column_to_meta(col, idx))
                .collect()
        })
        .unwrap_or_default();

    let tib_rows = stream.into_first_result().await.map_err(|e| {
        tracing::error!(error = %e, "query failed");
        map_tiberius_error(e)
    })?;

    let column_names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
    let mut rows: Vec<Row> = Vec::with_capacity(tib_rows.len());
    for tib_row in tib_rows {
        let values = tiberius_row_to_values(tib_row)?;
        rows.push(Row::new(column_names.clone(), values));
    }

    let execution_time_ms = start.elapsed().as_millis() as u64;
    tracing::debug!(
        row_count = rows.len(),
        duration_ms = execution_time_ms,
        "query completed"
    );

    Ok(QueryResult {
        id: Uuid::new_v4(),
        columns,
        rows,
        execution_time_ms,
    })
}

/// Run a plain batch (no parameters) and drain its results
pub(crate) async fn run_batch(client: &mut TdsClient, sql: &str) -> Result<()> {
    let stream = client.simple_query(sql).await.map_err(map_tiberius_error)?;
    stream.into_results().await.map_err(map_tiberius_error)?;
    Ok(())
}

/// Convert a tiberius column to ColumnMeta
fn tiberius_column_to_meta(col: &tiberius::Column, ordinal: usize) -> ColumnMeta {
    ColumnMeta {
        name: col.name().to_string(),
        data_type: format!("{:?}", col.column_type()),
        nullable: true,
        ordinal,
    }
}

/// Convert a tiberius row to a vector of Values by consuming the row
fn tiberius_row_to_values(row: TiberiusRow) -> Result<Vec<Value>> {
    row.into_iter().map(column_data_to_value).collect()
}

fn temporal<'a, T, F>(data: &'a ColumnData<'static>, wrap: F) -> Result<Value>
where
    T: FromSql<'a>,
    F: FnOnce(T) -> Value,
{
    Ok(T::from_sql(data)
        .map_err(map_tiberius_error)?
        .map(wrap)
        .unwrap_or(Value::Null))
}

/// Convert tiberius ColumnData to a Value
pub(crate) fn column_data_to_value(col_data: ColumnData<'static>) -> Result<Value> {
    match col_data {
        ColumnData::Bit(v) => Ok(v.map(Value::Bool).unwrap_or(Value::Null)),
        ColumnData::U8(v) => Ok(v.map(|v| Value::Int16(i16::from(v))).unwrap_or(Value::Null)),
        ColumnData::I16(v) => Ok(v.map(Value::Int16).unwrap_or(Value::Null)),
        ColumnData::I32(v) => Ok(v.map(Value::Int32).unwrap_or(Value::Null)),
        ColumnData::I64(v) => Ok(v.map(Value::Int64).unwrap_or(Value::Null)),
        ColumnData::F32(v) => Ok(v.map(Value::Float32).unwrap_or(Value::Null)),
        ColumnData::F64(v) => Ok(v.map(Value::Float64).unwrap_or(Value::Null)),
        ColumnData::String(v) => Ok(v
            .map(|s| Value::String(s.into_owned()))
            .unwrap_or(Value::Null)),
        ColumnData::Guid(v) => Ok(v.map(Value::Uuid).unwrap_or(Value::Null)),
        ColumnData::Binary(v) => Ok(v
            .map(|b| Value::Bytes(b.into_owned()))
            .unwrap_or(Value::Null)),
        ColumnData::Numeric(v) => Ok(v
            .map(|n| Value::Decimal(n.to_string()))
            .unwrap_or(Value::Null)),
        ColumnData::Xml(v) => Ok(v
            .map(|x| Value::String(x.into_owned().into_string()))
            .unwrap_or(Value::Null)),
        ref data @ (ColumnData::DateTime(_)
        | ColumnData::SmallDateTime(_)
        | ColumnData::DateTime2(_)) => temporal::<chrono::NaiveDateTime, _>(data, Value::DateTime),
        ref data @ ColumnData::DateTimeOffset(_) => {
            temporal::<chrono::DateTime<chrono::FixedOffset>, _>(data, |dt| {
                Value::DateTimeUtc(dt.with_timezone(&chrono::Utc))
            })
        }
        ref data @ ColumnData::Date(_) => temporal::<chrono::NaiveDate, _>(data, Value::Date),
        ref data @ ColumnData::Time(_) => temporal::<chrono::NaiveTime, _>(data, Value::Time),
    }
}

/// Owned parameter values handed to tiberius
///
/// `Null` is sent as an `nvarchar` NULL, which the server converts
/// implicitly to every type but `varbinary`/`image`; a NULL bound for a
/// binary column needs an explicit `cast(? as varbinary(...))`.
/// Timezone-aware datetimes keep their offset so they travel as
/// `datetimeoffset` rather than `datetime2`.
#[derive(Debug)]
pub(crate) enum TiberiusParam {
    Null,
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    Date(chrono::NaiveDate),
    Time(chrono::NaiveTime),
    DateTime(chrono::NaiveDateTime),
    DateTimeOffset(chrono::DateTime<chrono::FixedOffset>),
}

impl ToSql for TiberiusParam {
    fn to_sql(&self) -> ColumnData<'_> {
        match self {
            TiberiusParam::Null => ColumnData::String(None),
            TiberiusParam::Bool(v) => ColumnData::Bit(Some(*v)),
            TiberiusParam::I16(v) => ColumnData::I16(Some(*v)),
            TiberiusParam::I32(v) => ColumnData::I32(Some(*v)),
            TiberiusParam::I64(v) => ColumnData::I64(Some(*v)),
            TiberiusParam::F32(v) => ColumnData::F32(Some(*v)),
            TiberiusParam::F64(v) => ColumnData::F64(Some(*v)),
            TiberiusParam::String(v) => {
                ColumnData::String(Some(std::borrow::Cow::Borrowed(v.as_str())))
            }
            TiberiusParam::Bytes(v) => {
                ColumnData::Binary(Some(std::borrow::Cow::Borrowed(v.as_slice())))
            }
            TiberiusParam::Uuid(v) => ColumnData::Guid(Some(*v)),
            TiberiusParam::Date(v) => v.to_sql(),
            TiberiusParam::Time(v) => v.to_sql(),
            TiberiusParam::DateTime(v) => v.to_sql(),
            TiberiusParam::DateTimeOffset(v) => v.to_sql(),
        }
    }
}

/// Convert Values to tiberius parameters
pub(crate) fn values_to_tiberius_params(values: &[Value]) -> Result<Vec<TiberiusParam>> {
    values
        .iter()
        .map(|v| {
            let param = match v {
                Value::Null => TiberiusParam::Null,
                Value::Bool(b) => TiberiusParam::Bool(*b),
                Value::Int8(i) => TiberiusParam::I16(i16::from(*i)),
                Value::Int16(i) => TiberiusParam::I16(*i),
                Value::Int32(i) => TiberiusParam::I32(*i),
                Value::Int64(i) => TiberiusParam::I64(*i),
                Value::Float32(f) => TiberiusParam::F32(*f),
                Value::Float64(f) => TiberiusParam::F64(*f),
                Value::Decimal(d) => TiberiusParam::String(d.clone()),
                Value::String(s) => TiberiusParam::String(s.clone()),
                Value::Bytes(b) => TiberiusParam::Bytes(b.clone()),
                Value::Uuid(u) => TiberiusParam::Uuid(*u),
                Value::Date(d) => TiberiusParam::Date(*d),
                Value::Time(t) => TiberiusParam::Time(*t),
                Value::DateTime(dt) => TiberiusParam::DateTime(*dt),
                Value::DateTimeUtc(dt) => TiberiusParam::DateTimeOffset((*dt).into()),
                Value::Json(j) => TiberiusParam::String(j.to_string()),
                Value::Array(arr) => TiberiusParam::String(serde_json::to_string(arr)?),
            };
            Ok(param)
        })
        .collect()
}
