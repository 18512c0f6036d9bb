//! PostgreSQL driver over an `sqlx` pool.
//!
//! The driver traits are blocking, so the data source owns a multi-thread
//! `tokio` runtime and blocks on it for every database round trip. Calling
//! it from inside an async context panics; run it on a plain thread or with
//! `tokio::task::spawn_blocking`.
//!
//! PostgreSQL expects numbered markers, so mappers over this driver write
//! [`PlaceholderStyle::Numbered`] unless configured otherwise.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDateTime, NaiveTime, TimeZone, Utc};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow, Postgres};
use sqlx::query::Query;
use sqlx::{Column as _, Decode, Row, Transaction, Type, TypeInfo as _};
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, trace};
use uuid::Uuid;

use super::{Column, Connection, DataSource, Rows, Statement};
use crate::bind::{TYPE_DB_TIME, TYPE_DB_TIMESTAMP_TZ, TYPE_DB_VARCHAR};
use crate::builder::PlaceholderStyle;
use crate::error::{DriverError, DriverResult};
use crate::value::Value;

/// Connection provider backed by a [`PgPool`].
pub struct PgDataSource {
    pool: PgPool,
    runtime: Arc<Runtime>,
}

impl PgDataSource {
    /// Connects a pool with default options.
    pub fn connect(url: &str) -> DriverResult<Self> {
        Self::connect_with(PgPoolOptions::new(), url)
    }

    pub fn connect_with(options: PgPoolOptions, url: &str) -> DriverResult<Self> {
        let runtime = Builder::new_multi_thread()
            .enable_all()
            .thread_name("sqlx-named-mapper")
            .build()?;
        let pool = runtime.block_on(options.connect(url))?;
        debug!("postgres pool connected");
        Ok(Self {
            pool,
            runtime: Arc::new(runtime),
        })
    }

    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn connection(&self, inner: Inner) -> Box<dyn Connection> {
        Box::new(PgConnection {
            runtime: Arc::clone(&self.runtime),
            inner: Some(inner),
        })
    }
}

impl DataSource for PgDataSource {
    fn open(&self) -> DriverResult<Box<dyn Connection>> {
        let connection = self.runtime.block_on(self.pool.acquire())?;
        Ok(self.connection(Inner::Dedicated(connection)))
    }

    fn begin(&self) -> DriverResult<Box<dyn Connection>> {
        let transaction = self.runtime.block_on(self.pool.begin())?;
        trace!("transaction started");
        Ok(self.connection(Inner::Transaction(transaction)))
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Numbered
    }
}

enum Inner {
    Dedicated(PoolConnection<Postgres>),
    Transaction(Transaction<'static, Postgres>),
}

struct PgConnection {
    runtime: Arc<Runtime>,
    inner: Option<Inner>,
}

impl PgConnection {
    fn parts(&mut self) -> DriverResult<(&Runtime, &mut sqlx::PgConnection)> {
        let connection: &mut sqlx::PgConnection = match self.inner.as_mut() {
            Some(Inner::Dedicated(connection)) => connection,
            Some(Inner::Transaction(transaction)) => transaction,
            None => return Err("connection already finished".into()),
        };
        Ok((self.runtime.as_ref(), connection))
    }

    const fn is_dedicated(&self) -> bool {
        matches!(self.inner, Some(Inner::Dedicated(_)))
    }
}

impl Connection for PgConnection {
    fn prepare<'c>(&'c mut self, sql: &str) -> DriverResult<Box<dyn Statement + 'c>> {
        if self.inner.is_none() {
            return Err("connection already finished".into());
        }
        Ok(Box::new(PgStatement {
            connection: self,
            sql: sql.to_owned(),
            binds: Vec::new(),
            staged: Vec::new(),
        }))
    }

    fn commit(&mut self) -> DriverResult<()> {
        if let Some(Inner::Transaction(transaction)) = self.inner.take() {
            self.runtime.block_on(transaction.commit())?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> DriverResult<()> {
        if let Some(Inner::Transaction(transaction)) = self.inner.take() {
            self.runtime.block_on(transaction.rollback())?;
        }
        Ok(())
    }
}

impl Drop for PgConnection {
    fn drop(&mut self) {
        // returning a connection to the pool spawns onto the runtime
        let _guard = self.runtime.enter();
        self.inner = None;
    }
}

/// One bound parameter, owned until execution.
#[derive(Debug, Clone)]
enum Bound {
    Int(Option<i32>),
    Short(Option<i16>),
    Long(Option<i64>),
    Float(Option<f32>),
    Double(Option<f64>),
    Bool(Option<bool>),
    Text(Option<String>),
    Uuid(Option<Uuid>),
    Timestamp(Option<DateTime<FixedOffset>>),
    Time(Option<NaiveTime>),
    IntArray(Option<Vec<i32>>),
    ShortArray(Option<Vec<i16>>),
    LongArray(Option<Vec<i64>>),
    FloatArray(Option<Vec<f32>>),
    DoubleArray(Option<Vec<f64>>),
    BoolArray(Option<Vec<bool>>),
    TextArray(Option<Vec<String>>),
    UuidArray(Option<Vec<Uuid>>),
    TimestampArray(Option<Vec<DateTime<FixedOffset>>>),
    TimeArray(Option<Vec<NaiveTime>>),
}

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

impl Bound {
    fn bind_to(self, query: PgQuery<'_>) -> PgQuery<'_> {
        match self {
            Self::Int(v) => query.bind(v),
            Self::Short(v) => query.bind(v),
            Self::Long(v) => query.bind(v),
            Self::Float(v) => query.bind(v),
            Self::Double(v) => query.bind(v),
            Self::Bool(v) => query.bind(v),
            Self::Text(v) => query.bind(v),
            Self::Uuid(v) => query.bind(v),
            Self::Timestamp(v) => query.bind(v),
            Self::Time(v) => query.bind(v),
            Self::IntArray(v) => query.bind(v),
            Self::ShortArray(v) => query.bind(v),
            Self::LongArray(v) => query.bind(v),
            Self::FloatArray(v) => query.bind(v),
            Self::DoubleArray(v) => query.bind(v),
            Self::BoolArray(v) => query.bind(v),
            Self::TextArray(v) => query.bind(v),
            Self::UuidArray(v) => query.bind(v),
            Self::TimestampArray(v) => query.bind(v),
            Self::TimeArray(v) => query.bind(v),
        }
    }

    /// Scalar bind inferred from the value. Nulls bind as text.
    fn infer(value: &Value) -> DriverResult<Self> {
        Ok(match value {
            Value::Null | Value::Optional(None) => Self::Text(None),
            Value::Optional(Some(inner)) => return Self::infer(inner),
            Value::Bool(v) => Self::Bool(Some(*v)),
            Value::Byte(v) => Self::Short(Some(i16::from(*v))),
            Value::Short(v) => Self::Short(Some(*v)),
            Value::Int(v) => Self::Int(Some(*v)),
            Value::Long(v) => Self::Long(Some(*v)),
            Value::Float(v) => Self::Float(Some(*v)),
            Value::Double(v) => Self::Double(Some(*v)),
            Value::Char(c) => Self::Text(Some(c.to_string())),
            Value::String(s) | Value::Enum(s) => Self::Text(Some(s.clone())),
            Value::Uuid(v) => Self::Uuid(Some(*v)),
            Value::Timestamp(v) => Self::Timestamp(Some(*v)),
            Value::Time(v) => Self::Time(Some(*v)),
            Value::List(items) | Value::Set(items) => {
                let element_type = items.iter().find(|v| !v.is_null()).map_or(TYPE_DB_VARCHAR, array_type_of);
                return Self::array(element_type, Some(items));
            }
            Value::Record(record) => {
                return Err(format!("record {} cannot be bound as one parameter", record.type_name()).into())
            }
        })
    }

    fn array(element_type: &str, values: Option<&[Value]>) -> DriverResult<Self> {
        Ok(match element_type {
            "integer" | "int" | "int4" | "byte" => Self::IntArray(elements(values, Value::as_i32)?),
            "short" | "smallint" | "int2" => Self::ShortArray(elements(values, Value::as_i16)?),
            "long" | "bigint" | "int8" => Self::LongArray(elements(values, Value::as_i64)?),
            "float" | "real" | "float4" => Self::FloatArray(elements(values, Value::as_f32)?),
            "double" | "float8" => Self::DoubleArray(elements(values, Value::as_f64)?),
            "boolean" | "bool" => Self::BoolArray(elements(values, Value::as_bool)?),
            "string" | "text" | "character" | TYPE_DB_VARCHAR => Self::TextArray(elements(values, |v| match v {
                Value::Char(c) => Some(c.to_string()),
                other => other.as_str().map(str::to_owned),
            })?),
            "uuid" => Self::UuidArray(elements(values, |v| match v {
                Value::Uuid(u) => Some(*u),
                _ => None,
            })?),
            TYPE_DB_TIMESTAMP_TZ => Self::TimestampArray(elements(values, |v| match v {
                Value::Timestamp(t) => Some(*t),
                _ => None,
            })?),
            TYPE_DB_TIME => Self::TimeArray(elements(values, |v| match v {
                Value::Time(t) => Some(*t),
                _ => None,
            })?),
            other => return Err(format!("unsupported array element type `{other}`").into()),
        })
    }
}

fn array_type_of(value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => "boolean",
        Value::Byte(_) | Value::Short(_) => "short",
        Value::Int(_) => "integer",
        Value::Long(_) => "long",
        Value::Float(_) => "float",
        Value::Double(_) => "double",
        Value::Uuid(_) => "uuid",
        Value::Timestamp(_) => TYPE_DB_TIMESTAMP_TZ,
        Value::Time(_) => TYPE_DB_TIME,
        _ => TYPE_DB_VARCHAR,
    }
}

/// Array elements; null elements are refused.
fn elements<T>(values: Option<&[Value]>, extract: impl Fn(&Value) -> Option<T>) -> DriverResult<Option<Vec<T>>> {
    values
        .map(|values| {
            values
                .iter()
                .map(|v| {
                    extract(v).ok_or_else(|| DriverError::from(format!("cannot bind {} as an array element", v.kind_name())))
                })
                .collect()
        })
        .transpose()
}

struct PgStatement<'c> {
    connection: &'c mut PgConnection,
    sql: String,
    binds: Vec<Option<Bound>>,
    staged: Vec<Vec<Bound>>,
}

impl PgStatement<'_> {
    fn set(&mut self, index: usize, bound: Bound) -> DriverResult<()> {
        let slot = index.checked_sub(1).ok_or("parameter indexes start at 1")?;
        if self.binds.len() <= slot {
            self.binds.resize(slot + 1, None);
        }
        self.binds[slot] = Some(bound);
        Ok(())
    }

    fn take_binds(&mut self) -> DriverResult<Vec<Bound>> {
        std::mem::take(&mut self.binds)
            .into_iter()
            .enumerate()
            .map(|(i, bound)| bound.ok_or_else(|| DriverError::from(format!("parameter ${} is not bound", i + 1))))
            .collect()
    }
}

fn query_with<'q>(sql: &'q str, binds: Vec<Bound>) -> PgQuery<'q> {
    binds.into_iter().fold(sqlx::query(sql), |query, bound| bound.bind_to(query))
}

async fn run_staged(sql: &str, staged: Vec<Vec<Bound>>, connection: &mut sqlx::PgConnection) -> Result<Vec<u64>, sqlx::Error> {
    let mut counts = Vec::with_capacity(staged.len());
    for binds in staged {
        let result = query_with(sql, binds).execute(&mut *connection).await?;
        counts.push(result.rows_affected());
    }
    Ok(counts)
}

impl Statement for PgStatement<'_> {
    fn set_int(&mut self, index: usize, value: Option<i32>) -> DriverResult<()> {
        self.set(index, Bound::Int(value))
    }

    fn set_short(&mut self, index: usize, value: Option<i16>) -> DriverResult<()> {
        self.set(index, Bound::Short(value))
    }

    fn set_long(&mut self, index: usize, value: Option<i64>) -> DriverResult<()> {
        self.set(index, Bound::Long(value))
    }

    fn set_float(&mut self, index: usize, value: Option<f32>) -> DriverResult<()> {
        self.set(index, Bound::Float(value))
    }

    fn set_double(&mut self, index: usize, value: Option<f64>) -> DriverResult<()> {
        self.set(index, Bound::Double(value))
    }

    fn set_bool(&mut self, index: usize, value: Option<bool>) -> DriverResult<()> {
        self.set(index, Bound::Bool(value))
    }

    fn set_string(&mut self, index: usize, value: Option<&str>) -> DriverResult<()> {
        self.set(index, Bound::Text(value.map(str::to_owned)))
    }

    fn set_timestamp(&mut self, index: usize, value: Option<DateTime<FixedOffset>>) -> DriverResult<()> {
        self.set(index, Bound::Timestamp(value))
    }

    fn set_time(&mut self, index: usize, value: Option<NaiveTime>) -> DriverResult<()> {
        self.set(index, Bound::Time(value))
    }

    fn set_array(&mut self, index: usize, element_type: &str, values: Option<&[Value]>) -> DriverResult<()> {
        let bound = Bound::array(element_type, values)?;
        self.set(index, bound)
    }

    fn set_object(&mut self, index: usize, value: &Value) -> DriverResult<()> {
        let bound = Bound::infer(value)?;
        self.set(index, bound)
    }

    fn add_batch(&mut self) -> DriverResult<()> {
        let binds = self.take_binds()?;
        self.staged.push(binds);
        Ok(())
    }

    fn execute_update(&mut self) -> DriverResult<u64> {
        let binds = self.take_binds()?;
        let (runtime, connection) = self.connection.parts()?;
        let result = runtime.block_on(query_with(&self.sql, binds).execute(&mut *connection))?;
        Ok(result.rows_affected())
    }

    /// Outside a transaction the elements run in one of their own, so a
    /// failing element leaves none of the batch applied.
    fn execute_batch(&mut self) -> DriverResult<Vec<u64>> {
        let staged = std::mem::take(&mut self.staged);
        let dedicated = self.connection.is_dedicated();
        let (runtime, connection) = self.connection.parts()?;
        let sql = self.sql.as_str();
        let counts = runtime.block_on(async move {
            if !dedicated {
                return run_staged(sql, staged, connection).await;
            }
            let mut transaction = sqlx::Connection::begin(&mut *connection).await?;
            let counts = run_staged(sql, staged, &mut transaction).await?;
            transaction.commit().await?;
            trace!("batch transaction committed");
            Ok(counts)
        })?;
        Ok(counts)
    }

    fn execute_query<'s>(&'s mut self) -> DriverResult<Box<dyn Rows + 's>> {
        let binds = self.take_binds()?;
        let (runtime, connection) = self.connection.parts()?;
        let rows = runtime.block_on(query_with(&self.sql, binds).fetch_all(&mut *connection))?;
        Ok(Box::new(PgRows { rows, current: None }))
    }
}

/// Fully fetched result set.
struct PgRows {
    rows: Vec<PgRow>,
    current: Option<usize>,
}

impl PgRows {
    fn row(&self) -> DriverResult<&PgRow> {
        self.current
            .and_then(|i| self.rows.get(i))
            .ok_or_else(|| DriverError::from("no current row"))
    }

    fn ordinal(row: &PgRow, column: Column<'_>) -> DriverResult<usize> {
        let ordinal = match column {
            Column::Index(index) => {
                let index = index.checked_sub(1).ok_or("column indexes start at 1")?;
                row.try_column(index)?.ordinal()
            }
            Column::Name(name) => row.try_column(name)?.ordinal(),
        };
        Ok(ordinal)
    }

    fn get<T>(&self, column: Column<'_>) -> DriverResult<Option<T>>
    where
        T: for<'r> Decode<'r, Postgres> + Type<Postgres>,
    {
        let row = self.row()?;
        let ordinal = Self::ordinal(row, column)?;
        Ok(row.try_get::<Option<T>, _>(ordinal)?)
    }
}

impl Rows for PgRows {
    fn next_row(&mut self) -> DriverResult<bool> {
        let next = self.current.map_or(0, |i| i + 1);
        self.current = Some(next);
        Ok(next < self.rows.len())
    }

    fn get_int(&self, column: Column<'_>) -> DriverResult<Option<i32>> {
        self.get(column)
    }

    fn get_short(&self, column: Column<'_>) -> DriverResult<Option<i16>> {
        self.get(column)
    }

    fn get_long(&self, column: Column<'_>) -> DriverResult<Option<i64>> {
        self.get(column)
    }

    fn get_float(&self, column: Column<'_>) -> DriverResult<Option<f32>> {
        self.get(column)
    }

    fn get_double(&self, column: Column<'_>) -> DriverResult<Option<f64>> {
        self.get(column)
    }

    fn get_bool(&self, column: Column<'_>) -> DriverResult<Option<bool>> {
        self.get(column)
    }

    fn get_string(&self, column: Column<'_>) -> DriverResult<Option<String>> {
        self.get(column)
    }

    fn get_uuid(&self, column: Column<'_>) -> DriverResult<Option<Uuid>> {
        self.get(column)
    }

    fn get_timestamp(&self, column: Column<'_>) -> DriverResult<Option<DateTime<FixedOffset>>> {
        self.get(column)
    }

    fn get_time(&self, column: Column<'_>) -> DriverResult<Option<NaiveTime>> {
        self.get(column)
    }

    fn get_object(&self, column: Column<'_>) -> DriverResult<Value> {
        let row = self.row()?;
        let ordinal = Self::ordinal(row, column)?;
        let type_name = row.try_column(ordinal)?.type_info().name();

        let value = match type_name {
            "BOOL" => self.get::<bool>(column)?.map(Value::Bool),
            "INT2" => self.get::<i16>(column)?.map(Value::Short),
            "INT4" => self.get::<i32>(column)?.map(Value::Int),
            "INT8" => self.get::<i64>(column)?.map(Value::Long),
            "FLOAT4" => self.get::<f32>(column)?.map(Value::Float),
            "FLOAT8" => self.get::<f64>(column)?.map(Value::Double),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => self.get::<String>(column)?.map(Value::String),
            "UUID" => self.get::<Uuid>(column)?.map(Value::Uuid),
            "TIMESTAMPTZ" => self.get::<DateTime<FixedOffset>>(column)?.map(Value::Timestamp),
            "TIMESTAMP" => self
                .get::<NaiveDateTime>(column)?
                .map(|t| Value::Timestamp(Utc.from_utc_datetime(&t).fixed_offset())),
            "TIME" => self.get::<NaiveTime>(column)?.map(Value::Time),
            "INT4[]" => self.get::<Vec<i32>>(column)?.map(Value::from),
            "INT8[]" => self.get::<Vec<i64>>(column)?.map(Value::from),
            "TEXT[]" | "VARCHAR[]" => self.get::<Vec<String>>(column)?.map(Value::from),
            "UUID[]" => self.get::<Vec<Uuid>>(column)?.map(Value::from),
            other => return Err(format!("unsupported column type {other} at {column}").into()),
        };
        Ok(value.unwrap_or(Value::Null))
    }
}
