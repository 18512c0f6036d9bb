//! In-memory driver that records what compiled methods do and serves rows
//! from a script.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, FixedOffset, NaiveTime};
use sqlx_named_mapper::config::PlaceholderStyle;
use sqlx_named_mapper::driver::{Column, Connection, DataSource, Rows, Statement};
use sqlx_named_mapper::error::{DriverError, DriverResult};
use sqlx_named_mapper::Value;
use uuid::Uuid;

pub type Row = Vec<(String, Value)>;

/// Builds a row from `(column, value)` pairs.
pub fn row<const N: usize>(columns: [(&str, Value); N]) -> Row {
    columns
        .into_iter()
        .map(|(name, value)| (name.to_owned(), value))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Begin(usize),
    Open(usize),
    Prepare { connection: usize, sql: String },
    Update { sql: String, binds: Vec<Value> },
    Batch { sql: String, elements: Vec<Vec<Value>> },
    Query { connection: usize, sql: String, binds: Vec<Value> },
    Commit(usize),
    Rollback(usize),
    Release(usize),
}

type Responder = dyn Fn(&str, &[Value]) -> Vec<Row> + Send + Sync;

struct Shared {
    responder: Box<Responder>,
    events: Mutex<Vec<Event>>,
    next_id: AtomicUsize,
    fail_prepare: Mutex<Option<String>>,
    fail_execute: Mutex<Option<String>>,
    placeholder: Mutex<PlaceholderStyle>,
}

impl Shared {
    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    fn fails(slot: &Mutex<Option<String>>, sql: &str) -> bool {
        slot.lock()
            .unwrap()
            .as_deref()
            .is_some_and(|fragment| sql.contains(fragment))
    }
}

#[derive(Clone)]
pub struct ScriptedSource {
    shared: Arc<Shared>,
}

impl ScriptedSource {
    /// `responder` returns the rows of a query given its SQL and binds.
    pub fn new(responder: impl Fn(&str, &[Value]) -> Vec<Row> + Send + Sync + 'static) -> Self {
        Self {
            shared: Arc::new(Shared {
                responder: Box::new(responder),
                events: Mutex::new(Vec::new()),
                next_id: AtomicUsize::new(1),
                fail_prepare: Mutex::new(None),
                fail_execute: Mutex::new(None),
                placeholder: Mutex::new(PlaceholderStyle::Question),
            }),
        }
    }

    pub fn empty() -> Self {
        Self::new(|_, _| Vec::new())
    }

    /// Statements whose SQL contains `fragment` fail to prepare.
    pub fn fail_prepare_on(&self, fragment: &str) {
        *self.shared.fail_prepare.lock().unwrap() = Some(fragment.to_owned());
    }

    /// Marker style the source asks mappers for.
    pub fn expect_placeholders(&self, style: PlaceholderStyle) {
        *self.shared.placeholder.lock().unwrap() = style;
    }

    /// Statements whose SQL contains `fragment` fail to execute.
    pub fn fail_execute_on(&self, fragment: &str) {
        *self.shared.fail_execute.lock().unwrap() = Some(fragment.to_owned());
    }

    pub fn events(&self) -> Vec<Event> {
        self.shared.events.lock().unwrap().clone()
    }

    /// SQL and binds of every executed query, in order.
    pub fn queries(&self) -> Vec<(String, Vec<Value>)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Query { sql, binds, .. } => Some((sql, binds)),
                _ => None,
            })
            .collect()
    }

    pub fn queries_matching(&self, fragment: &str) -> usize {
        self.queries()
            .iter()
            .filter(|(sql, _)| sql.contains(fragment))
            .count()
    }

    fn connection(&self, begin: bool) -> Box<dyn Connection> {
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        self.shared
            .record(if begin { Event::Begin(id) } else { Event::Open(id) });
        Box::new(ScriptedConnection {
            id,
            shared: Arc::clone(&self.shared),
        })
    }
}

impl DataSource for ScriptedSource {
    fn open(&self) -> DriverResult<Box<dyn Connection>> {
        Ok(self.connection(false))
    }

    fn begin(&self) -> DriverResult<Box<dyn Connection>> {
        Ok(self.connection(true))
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        *self.shared.placeholder.lock().unwrap()
    }
}

struct ScriptedConnection {
    id: usize,
    shared: Arc<Shared>,
}

impl Connection for ScriptedConnection {
    fn prepare<'c>(&'c mut self, sql: &str) -> DriverResult<Box<dyn Statement + 'c>> {
        if Shared::fails(&self.shared.fail_prepare, sql) {
            return Err(format!("cannot prepare `{sql}`").into());
        }
        self.shared.record(Event::Prepare {
            connection: self.id,
            sql: sql.to_owned(),
        });
        Ok(Box::new(ScriptedStatement {
            connection: self,
            sql: sql.to_owned(),
            binds: Vec::new(),
            staged: Vec::new(),
        }))
    }

    fn commit(&mut self) -> DriverResult<()> {
        self.shared.record(Event::Commit(self.id));
        Ok(())
    }

    fn rollback(&mut self) -> DriverResult<()> {
        self.shared.record(Event::Rollback(self.id));
        Ok(())
    }
}

impl Drop for ScriptedConnection {
    fn drop(&mut self) {
        self.shared.record(Event::Release(self.id));
    }
}

struct ScriptedStatement<'c> {
    connection: &'c mut ScriptedConnection,
    sql: String,
    binds: Vec<Value>,
    staged: Vec<Vec<Value>>,
}

impl ScriptedStatement<'_> {
    fn set(&mut self, index: usize, value: Value) -> DriverResult<()> {
        let slot = index.checked_sub(1).ok_or("parameter indexes start at 1")?;
        if self.binds.len() <= slot {
            self.binds.resize(slot + 1, Value::Null);
        }
        self.binds[slot] = value;
        Ok(())
    }

    fn check_execute(&self) -> DriverResult<()> {
        if Shared::fails(&self.connection.shared.fail_execute, &self.sql) {
            return Err(format!("cannot execute `{}`", self.sql).into());
        }
        Ok(())
    }
}

impl Statement for ScriptedStatement<'_> {
    fn set_int(&mut self, index: usize, value: Option<i32>) -> DriverResult<()> {
        self.set(index, value.into())
    }

    fn set_short(&mut self, index: usize, value: Option<i16>) -> DriverResult<()> {
        self.set(index, value.into())
    }

    fn set_long(&mut self, index: usize, value: Option<i64>) -> DriverResult<()> {
        self.set(index, value.into())
    }

    fn set_float(&mut self, index: usize, value: Option<f32>) -> DriverResult<()> {
        self.set(index, value.into())
    }

    fn set_double(&mut self, index: usize, value: Option<f64>) -> DriverResult<()> {
        self.set(index, value.into())
    }

    fn set_bool(&mut self, index: usize, value: Option<bool>) -> DriverResult<()> {
        self.set(index, value.into())
    }

    fn set_string(&mut self, index: usize, value: Option<&str>) -> DriverResult<()> {
        self.set(index, value.into())
    }

    fn set_timestamp(&mut self, index: usize, value: Option<DateTime<FixedOffset>>) -> DriverResult<()> {
        self.set(index, value.into())
    }

    fn set_time(&mut self, index: usize, value: Option<NaiveTime>) -> DriverResult<()> {
        self.set(index, value.into())
    }

    fn set_array(&mut self, index: usize, _element_type: &str, values: Option<&[Value]>) -> DriverResult<()> {
        self.set(index, values.map_or(Value::Null, |v| Value::List(v.to_vec())))
    }

    fn set_object(&mut self, index: usize, value: &Value) -> DriverResult<()> {
        self.set(index, value.clone())
    }

    fn add_batch(&mut self) -> DriverResult<()> {
        let binds = std::mem::take(&mut self.binds);
        self.staged.push(binds);
        Ok(())
    }

    fn execute_update(&mut self) -> DriverResult<u64> {
        self.check_execute()?;
        self.connection.shared.record(Event::Update {
            sql: self.sql.clone(),
            binds: std::mem::take(&mut self.binds),
        });
        Ok(1)
    }

    fn execute_batch(&mut self) -> DriverResult<Vec<u64>> {
        self.check_execute()?;
        let elements = std::mem::take(&mut self.staged);
        let counts = vec![1; elements.len()];
        self.connection.shared.record(Event::Batch {
            sql: self.sql.clone(),
            elements,
        });
        Ok(counts)
    }

    fn execute_query<'s>(&'s mut self) -> DriverResult<Box<dyn Rows + 's>> {
        self.check_execute()?;
        let binds = std::mem::take(&mut self.binds);
        let rows = (self.connection.shared.responder)(&self.sql, &binds);
        self.connection.shared.record(Event::Query {
            connection: self.connection.id,
            sql: self.sql.clone(),
            binds,
        });
        Ok(Box::new(ScriptedRows { rows, current: None }))
    }
}

struct ScriptedRows {
    rows: Vec<Row>,
    current: Option<usize>,
}

impl ScriptedRows {
    fn value(&self, column: Column<'_>) -> DriverResult<&Value> {
        let row = self
            .current
            .and_then(|i| self.rows.get(i))
            .ok_or_else(|| DriverError::from("no current row"))?;
        let found = match column {
            Column::Index(index) => index.checked_sub(1).and_then(|i| row.get(i)),
            Column::Name(name) => row.iter().find(|(column, _)| column == name),
        };
        found
            .map(|(_, value)| value)
            .ok_or_else(|| DriverError::from(format!("no column {column}")))
    }

    fn typed<T>(&self, column: Column<'_>, extract: impl Fn(&Value) -> Option<T>) -> DriverResult<Option<T>> {
        let value = self.value(column)?;
        if value.is_null() {
            return Ok(None);
        }
        extract(value)
            .map(Some)
            .ok_or_else(|| DriverError::from(format!("column {column} holds a {}", value.kind_name())))
    }
}

impl Rows for ScriptedRows {
    fn next_row(&mut self) -> DriverResult<bool> {
        let next = self.current.map_or(0, |i| i + 1);
        self.current = Some(next);
        Ok(next < self.rows.len())
    }

    fn get_int(&self, column: Column<'_>) -> DriverResult<Option<i32>> {
        self.typed(column, Value::as_i32)
    }

    fn get_short(&self, column: Column<'_>) -> DriverResult<Option<i16>> {
        self.typed(column, Value::as_i16)
    }

    fn get_long(&self, column: Column<'_>) -> DriverResult<Option<i64>> {
        self.typed(column, Value::as_i64)
    }

    fn get_float(&self, column: Column<'_>) -> DriverResult<Option<f32>> {
        self.typed(column, Value::as_f32)
    }

    fn get_double(&self, column: Column<'_>) -> DriverResult<Option<f64>> {
        self.typed(column, Value::as_f64)
    }

    fn get_bool(&self, column: Column<'_>) -> DriverResult<Option<bool>> {
        self.typed(column, Value::as_bool)
    }

    fn get_string(&self, column: Column<'_>) -> DriverResult<Option<String>> {
        self.typed(column, |v| v.as_str().map(str::to_owned))
    }

    fn get_uuid(&self, column: Column<'_>) -> DriverResult<Option<Uuid>> {
        self.typed(column, |v| match v {
            Value::Uuid(u) => Some(*u),
            _ => None,
        })
    }

    fn get_timestamp(&self, column: Column<'_>) -> DriverResult<Option<DateTime<FixedOffset>>> {
        self.typed(column, |v| match v {
            Value::Timestamp(t) => Some(*t),
            _ => None,
        })
    }

    fn get_time(&self, column: Column<'_>) -> DriverResult<Option<NaiveTime>> {
        self.typed(column, |v| match v {
            Value::Time(t) => Some(*t),
            _ => None,
        })
    }

    fn get_object(&self, column: Column<'_>) -> DriverResult<Value> {
        self.value(column).cloned()
    }
}
