//! Driver primitives consumed by compiled methods.
//!
//! Compiled methods only talk to storage through these traits: a
//! [`DataSource`] hands out [`Connection`]s, a connection prepares
//! [`Statement`]s, and a statement binds positional parameters and executes,
//! producing [`Rows`] for queries. All calls are blocking.
//!
//! [`postgres`] implements them over an `sqlx` pool.

pub mod postgres;

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveTime};
use uuid::Uuid;

use crate::builder::PlaceholderStyle;
use crate::error::DriverResult;
use crate::value::Value;

/// Column reference; indexes are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column<'a> {
    Index(usize),
    Name(&'a str),
}

impl fmt::Display for Column<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "#{i}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// Connection provider of a [`Mapper`](crate::Mapper).
pub trait DataSource: Send + Sync {
    /// Opens a dedicated connection; dropping it releases it.
    fn open(&self) -> DriverResult<Box<dyn Connection>>;

    /// Opens the connection shared by one unit of work.
    fn begin(&self) -> DriverResult<Box<dyn Connection>> {
        self.open()
    }

    /// Marker the database expects when the mapper configuration sets none.
    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Question
    }
}

pub trait Connection: Send {
    fn prepare<'c>(&'c mut self, sql: &str) -> DriverResult<Box<dyn Statement + 'c>>;

    fn commit(&mut self) -> DriverResult<()> {
        Ok(())
    }

    fn rollback(&mut self) -> DriverResult<()> {
        Ok(())
    }
}

/// A prepared statement with 1-based positional binds.
///
/// `None` binds a null of the setter's SQL type.
pub trait Statement {
    fn set_int(&mut self, index: usize, value: Option<i32>) -> DriverResult<()>;
    fn set_short(&mut self, index: usize, value: Option<i16>) -> DriverResult<()>;
    fn set_long(&mut self, index: usize, value: Option<i64>) -> DriverResult<()>;
    fn set_float(&mut self, index: usize, value: Option<f32>) -> DriverResult<()>;
    fn set_double(&mut self, index: usize, value: Option<f64>) -> DriverResult<()>;
    fn set_bool(&mut self, index: usize, value: Option<bool>) -> DriverResult<()>;
    fn set_string(&mut self, index: usize, value: Option<&str>) -> DriverResult<()>;
    fn set_timestamp(&mut self, index: usize, value: Option<DateTime<FixedOffset>>) -> DriverResult<()>;
    fn set_time(&mut self, index: usize, value: Option<NaiveTime>) -> DriverResult<()>;

    /// Binds a SQL array whose elements have the SQL type `element_type`.
    fn set_array(&mut self, index: usize, element_type: &str, values: Option<&[Value]>) -> DriverResult<()>;

    /// Generic bind, the driver picks the SQL type from the value.
    fn set_object(&mut self, index: usize, value: &Value) -> DriverResult<()>;

    /// Stages the current binds as one batch element.
    fn add_batch(&mut self) -> DriverResult<()>;

    fn execute_update(&mut self) -> DriverResult<u64>;

    /// Flushes every staged element in one operation.
    fn execute_batch(&mut self) -> DriverResult<Vec<u64>>;

    fn execute_query<'s>(&'s mut self) -> DriverResult<Box<dyn Rows + 's>>;
}

/// Forward-only cursor over a query result.
///
/// Getters read the current row and return `None` for SQL NULL.
pub trait Rows {
    /// Moves to the next row; `false` once exhausted.
    fn next_row(&mut self) -> DriverResult<bool>;

    fn get_int(&self, column: Column<'_>) -> DriverResult<Option<i32>>;
    fn get_short(&self, column: Column<'_>) -> DriverResult<Option<i16>>;
    fn get_long(&self, column: Column<'_>) -> DriverResult<Option<i64>>;
    fn get_float(&self, column: Column<'_>) -> DriverResult<Option<f32>>;
    fn get_double(&self, column: Column<'_>) -> DriverResult<Option<f64>>;
    fn get_bool(&self, column: Column<'_>) -> DriverResult<Option<bool>>;
    fn get_string(&self, column: Column<'_>) -> DriverResult<Option<String>>;
    fn get_uuid(&self, column: Column<'_>) -> DriverResult<Option<Uuid>>;
    fn get_timestamp(&self, column: Column<'_>) -> DriverResult<Option<DateTime<FixedOffset>>>;
    fn get_time(&self, column: Column<'_>) -> DriverResult<Option<NaiveTime>>;

    /// Reads the column as whatever value its SQL type maps to.
    fn get_object(&self, column: Column<'_>) -> DriverResult<Value>;
}
