//! # sqlx-named-mapper
//!
//! Compiles data-access method descriptions (a SQL template with named
//! placeholders, typed parameters and a result mapping) into routines that bind
//! parameters, run the statement and materialize rows, resolving related
//! records through other mapped methods.
//!
//! ## Features
//!
//! - **Named Placeholders**: Write `#{name}` or `#{name.path}` in your SQL; they are rewritten to positional markers once, at registration
//! - **Typed Binds**: Each marker gets the bind operation its parameter type calls for, collections bind as SQL arrays
//! - **Batching**: An insert, update or delete over one collection of records binds once per element and flushes once
//! - **Relations**: Fields filled by other mapped methods, to-one (optionally required) or to-many
//! - **Unit-of-Work Cache**: Field-filler results are memoized per unit of work, so cyclic relations terminate
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! sqlx-named-mapper = "0.1"
//! ```
//!
//! ## Examples
//!
//! ### Registering and Calling a Method
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use sqlx_named_mapper::driver::postgres::PgDataSource;
//! use sqlx_named_mapper::prelude::*;
//!
//! # fn example() -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let person = TypeRef::record(
//!     RecordType::new("Person")
//!         .field("name", TypeRef::String)
//!         .field("age", TypeRef::int()),
//! );
//!
//! let source = PgDataSource::connect("postgres://localhost/test")?;
//! let mapper = Mapper::builder(Arc::new(source))
//!     .method(
//!         MethodDescriptor::select("PersonDao", "findById", "select name, age from person where id = #{id}")
//!             .param("id", TypeRef::int())
//!             .returns(
//!                 ResultSpec::new(TypeRef::optional(person))
//!                     .field(FieldMapping::column("name", TypeRef::String))
//!                     .field(FieldMapping::column("age", TypeRef::int())),
//!             ),
//!     )
//!     .build()?;
//!
//! let found: Option<Record> = mapper.fetch("PersonDao", "findById", &[Value::Int(7)])?;
//! if let Some(person) = found {
//!     println!("{}", person.get_as::<String>("name")?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Sharing a Transaction
//!
//! ```rust,no_run
//! use sqlx_named_mapper::prelude::*;
//!
//! # fn example(mapper: &Mapper) -> Result<()> {
//! let mut uow = mapper.begin();
//! uow.call("AccountDao", "debit", &[Value::Int(1), Value::Long(100)])?;
//! uow.call("AccountDao", "credit", &[Value::Int(2), Value::Long(100)])?;
//! uow.commit()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## How It Works
//!
//! 1. **Compile**: Each descriptor is validated, its return kind classified and its template resolved into SQL plus a binding plan
//! 2. **Bind**: On invocation every marker is bound from its argument (or batch element field) with the selected operation
//! 3. **Materialize**: Direct columns are read while the result set is open, converters and relations run afterwards
//!
//! Transactional methods share the unit of work's connection; the others open
//! and release a dedicated one per call.
//!
//! ## Limitations
//!
//! - The bundled driver targets PostgreSQL; other databases implement the [`driver`] traits
//! - Calls are blocking; the PostgreSQL driver must not be used from inside an async task
//!
//! ## License
//!
//! Licensed under either of Apache License, Version 2.0 or MIT license at your option.

pub mod bind;
pub mod builder;
pub mod cache;
pub mod classify;
pub mod config;
pub mod descriptor;
pub mod driver;
pub mod error;
pub mod mapper;
pub mod materialize;
pub mod method;
pub mod types;
pub mod unit_of_work;
pub mod value;

pub use error::{ConfigurationError, Error, Result};
pub use mapper::{Accessor, Converter, Mapper, MapperBuilder};
pub use method::{MappedMethod, Stage};
pub use unit_of_work::UnitOfWork;
pub use value::{FromValue, Record, Value};

/// Convenience re-exports for common use cases
pub mod prelude {
    pub use crate::classify::ReturnKind;
    pub use crate::descriptor::{AccessorRef, FieldMapping, MethodDescriptor, ResultSpec};
    pub use crate::error::{ConfigurationError, Error, Result};
    pub use crate::types::{EnumType, Primitive, RecordType, TypeRef};
    pub use crate::{FromValue, Mapper, MapperBuilder, Record, UnitOfWork, Value};
}
