//! Units of work: one shared connection and one field cache.
//!
//! Transactional methods called through the same [`UnitOfWork`] share its
//! connection, opened on first use with [`DataSource::begin`], and its
//! [`FieldCache`]. Nothing is shared between units of work. Dropping a unit of
//! work without [`commit`](UnitOfWork::commit) releases the connection,
//! which rolls back whatever it did.
//!
//! [`DataSource::begin`]: crate::driver::DataSource::begin

use tracing::debug;

use crate::cache::FieldCache;
use crate::descriptor::AccessorRef;
use crate::driver::Connection;
use crate::error::{Error, Result};
use crate::mapper::Mapper;
use crate::method::Stage;
use crate::value::{FromValue, Value};

const UNIT_OF_WORK: &str = "unit of work";

pub struct UnitOfWork<'m> {
    mapper: &'m Mapper,
    connection: Option<Box<dyn Connection>>,
    cache: FieldCache,
}

impl<'m> UnitOfWork<'m> {
    pub(crate) fn new(mapper: &'m Mapper) -> Self {
        Self {
            mapper,
            connection: None,
            cache: FieldCache::new(&mapper.config().cache),
        }
    }

    pub const fn mapper(&self) -> &'m Mapper {
        self.mapper
    }

    /// Calls the method or accessor registered as `owner.method`.
    pub fn call(&mut self, owner: &str, method: &str, args: &[Value]) -> Result<Value> {
        let reference = AccessorRef::new(owner, method);
        let accessor = self
            .mapper
            .accessor(&reference)
            .ok_or_else(|| Error::UnknownAccessor(reference.to_string()))?;
        accessor.call(self, args)
    }

    pub fn fetch<T: FromValue>(&mut self, owner: &str, method: &str, args: &[Value]) -> Result<T> {
        Ok(T::from_value(self.call(owner, method, args)?)?)
    }

    /// True once a transactional method has opened the shared connection.
    pub const fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub(crate) fn shared_connection(&mut self, method: &str) -> Result<&mut dyn Connection> {
        let connection = match self.connection.take() {
            Some(connection) => connection,
            None => {
                let connection = self
                    .mapper
                    .data_source()
                    .begin()
                    .map_err(Error::data_access(method, Stage::Idle))?;
                debug!(method, "unit of work connection opened");
                connection
            }
        };
        Ok(self.connection.insert(connection).as_mut())
    }

    pub const fn cache(&self) -> &FieldCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut FieldCache {
        &mut self.cache
    }

    /// Enables or disables field caching for the rest of this unit of work.
    pub fn set_caching(&mut self, enabled: bool) {
        self.cache.set_enabled(enabled);
    }

    pub fn commit(mut self) -> Result<()> {
        if let Some(mut connection) = self.connection.take() {
            connection
                .commit()
                .map_err(Error::data_access(UNIT_OF_WORK, Stage::Done))?;
            debug!("unit of work committed");
        }
        Ok(())
    }

    pub fn rollback(mut self) -> Result<()> {
        if let Some(mut connection) = self.connection.take() {
            connection
                .rollback()
                .map_err(Error::data_access(UNIT_OF_WORK, Stage::Done))?;
            debug!("unit of work rolled back");
        }
        Ok(())
    }
}

impl Drop for UnitOfWork<'_> {
    fn drop(&mut self) {
        if self.connection.take().is_some() {
            debug!("unit of work dropped without commit");
        }
        self.cache.clear();
    }
}
