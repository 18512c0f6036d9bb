//! The registry of compiled methods.
//!
//! A [`Mapper`] owns the [`DataSource`], every compiled [`MappedMethod`], the
//! custom [`Accessor`]s and the [`Converter`]s fields refer to. It is built
//! once by a [`MapperBuilder`], which rejects malformed descriptors, and then
//! shared (`Send + Sync`) by every unit of work.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::MapperConfig;
use crate::descriptor::{AccessorRef, MethodDescriptor};
use crate::driver::DataSource;
use crate::error::{BoxError, ConfigurationError, Result};
use crate::method::MappedMethod;
use crate::unit_of_work::UnitOfWork;
use crate::value::{FromValue, Value};

/// Something a relation field can be filled through.
///
/// Every registered mapped method is an accessor. Closures taking the unit of
/// work and the arguments can be registered too.
pub trait Accessor: Send + Sync {
    fn call(&self, uow: &mut UnitOfWork<'_>, args: &[Value]) -> Result<Value>;
}

impl<F> Accessor for F
where
    F: Fn(&mut UnitOfWork<'_>, &[Value]) -> Result<Value> + Send + Sync,
{
    fn call(&self, uow: &mut UnitOfWork<'_>, args: &[Value]) -> Result<Value> {
        self(uow, args)
    }
}

pub type ConvertResult = std::result::Result<Value, BoxError>;

/// Turns the text of a column into a field value.
pub trait Converter: Send + Sync {
    /// `raw` is `None` for SQL NULL.
    fn convert(&self, raw: Option<&str>) -> ConvertResult;
}

impl<F> Converter for F
where
    F: Fn(Option<&str>) -> ConvertResult + Send + Sync,
{
    fn convert(&self, raw: Option<&str>) -> ConvertResult {
        self(raw)
    }
}

pub struct Mapper {
    source: Arc<dyn DataSource>,
    config: MapperConfig,
    methods: HashMap<AccessorRef, MappedMethod>,
    accessors: HashMap<AccessorRef, Arc<dyn Accessor>>,
    converters: HashMap<String, Arc<dyn Converter>>,
}

impl Mapper {
    pub fn builder(source: Arc<dyn DataSource>) -> MapperBuilder {
        MapperBuilder::new(source)
    }

    /// Opens a unit of work; its connection is acquired on first use.
    pub fn begin(&self) -> UnitOfWork<'_> {
        UnitOfWork::new(self)
    }

    /// Calls one method in its own unit of work, committed on success.
    pub fn call(&self, owner: &str, method: &str, args: &[Value]) -> Result<Value> {
        let mut uow = self.begin();
        match uow.call(owner, method, args) {
            Ok(value) => {
                uow.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = uow.rollback() {
                    warn!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    /// [`call`](Self::call), converting the result.
    pub fn fetch<T: FromValue>(&self, owner: &str, method: &str, args: &[Value]) -> Result<T> {
        Ok(T::from_value(self.call(owner, method, args)?)?)
    }

    pub fn method(&self, owner: &str, name: &str) -> Option<&MappedMethod> {
        self.methods.get(&AccessorRef::new(owner, name))
    }

    pub fn methods(&self) -> impl Iterator<Item = &MappedMethod> {
        self.methods.values()
    }

    /// Mapped method or custom accessor registered under `reference`.
    pub fn accessor(&self, reference: &AccessorRef) -> Option<&dyn Accessor> {
        match self.methods.get(reference) {
            Some(method) => Some(method as &dyn Accessor),
            None => self.accessors.get(reference).map(Arc::as_ref),
        }
    }

    pub fn converter(&self, name: &str) -> Option<&dyn Converter> {
        self.converters.get(name).map(Arc::as_ref)
    }

    pub fn data_source(&self) -> &dyn DataSource {
        self.source.as_ref()
    }

    pub const fn config(&self) -> &MapperConfig {
        &self.config
    }
}

pub struct MapperBuilder {
    source: Arc<dyn DataSource>,
    config: MapperConfig,
    descriptors: Vec<MethodDescriptor>,
    accessors: HashMap<AccessorRef, Arc<dyn Accessor>>,
    converters: HashMap<String, Arc<dyn Converter>>,
}

impl MapperBuilder {
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self {
            source,
            config: MapperConfig::default(),
            descriptors: Vec::new(),
            accessors: HashMap::new(),
            converters: HashMap::new(),
        }
    }

    #[must_use]
    pub fn config(mut self, config: MapperConfig) -> Self {
        self.config = config;
        self
    }

    /// Adds a method, compiled by [`build`](Self::build).
    #[must_use]
    pub fn method(mut self, descriptor: MethodDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Registers a hand-written accessor that relations can point at.
    #[must_use]
    pub fn accessor<F>(mut self, reference: AccessorRef, accessor: F) -> Self
    where
        F: Fn(&mut UnitOfWork<'_>, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.accessors.insert(reference, Arc::new(accessor));
        self
    }

    #[must_use]
    pub fn converter<F>(mut self, name: impl Into<String>, converter: F) -> Self
    where
        F: Fn(Option<&str>) -> ConvertResult + Send + Sync + 'static,
    {
        self.converters.insert(name.into(), Arc::new(converter));
        self
    }

    /// Compiles every method and checks the references between them.
    pub fn build(self) -> Result<Mapper, ConfigurationError> {
        let placeholder = self
            .config
            .placeholder
            .unwrap_or_else(|| self.source.placeholder_style());
        let mut methods = HashMap::with_capacity(self.descriptors.len());
        for descriptor in self.descriptors {
            let reference = descriptor.accessor_ref();
            if methods.contains_key(&reference) || self.accessors.contains_key(&reference) {
                return Err(ConfigurationError::DuplicateMethod(reference.to_string()));
            }
            let method = MappedMethod::compile(descriptor, placeholder)?;
            methods.insert(reference, method);
        }

        for method in methods.values() {
            for mapping in &method.descriptor().result.field_mappings {
                if let Some(accessor) = mapping.relation.accessor() {
                    if !methods.contains_key(accessor) && !self.accessors.contains_key(accessor) {
                        return Err(ConfigurationError::UnknownAccessor {
                            method: method.name().to_owned(),
                            field: mapping.field.clone(),
                            accessor: accessor.to_string(),
                        });
                    }
                }
                if let Some(converter) = &mapping.converter {
                    if !self.converters.contains_key(converter) {
                        return Err(ConfigurationError::UnknownConverter {
                            method: method.name().to_owned(),
                            field: mapping.field.clone(),
                            converter: converter.clone(),
                        });
                    }
                }
            }
        }

        debug!(
            methods = methods.len(),
            accessors = self.accessors.len(),
            converters = self.converters.len(),
            "mapper built"
        );
        Ok(Mapper {
            source: self.source,
            config: self.config,
            methods,
            accessors: self.accessors,
            converters: self.converters,
        })
    }
}
