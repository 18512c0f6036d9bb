//! Compiled methods and their execution.
//!
//! [`MappedMethod::compile`] validates a [`MethodDescriptor`] and resolves its
//! template once. [`MappedMethod::invoke`] then runs the routine against a
//! unit of work, moving through the [`Stage`]s below. Every transition is
//! traced; a driver failure ends the run with one [`Error::DataAccess`]
//! naming the stage it happened in.

use std::fmt;

use tracing::{debug, trace};

use crate::bind::bind_value;
use crate::builder::{self, BindSource, BindingPlan, ResolvedTemplate};
use crate::classify::{is_flat, ReturnKind};
use crate::config::PlaceholderStyle;
use crate::descriptor::MethodDescriptor;
use crate::driver::{Connection, Statement};
use crate::error::{ConfigurationError, DriverError, Error, Result};
use crate::mapper::Accessor;
use crate::materialize::{self, Partial};
use crate::types::TypeRef;
use crate::unit_of_work::UnitOfWork;
use crate::value::{Record, Value};

static NULL: Value = Value::Null;

/// Execution stage of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Idle,
    ConnectionAcquired,
    StatementPrepared,
    /// Mutation (or batch) executed, nothing to read
    Executed,
    RowsAvailable,
    Materialized,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::ConnectionAcquired => "connection acquired",
            Self::StatementPrepared => "statement prepared",
            Self::Executed => "executed",
            Self::RowsAvailable => "rows available",
            Self::Materialized => "materialized",
            Self::Done => "done",
            Self::Failed => "failed",
        })
    }
}

/// Stage tracking of one run.
struct Progress<'a> {
    method: &'a str,
    stage: Stage,
}

impl<'a> Progress<'a> {
    const fn new(method: &'a str) -> Self {
        Self {
            method,
            stage: Stage::Idle,
        }
    }

    fn advance(&mut self, next: Stage) {
        trace!(method = self.method, from = %self.stage, to = %next, "stage transition");
        self.stage = next;
    }

    fn fail(&self) -> impl FnOnce(DriverError) -> Error + 'a {
        let method = self.method;
        let stage = self.stage;
        move |source| {
            trace!(method, from = %stage, to = %Stage::Failed, "stage transition");
            Error::DataAccess {
                method: method.to_owned(),
                stage,
                source,
            }
        }
    }
}

enum Outcome {
    Updated(u64),
    Rows(Vec<Partial>),
}

/// A method descriptor compiled into an executable routine.
///
/// Compiled once at registration and shared read-only afterwards.
#[derive(Debug)]
pub struct MappedMethod {
    descriptor: MethodDescriptor,
    name: String,
    template: ResolvedTemplate,
    /// Cache key type name of field-filler results
    element_name: String,
}

impl MappedMethod {
    /// Validates the descriptor and resolves its template.
    pub fn compile(descriptor: MethodDescriptor, placeholder: PlaceholderStyle) -> Result<Self, ConfigurationError> {
        let name = descriptor.qualified_name();
        let result = &descriptor.result;
        let kind = result.return_kind;

        let unsupported = || ConfigurationError::UnsupportedReturn {
            method: name.clone(),
            ty: result.target_type.to_string(),
        };
        if kind == ReturnKind::Void && result.target_type != TypeRef::Unit && !result.explicit_kind {
            return Err(unsupported());
        }
        if kind != ReturnKind::Void && !is_flat(&result.element_type) && result.element_type.as_record().is_none() {
            return Err(unsupported());
        }
        if kind != ReturnKind::Void && descriptor.template.trim().is_empty() {
            return Err(ConfigurationError::BlankTemplate { method: name });
        }

        let batch = batch_mode(&descriptor, &name)?;

        if descriptor.cacheable {
            if descriptor.parameters.len() != 1 {
                return Err(ConfigurationError::FieldFillerArity {
                    method: name,
                    found: descriptor.parameters.len(),
                });
            }
            if !kind.is_field_filling() {
                return Err(ConfigurationError::FieldFillerKind { method: name, kind });
            }
        }

        let template = builder::resolve(&descriptor, batch, placeholder)?;
        debug!(method = %name, sql = %template.sql, binds = template.plan.len(), batch, "method compiled");

        let element_name = result.element_type.simple_name().into_owned();
        Ok(Self {
            descriptor,
            name,
            template,
            element_name,
        })
    }

    pub const fn descriptor(&self) -> &MethodDescriptor {
        &self.descriptor
    }

    /// `Owner.method`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// SQL sent to the driver.
    pub fn sql(&self) -> &str {
        &self.template.sql
    }

    pub const fn plan(&self) -> &BindingPlan {
        &self.template.plan
    }

    pub const fn is_batch(&self) -> bool {
        self.template.plan.is_batch()
    }

    /// Runs the routine with `args` in declaration order.
    #[tracing::instrument(level = "debug", skip_all, fields(method = %self.name))]
    pub fn invoke(&self, uow: &mut UnitOfWork<'_>, args: &[Value]) -> Result<Value> {
        let result = self.run(uow, args);
        if let Err(e) = &result {
            debug!(error = %e, "invocation failed");
        }
        result
    }

    fn run(&self, uow: &mut UnitOfWork<'_>, args: &[Value]) -> Result<Value> {
        let descriptor = &self.descriptor;
        let kind = descriptor.result.return_kind;

        if args.len() != descriptor.parameters.len() {
            return Err(Error::ArgumentCount {
                method: self.name.clone(),
                expected: descriptor.parameters.len(),
                found: args.len(),
            });
        }
        if self.template.sql.trim().is_empty() {
            debug!("blank template, nothing to execute");
            return Ok(Value::Null);
        }
        if !args.is_empty() && kind != ReturnKind::Void && args.iter().all(Value::is_null) {
            debug!("all parameters are null, skipping the query");
            return self.absent(kind);
        }
        if descriptor.cacheable {
            if let Some(hit) = uow.cache().get(kind, &self.element_name, &args[0]) {
                debug!(id = %args[0], "field cache hit");
                return Ok(hit.clone());
            }
        }

        let outcome = if descriptor.transactional {
            let connection = uow.shared_connection(&self.name)?;
            self.execute(connection, args)?
        } else {
            let mut connection = uow
                .mapper()
                .data_source()
                .open()
                .map_err(Error::data_access(&self.name, Stage::Idle))?;
            self.execute(connection.as_mut(), args)?
        };

        let partials = match outcome {
            Outcome::Updated(count) => {
                debug!(count, "statement executed");
                return Ok(Value::Null);
            }
            Outcome::Rows(partials) => partials,
        };

        if descriptor.cacheable {
            let base = wrap(kind, partials.iter().map(|p| p.value.clone()).collect(), &self.name)?;
            uow.cache_mut()
                .put(kind, self.element_name.as_str(), args[0].clone(), base);
        }

        let value = match self.complete(uow, partials) {
            Ok(value) => value,
            Err(e) => {
                if descriptor.cacheable {
                    uow.cache_mut().remove(kind, &self.element_name, &args[0]);
                }
                return Err(e);
            }
        };
        if descriptor.cacheable {
            uow.cache_mut()
                .put(kind, self.element_name.as_str(), args[0].clone(), value.clone());
        }
        trace!(method = %self.name, from = %Stage::Materialized, to = %Stage::Done, "stage transition");
        Ok(value)
    }

    /// Second pass over rows read while the statement was open.
    fn complete(&self, uow: &mut UnitOfWork<'_>, partials: Vec<Partial>) -> Result<Value> {
        let mut values = Vec::with_capacity(partials.len());
        for partial in partials {
            values.push(materialize::complete(uow, &self.descriptor.result, partial, &self.name)?);
        }
        trace!(method = %self.name, from = %Stage::RowsAvailable, to = %Stage::Materialized, "stage transition");
        wrap(self.descriptor.result.return_kind, values, &self.name)
    }

    fn execute(&self, connection: &mut dyn Connection, args: &[Value]) -> Result<Outcome> {
        let mut progress = Progress::new(&self.name);
        progress.advance(Stage::ConnectionAcquired);

        if self.template.plan.is_batch() {
            let elements = match &args[0] {
                v if v.is_null() => &[][..],
                v => v.as_slice().ok_or_else(|| self.mismatch(1, "collection", v))?,
            };
            if elements.is_empty() {
                debug!("empty batch, nothing to execute");
                return Ok(Outcome::Updated(0));
            }

            let mut statement = connection.prepare(&self.template.sql).map_err(progress.fail())?;
            for element in elements {
                let record = element
                    .as_record()
                    .ok_or_else(|| self.mismatch(1, "record", element))?;
                self.bind_all(statement.as_mut(), args, Some(record))?;
                statement.add_batch().map_err(progress.fail())?;
            }
            progress.advance(Stage::StatementPrepared);

            let counts = statement.execute_batch().map_err(progress.fail())?;
            progress.advance(Stage::Executed);
            trace!(elements = elements.len(), "batch flushed");
            return Ok(Outcome::Updated(counts.iter().sum()));
        }

        let mut statement = connection.prepare(&self.template.sql).map_err(progress.fail())?;
        self.bind_all(statement.as_mut(), args, None)?;
        progress.advance(Stage::StatementPrepared);

        if self.descriptor.result.return_kind == ReturnKind::Void {
            let count = statement.execute_update().map_err(progress.fail())?;
            progress.advance(Stage::Executed);
            return Ok(Outcome::Updated(count));
        }

        let mut rows = statement.execute_query().map_err(progress.fail())?;
        progress.advance(Stage::RowsAvailable);
        let partials = materialize::read_rows(
            rows.as_mut(),
            &self.descriptor.result,
            self.descriptor.fill_subfields,
            &self.name,
        )?;
        Ok(Outcome::Rows(partials))
    }

    fn bind_all(&self, statement: &mut dyn Statement, args: &[Value], element: Option<&Record>) -> Result<()> {
        for binding in self.template.plan.bindings() {
            let value = match (&binding.source, element) {
                (BindSource::Parameter(index), _) => &args[*index],
                (BindSource::ElementField(field), Some(record)) => record.get(field).unwrap_or(&NULL),
                (BindSource::ElementField(_), None) => &NULL,
            };
            bind_value(statement, &self.name, binding.position, &binding.kind, value)?;
        }
        Ok(())
    }

    fn absent(&self, kind: ReturnKind) -> Result<Value> {
        match kind {
            ReturnKind::BoxedScalar => Ok(Value::Null),
            ReturnKind::Optional => Ok(Value::none()),
            ReturnKind::List => Ok(Value::List(Vec::new())),
            ReturnKind::Set => Ok(Value::Set(Vec::new())),
            ReturnKind::Scalar | ReturnKind::Void => Err(Error::AllParametersAbsent {
                method: self.name.clone(),
            }),
        }
    }

    fn mismatch(&self, position: usize, expected: &'static str, found: &Value) -> Error {
        Error::TypeMismatch {
            method: self.name.clone(),
            position,
            expected,
            found: found.kind_name(),
        }
    }
}

impl Accessor for MappedMethod {
    fn call(&self, uow: &mut UnitOfWork<'_>, args: &[Value]) -> Result<Value> {
        self.invoke(uow, args)
    }
}

/// Whether the method binds once per element of its collection parameter.
///
/// Automatic detection also needs a record element, whose fields the
/// placeholders name. A collection of flat values binds as one array.
fn batch_mode(descriptor: &MethodDescriptor, method: &str) -> Result<bool, ConfigurationError> {
    let eligible = descriptor.is_batch_eligible();
    match descriptor.batch {
        None => Ok(eligible
            && descriptor.parameters[0]
                .element_type()
                .is_some_and(|ty| ty.as_record().is_some())),
        Some(false) => Ok(false),
        Some(true) if eligible => Ok(true),
        Some(true) => Err(ConfigurationError::BatchShape {
            method: method.to_owned(),
            reason: batch_refusal(descriptor),
        }),
    }
}

fn batch_refusal(descriptor: &MethodDescriptor) -> &'static str {
    if !descriptor.mode.is_mutation() {
        "only insert, update and delete statements run as a batch"
    } else if descriptor.result.return_kind != ReturnKind::Void {
        "a batch returns nothing"
    } else if descriptor.parameters.len() != 1 {
        "a batch takes exactly one parameter"
    } else {
        "the parameter is not a collection"
    }
}

/// Packs materialized values into the method's return kind.
fn wrap(kind: ReturnKind, values: Vec<Value>, method: &str) -> Result<Value> {
    let mut values = values.into_iter();
    Ok(match kind {
        ReturnKind::Void => Value::Null,
        ReturnKind::Scalar => values.next().ok_or_else(|| Error::RequiredValueAbsent {
            method: method.to_owned(),
            detail: "query returned no row".to_owned(),
        })?,
        ReturnKind::BoxedScalar => values.next().unwrap_or(Value::Null),
        ReturnKind::Optional => values
            .next()
            .filter(|v| !v.is_null())
            .map_or_else(Value::none, Value::some),
        ReturnKind::List => Value::List(values.collect()),
        ReturnKind::Set => Value::set_of(values),
    })
}
