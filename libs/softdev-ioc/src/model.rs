//! Schemas and running models
//!
//! A [`Schema`] is the ordered, validated list of field descriptors of one
//! device type. [`Model::start`] instantiates it under a device name: one
//! record per field, published as `<device>:<field>`, wired to callbacks,
//! calc watchers and scan tasks. [`Model::shutdown`] tears all of that down.

use crate::binding;
use crate::calc;
use crate::error::{IocError, Result};
use crate::ioc::Ioc;
use crate::record::Record;
use softdev_fields::{
    validate_device_name, FieldBuilder, FieldDescriptor, FieldError, FieldValue, NamedFieldSpec,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Application listener: published name, new value, owning model
pub type Callback = Arc<dyn Fn(&str, &FieldValue, &Model) -> anyhow::Result<()> + Send + Sync>;

// ============================================================================
// Schema
// ============================================================================

/// Ordered field list of one device type
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    fields: Vec<Arc<FieldDescriptor>>,
}

impl Schema {
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            fields: Vec::new(),
            error: None,
        }
    }

    /// Build from configuration entries, keeping their order
    pub fn from_specs(name: impl Into<String>, specs: &[NamedFieldSpec]) -> softdev_fields::Result<Self> {
        specs
            .iter()
            .try_fold(
                Self::builder(name),
                |builder, spec| -> softdev_fields::Result<SchemaBuilder> {
                    Ok(builder.descriptor(spec.build()?))
                },
            )?
            .build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[Arc<FieldDescriptor>] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Arc<FieldDescriptor>> {
        self.fields.iter().find(|f| f.name() == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Database file content, one record per field in declaration order
    pub fn render_db(&self) -> String {
        self.fields.iter().map(|f| f.db_record()).collect()
    }

    /// `softIoc` startup script loading [`Schema::render_db`] for `device`
    pub fn render_startup(&self, device: &str) -> String {
        format!(
            "\n## Load record instances\ndbLoadRecords {}.db, device={}\niocInit()\ndbl\n",
            self.name, device
        )
    }
}

/// Fluent [`Schema`] construction
///
/// The first definition error is kept and returned by [`SchemaBuilder::build`].
#[must_use]
pub struct SchemaBuilder {
    name: String,
    fields: Vec<Arc<FieldDescriptor>>,
    error: Option<FieldError>,
}

impl SchemaBuilder {
    pub fn field(self, builder: FieldBuilder) -> Self {
        match builder.build() {
            Ok(descriptor) => self.descriptor(descriptor),
            Err(e) => self.fail(e),
        }
    }

    pub fn descriptor(mut self, descriptor: FieldDescriptor) -> Self {
        if self.error.is_some() {
            return self;
        }
        if self.fields.iter().any(|f| f.name() == descriptor.name()) {
            let name = descriptor.name().to_string();
            return self.fail(FieldError::Duplicate(name));
        }
        self.fields.push(Arc::new(descriptor));
        self
    }

    fn fail(mut self, error: FieldError) -> Self {
        self.error.get_or_insert(error);
        self
    }

    pub fn build(self) -> softdev_fields::Result<Schema> {
        if let Some(error) = self.error {
            return Err(error);
        }
        validate_schema_name(&self.name)?;
        Ok(Schema {
            name: self.name,
            fields: self.fields,
        })
    }
}

fn validate_schema_name(name: &str) -> softdev_fields::Result<()> {
    // Used as a file stem for the database and startup script
    validate_device_name(name)
}

// ============================================================================
// Callbacks
// ============================================================================

/// Application listeners keyed by field name
///
/// A handler named `count` or `do_count` (any case) listens to the field
/// `count`. Matching happens once, when the model starts.
#[derive(Clone, Default)]
pub struct Callbacks {
    handlers: Vec<(String, Callback)>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&str, &FieldValue, &Model) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let handler: Callback = Arc::new(handler);
        self.handlers.push((name.into(), handler));
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Field a handler name refers to, if any
    fn target<'a>(schema: &'a Schema, handler: &str) -> Option<&'a Arc<FieldDescriptor>> {
        let exact = schema
            .fields()
            .iter()
            .find(|f| f.name().eq_ignore_ascii_case(handler));
        exact.or_else(|| {
            let prefix = handler.get(..3)?;
            if !prefix.eq_ignore_ascii_case("do_") {
                return None;
            }
            let rest = &handler[3..];
            schema
                .fields()
                .iter()
                .find(|f| f.name().eq_ignore_ascii_case(rest))
        })
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.handlers.iter().map(|(name, _)| name))
            .finish()
    }
}

// ============================================================================
// Model
// ============================================================================

pub(crate) struct ModelInner {
    device_name: String,
    schema: Schema,
    records: Vec<Arc<Record>>,
    index: HashMap<String, usize>,
    ioc: Ioc,
    shut_down: AtomicBool,
    cancel: CancellationToken,
}

impl Drop for ModelInner {
    fn drop(&mut self) {
        self.cancel.cancel();
        if !self.shut_down.load(Ordering::SeqCst) {
            debug!(device = %self.device_name, "Model dropped without shutdown");
        }
    }
}

/// A schema instantiated under a device name
///
/// Cheap to clone; all clones refer to the same records.
#[derive(Clone)]
pub struct Model {
    inner: Arc<ModelInner>,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("device_name", &self.inner.device_name)
            .field("schema", &self.inner.schema.name)
            .field("records", &self.inner.records.len())
            .finish()
    }
}

impl Model {
    pub(crate) fn from_inner(inner: Arc<ModelInner>) -> Self {
        Self { inner }
    }

    /// Instantiate `schema` as device `device_name` and publish its records
    ///
    /// Fails without leaving anything published when the device name is
    /// invalid or a published name is already taken.
    pub async fn start(
        ioc: &Ioc,
        device_name: &str,
        schema: &Schema,
        callbacks: Option<Callbacks>,
    ) -> Result<Model> {
        validate_device_name(device_name)?;
        let shared = ioc.shared();

        let inner = Arc::new_cyclic(|owner| {
            let records: Vec<Arc<Record>> = schema
                .fields()
                .iter()
                .map(|field| {
                    Arc::new(Record::new(
                        device_name,
                        Arc::clone(field),
                        Arc::clone(shared),
                        owner.clone(),
                    ))
                })
                .collect();
            let index = records
                .iter()
                .enumerate()
                .map(|(i, r)| (r.name().to_string(), i))
                .collect();
            ModelInner {
                device_name: device_name.to_string(),
                schema: schema.clone(),
                records,
                index,
                ioc: ioc.clone(),
                shut_down: AtomicBool::new(false),
                cancel: CancellationToken::new(),
            }
        });
        let model = Model { inner };

        if let Some(callbacks) = callbacks {
            model.bind_callbacks(&callbacks);
        }

        for record in model.records() {
            for source in record.descriptor().calc_spec().into_iter().flat_map(|c| c.triggers()) {
                shared
                    .directory
                    .watch(&calc::resolve(device_name, source), record);
            }
        }

        for record in model.records() {
            let published = match shared.directory.insert(record) {
                Ok(()) => binding::publish(record).await,
                Err(e) => Err(e),
            };
            if let Err(e) = published {
                warn!(device = device_name, pv = %record.pv_name(), "Model start failed: {}", e);
                model.shutdown().await;
                return Err(e);
            }
        }

        for record in model.records() {
            let Some(calc_spec) = record.descriptor().calc_spec() else {
                continue;
            };
            if let Some(period) = calc_spec.scan {
                calc::spawn_scan(record, period, model.inner.cancel.child_token());
            }
            let record = Arc::clone(record);
            shared
                .scheduler
                .post(Box::new(move || calc::process(&record)));
        }

        info!(
            device = device_name,
            schema = %schema.name(),
            records = model.records().len(),
            "Model started"
        );
        Ok(model)
    }

    fn bind_callbacks(&self, callbacks: &Callbacks) {
        for (handler, callback) in &callbacks.handlers {
            match Callbacks::target(&self.inner.schema, handler) {
                Some(field) => {
                    if let Some(record) = self.record(field.name()) {
                        record.add_listener(Arc::clone(callback));
                    }
                },
                None => {
                    warn!(device = %self.inner.device_name, handler = %handler, "Callback matches no field");
                },
            }
        }
    }

    pub fn device_name(&self) -> &str {
        &self.inner.device_name
    }

    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    pub fn ioc(&self) -> &Ioc {
        &self.inner.ioc
    }

    /// Records in declaration order
    pub fn records(&self) -> &[Arc<Record>] {
        &self.inner.records
    }

    pub fn record(&self, field: &str) -> Option<&Arc<Record>> {
        self.inner.index.get(field).map(|&i| &self.inner.records[i])
    }

    /// Like [`Model::record`], but an unknown name is an error
    pub fn field(&self, field: &str) -> Result<&Arc<Record>> {
        self.record(field)
            .ok_or_else(|| IocError::unknown_field(field))
    }

    pub fn get(&self, field: &str) -> Result<FieldValue> {
        Ok(self.field(field)?.get())
    }

    pub fn put(&self, field: &str, value: impl Into<FieldValue>) -> Result<bool> {
        Ok(self.field(field)?.put(value))
    }

    pub async fn put_wait(&self, field: &str, value: impl Into<FieldValue>) -> Result<bool> {
        self.field(field)?.put_wait(value).await
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    /// Unpublish every record and stop scans
    ///
    /// Pending `put_wait` calls resolve with a shutdown error. Calling this
    /// again does nothing.
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            debug!(device = %self.inner.device_name, "Model already shut down");
            return;
        }
        self.inner.cancel.cancel();

        let directory = &self.inner.ioc.shared().directory;
        for record in self.inner.records.iter().rev() {
            let pending = record.close();
            directory.remove(record);
            directory.unwatch(record);
            binding::unpublish(record, pending).await;
        }
        info!(device = %self.inner.device_name, "Model shut down");
    }
}
