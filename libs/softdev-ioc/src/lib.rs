//! Softdev IOC Runtime
//!
//! Runs device models built from `softdev-fields` descriptors: live records
//! with validated puts, calc and calcout records, application callbacks,
//! and publication through a `softdev-transport` [`Transport`].
//!
//! # Key Components
//!
//! - **Ioc**: shared runtime context (scheduler, transport, name directory)
//! - **Scheduler / EventLoop**: the single job queue every callback runs on
//! - **Schema / Model**: ordered field list and its instance for one device
//! - **Record**: one live value with `get`, `put`, `put_wait` and `subscribe`
//!
//! # Example
//!
//! ```no_run
//! use softdev_fields::FieldDescriptor;
//! use softdev_ioc::{Callbacks, Ioc, Model, Schema};
//! use softdev_transport::MemoryTransport;
//! use std::sync::Arc;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let schema = Schema::builder("Shutter")
//!     .field(FieldDescriptor::enumeration("state", ["Closed", "Open"]))
//!     .field(FieldDescriptor::toggle("open").description("Open shutter"))
//!     .build()?;
//!
//! let (ioc, event_loop) = Ioc::with_event_loop(Arc::new(MemoryTransport::new()));
//! event_loop.spawn();
//!
//! let callbacks = Callbacks::new().on("do_open", |_pv, value, model| {
//!     if value.as_bool() == Some(true) {
//!         model.put("state", "Open")?;
//!     }
//!     Ok(())
//! });
//! let model = Model::start(&ioc, "SHT1", &schema, Some(callbacks)).await?;
//! model.put_wait("open", true).await?;
//! model.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! [`Transport`]: softdev_transport::Transport

mod binding;
mod calc;
mod directory;
mod dispatch;
pub mod error;
pub mod ioc;
pub mod model;
pub mod record;
pub mod scheduler;

// Re-exports
pub use error::{IocError, Result};
pub use ioc::Ioc;
pub use model::{Callback, Callbacks, Model, Schema, SchemaBuilder};
pub use record::Record;
pub use scheduler::{event_loop, EventLoop, Job, LoopHandle, Scheduler};
