//! `softdev run`: serve configured models over the TCP transport

use crate::db;
use anyhow::{Context, Result};
use softdev_common::{wait_for_shutdown, SoftdevConfig};
use softdev_ioc::{Ioc, Model};
use softdev_transport::{TcpTransport, Transport};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Running models and the listener publishing them
pub struct Server {
    transport: Arc<TcpTransport>,
    models: Vec<Model>,
    event_loop: JoinHandle<()>,
}

impl Server {
    /// Bind the listener and start every configured model
    ///
    /// Models already started are shut down again if a later one fails.
    pub async fn start(config: &SoftdevConfig) -> Result<Self> {
        let schemas = config
            .models
            .iter()
            .map(|model| db::schema(model).map(|schema| (model.device.as_str(), schema)))
            .collect::<Result<Vec<_>>>()?;

        let transport = Arc::new(
            TcpTransport::bind(config.server.bind.as_str())
                .await
                .with_context(|| format!("binding {}", config.server.bind))?,
        );
        let published: Arc<dyn Transport> = transport.clone();
        let (ioc, event_loop) = Ioc::with_event_loop(published);
        let event_loop = event_loop.spawn();

        let mut server = Self {
            transport,
            models: Vec::with_capacity(schemas.len()),
            event_loop,
        };
        for (device, schema) in schemas {
            match Model::start(&ioc, device, &schema, None).await {
                Ok(model) => server.models.push(model),
                Err(e) => {
                    server.stop().await;
                    return Err(e).with_context(|| format!("starting device {}", device));
                },
            }
        }

        if server.models.is_empty() {
            warn!("No models configured, serving nothing");
        }
        info!(
            addr = %server.local_addr(),
            models = server.models.len(),
            variables = ioc.names().len(),
            "Soft IOC running"
        );
        Ok(server)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    /// Shut models down in reverse start order, then close the listener
    pub async fn stop(self) {
        for model in self.models.iter().rev() {
            model.shutdown().await;
        }
        self.transport.shutdown();
        self.event_loop.abort();
        info!("Soft IOC stopped");
    }
}

pub async fn run(config: SoftdevConfig) -> Result<()> {
    let server = Server::start(&config).await?;
    let signal = wait_for_shutdown().await;
    info!(?signal, "Shutting down");
    server.stop().await;
    Ok(())
}
