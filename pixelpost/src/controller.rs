use std::{
    path::{Path, PathBuf},
    sync::{Arc, LazyLock},
};

use anyhow::Context;

use pixelpost_common::{Signal, activity, internal, logging};
use pixelpost_control::{ControlAuthConfig, ControlServer, DEFAULT_CONTROL_SOCKET};
use pixelpost_delivery::{
    DeliveryConfig, DestinationsConfig, Dispatcher, Enqueuer, QueueService, Scheduler,
    SchedulerConfig, SchedulerHandle,
};
use pixelpost_gateway::{GatewayConfig, GatewayServer, GatewayState};
use pixelpost_store::StoreConfig;
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::control_handler::PixelpostControlHandler;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ControlConfig {
    #[serde(default = "default_socket_path")]
    pub socket_path: String,

    #[serde(default)]
    pub auth: ControlAuthConfig,
}

fn default_socket_path() -> String {
    DEFAULT_CONTROL_SOCKET.to_string()
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            auth: ControlAuthConfig::default(),
        }
    }
}

/// The whole process, as described by the configuration file.
#[derive(Debug, Default, Deserialize)]
pub struct Pixelpost {
    #[serde(default)]
    store: StoreConfig,
    #[serde(default)]
    delivery: DeliveryConfig,
    #[serde(default)]
    scheduler: SchedulerConfig,
    #[serde(default)]
    destinations: DestinationsConfig,
    #[serde(default)]
    control: ControlConfig,
    #[serde(default)]
    gateway: GatewayConfig,
}

/// Overrides the configuration search when set.
pub const CONFIG_ENV: &str = "PIXELPOST_CONFIG";

/// Checked in order when [`CONFIG_ENV`] is unset.
pub const CONFIG_SEARCH_PATH: [&str; 2] = [
    "./pixelpost.config.ron",
    "/etc/pixelpost/pixelpost.config.ron",
];

fn locate_config(explicit: Option<PathBuf>, search: &[&str]) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        anyhow::ensure!(
            path.exists(),
            "{CONFIG_ENV} points to a missing file: {}",
            path.display()
        );
        return Ok(path);
    }

    search
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
        .with_context(|| {
            format!(
                "No pixelpost configuration found. Set {CONFIG_ENV} or create one of: {}",
                search.join(", ")
            )
        })
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!("CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!("Terminate Signal received, shutting down");
        }
    };

    let mut receiver = SHUTDOWN_BROADCAST.subscribe();

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    loop {
        tokio::select! {
            sig = receiver.recv() => {
                match sig {
                    Ok(s) => tracing::debug!("Received {s:?}"),
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(e) => tracing::debug!("Received: {e:?}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    Ok(())
}

async fn serve_gateway(
    gateway: Option<GatewayServer>,
    shutdown: broadcast::Receiver<Signal>,
) -> anyhow::Result<()> {
    match gateway {
        Some(gateway) => Ok(gateway.serve(shutdown).await?),
        None => Ok(()),
    }
}

impl Pixelpost {
    /// Load the configuration named by `PIXELPOST_CONFIG`, falling back to
    /// the first entry of [`CONFIG_SEARCH_PATH`] that exists.
    pub fn load() -> anyhow::Result<Self> {
        let explicit = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        Self::from_file(&locate_config(explicit, &CONFIG_SEARCH_PATH)?)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        ron::from_str(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Run the queue, its scheduler and both management surfaces until a
    /// shutdown signal arrives.
    ///
    /// # Errors
    ///
    /// This function will return an error if the store cannot be opened,
    /// a destination is misconfigured, or a listener cannot be bound.
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();

        let activity = activity::global();
        let store = self.store.open().await?;
        let registry = Arc::new(self.destinations.build_registry(self.delivery.timeout())?);
        let relaying = registry.is_relaying();
        let destinations = self.destinations.enabled_destinations();

        let (handle, requests) = SchedulerHandle::channel();

        let dispatcher = Arc::new(
            Dispatcher::new(Arc::clone(&store), registry, Arc::clone(&activity))
                .with_policy(self.delivery.retry)
                .with_scheduler(handle.clone(), self.scheduler.backlog_delay()),
        );
        let scheduler = Scheduler::new(
            Arc::clone(&dispatcher),
            requests,
            self.scheduler,
            self.delivery.batch_limit,
        );
        let enqueuer = Enqueuer::new(Arc::clone(&store), Arc::clone(&activity))
            .with_scheduler(handle.clone(), self.scheduler.enqueue_delay());
        let service = Arc::new(QueueService::new(store, dispatcher, activity).with_scheduler(handle));

        let handler = PixelpostControlHandler::new(
            Arc::clone(&service),
            self.control.auth,
            self.delivery.manual_limit,
        )
        .with_destinations(destinations, relaying);
        let control = ControlServer::new(self.control.socket_path, Arc::new(handler));

        let gateway = if self.gateway.enabled {
            let state = GatewayState::new(enqueuer, service, destinations, &self.gateway);
            Some(GatewayServer::new(&self.gateway, state).await?)
        } else {
            internal!("Gateway disabled");
            None
        };

        internal!("pixelpost running");

        let components = async {
            tokio::try_join!(
                async move {
                    scheduler
                        .serve(SHUTDOWN_BROADCAST.subscribe())
                        .await
                        .map_err(anyhow::Error::from)
                },
                async {
                    control
                        .serve(SHUTDOWN_BROADCAST.subscribe())
                        .await
                        .map_err(anyhow::Error::from)
                },
                serve_gateway(gateway, SHUTDOWN_BROADCAST.subscribe()),
            )
            .map(|((), (), ())| ())
        };

        let ret = tokio::select! {
            r = components => r,
            r = shutdown() => r,
        };

        internal!("Stopping queue, scheduler and management surfaces");

        ret
    }
}
