pub mod config;
pub mod coordinator;
pub mod error;
pub mod logger;
pub mod media;
pub mod peer;
pub mod session;
pub mod signaling;
pub mod utils;

pub use config::ClientConfig;
pub use coordinator::{Command, Input, Mailbox, Phase, SessionCoordinator, Timer};
pub use error::{Error, Result};
pub use logger::{Emitter, UiEvent};
pub use media::{CaptureDevice, LocalMedia, MediaSource, SampleCapture};
pub use session::{ChatLog, ChatMessage, Origin, SessionId};
pub use signaling::{Inbound, Outbound, SignalingClient, SignalingSink};

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Запущенный клиент: команды внутрь, события UI наружу
pub struct Client {
    pub commands: mpsc::UnboundedSender<Command>,
    pub events: mpsc::UnboundedReceiver<UiEvent>,
    coordinator: JoinHandle<()>,
    transport: JoinHandle<()>,
}

impl Client {
    pub fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::Signaling("client is shut down".into()))
    }

    /// Останавливает координатор и транспорт сигналинга
    pub async fn shutdown(self) {
        drop(self.commands);
        if let Err(e) = self.coordinator.await {
            tracing::warn!("coordinator task ended abnormally: {e}");
        }
        self.transport.abort();
    }
}

/// Запускает клиент с захватом `device`. Требует работающий tokio runtime.
pub fn run_with_device(config: ClientConfig, device: Arc<dyn CaptureDevice>) -> Result<Client> {
    config.validate()?;
    tracing::info!(url = %config.signaling_url, "starting pairchat client");

    let (signaling, inbound, transport) = SignalingClient::spawn(
        config.signaling_url.clone(),
        config.reconnect_attempts,
        config.reconnect_delay(),
    );
    let connector = Arc::new(peer::WebRtcConnector::new(config.ice_servers.clone()));
    let (ui_tx, ui_rx) = mpsc::unbounded_channel();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

    let (coordinator, mailbox) = SessionCoordinator::new(
        config,
        MediaSource::new(device),
        connector,
        signaling,
        Emitter::new(ui_tx),
    );
    let coordinator = tokio::spawn(coordinator.run(mailbox, cmd_rx, inbound));

    Ok(Client {
        commands: cmd_tx,
        events: ui_rx,
        coordinator,
        transport,
    })
}

/// Клиент с захватом по умолчанию (`SampleCapture`)
pub fn run(config: ClientConfig) -> Result<Client> {
    run_with_device(config, Arc::new(SampleCapture))
}
