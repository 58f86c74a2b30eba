use super::{AdaptiveRuntime, ShutdownReason};
use crate::budget::DegradeHint;
use crate::error::{AdaptcamError, EventBusError, Result};
use crate::events::{EventFilter, EventReceiver, RuntimeEvent};

use std::sync::Arc;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tracing::{error, info, warn};

impl AdaptiveRuntime {
    /// Run until a signal or cancellation, re-resolving the budget whenever the
    /// detection loop reports sustained degradation
    pub async fn run(&mut self) -> Result<i32> {
        info!("Adaptive runtime is running");

        let shutdown_sender = self
            .shutdown_sender
            .take()
            .ok_or_else(|| AdaptcamError::system("Shutdown sender already taken"))?;
        let mut shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| AdaptcamError::system("Shutdown receiver already taken"))?;

        self.setup_signal_handlers(shutdown_sender);

        let mut degrades = self.degrade_events.take().unwrap_or_else(|| {
            self.event_bus
                .subscribe_filtered(EventFilter::EventTypes(vec!["degrade_detected"]), "runtime")
        });
        let token = self.cancellation_token.clone();

        if let Some(hint) = self.pending_degrade(&mut degrades) {
            info!(reason = ?hint.reason, "Applying degrade report raised before run");
            self.apply_degrade(&hint).await;
        }

        let reason = loop {
            tokio::select! {
                reason = &mut shutdown_receiver => {
                    break reason.unwrap_or_else(|_| {
                        ShutdownReason::Error("Shutdown channel closed unexpectedly".to_string())
                    });
                }
                _ = token.cancelled() => break ShutdownReason::UserRequest,
                event = degrades.recv() => match event {
                    Ok(RuntimeEvent::DegradeDetected { hint, .. }) => self.apply_degrade(&hint).await,
                    Ok(_) => {}
                    Err(EventBusError::ChannelClosed) => {
                        break ShutdownReason::Error("Event bus closed".to_string());
                    }
                    Err(e) => warn!("Runtime event receiver error: {}", e),
                },
            }
        };

        info!("Shutdown initiated: {:?}", reason);
        self.shutdown(reason).await
    }

    /// Drain reports queued before run() and fold in the current loop's own hint.
    /// Several queued reports still cost only one step down.
    fn pending_degrade(&self, degrades: &mut EventReceiver) -> Option<DegradeHint> {
        let mut pending = None;
        loop {
            match degrades.try_recv() {
                Ok(Some(RuntimeEvent::DegradeDetected { hint, .. })) => pending = Some(hint),
                Ok(Some(_)) => {}
                Ok(None) | Err(EventBusError::ChannelClosed) => break,
                // lagged; the receiver has skipped ahead, keep draining
                Err(_) => {}
            }
        }

        pending.or_else(|| {
            self.detection
                .as_ref()
                .and_then(|detection| detection.degrade_hint())
        })
    }

    async fn apply_degrade(&mut self, hint: &DegradeHint) {
        if let Err(e) = self.degrade(hint).await {
            error!("Failed to apply degraded budget: {}", e);
            self.event_bus.notify(RuntimeEvent::SystemError {
                component: "runtime".to_string(),
                error: e.to_string(),
            });
        }
    }

    fn setup_signal_handlers(&self, shutdown_sender: oneshot::Sender<ShutdownReason>) {
        let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));

        #[cfg(unix)]
        {
            let sender = Arc::clone(&shutdown_sender);
            tokio::spawn(async move {
                let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(stream) => stream,
                    Err(e) => {
                        warn!("Failed to register SIGTERM handler: {}", e);
                        return;
                    }
                };
                if sigterm.recv().await.is_some() {
                    info!("Received SIGTERM signal");
                    if let Some(sender) = sender.lock().await.take() {
                        let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string()));
                    }
                }
            });
        }

        let sender = Arc::clone(&shutdown_sender);
        tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                if let Some(sender) = sender.lock().await.take() {
                    let _ = sender.send(ShutdownReason::Signal("SIGINT".to_string()));
                }
            }
        });
    }
}
