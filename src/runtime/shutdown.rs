use super::{AdaptiveRuntime, ComponentState, ShutdownReason};
use crate::error::Result;
use crate::events::RuntimeEvent;

use std::time::SystemTime;
use tracing::info;

impl AdaptiveRuntime {
    /// Ask a running [`run`](Self::run) loop to shut down
    pub fn request_shutdown(&self) {
        self.cancellation_token.cancel();
    }

    /// Stop detection and report the exit code for `reason`
    pub async fn shutdown(&mut self, reason: ShutdownReason) -> Result<i32> {
        self.event_bus.notify(RuntimeEvent::ShutdownRequested {
            timestamp: SystemTime::now(),
            reason: format!("{:?}", reason),
        });

        self.stop_detection().await;
        self.cancellation_token.cancel();

        for component in ["classifier", "storage"] {
            if self.get_component_state(component).await.is_some() {
                self.set_component_state(component, ComponentState::Stopped)
                    .await;
            }
        }

        let exit_code = match reason {
            ShutdownReason::Error(_) => 1,
            ShutdownReason::Signal(_) | ShutdownReason::UserRequest => 0,
        };

        info!(exit_code, "Adaptive runtime shut down");
        Ok(exit_code)
    }
}
