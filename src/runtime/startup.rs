use super::assess::{assess, storage_chain};
use super::{AdaptiveRuntime, ComponentState};
use crate::budget::{DegradeHint, ResourceBudget};
use crate::detection::{DetectionLoop, LoopState};
use crate::error::{AdaptcamError, Result};
use crate::events::RuntimeEvent;
use crate::storage::SessionRecovery;

use std::sync::Arc;
use std::time::SystemTime;
use tracing::{error, info, warn};
use uuid::Uuid;

impl AdaptiveRuntime {
    /// Classify the environment, resolve the budget, build the storage chain and
    /// restore (or mint) the session token
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Assessing device capabilities");
        self.set_component_state("classifier", ComponentState::Starting)
            .await;

        let signals = self.signal_source.read().await;
        let assessment = assess(&self.config, signals, self.tier_override);

        let now = SystemTime::now();
        self.event_bus.notify(RuntimeEvent::DeviceClassified {
            profile: assessment.profile.clone(),
            timestamp: now,
        });
        self.event_bus.notify(RuntimeEvent::HostClassified {
            host: assessment.host.clone(),
            timestamp: now,
        });
        self.event_bus.notify(RuntimeEvent::BudgetResolved {
            budget: assessment.budget.clone(),
            timestamp: now,
        });
        for concern in &assessment.concerns {
            warn!("Capability concern: {}", concern);
        }

        self.set_component_state("classifier", ComponentState::Running)
            .await;

        self.set_component_state("storage", ComponentState::Starting)
            .await;
        let storage = Arc::new(
            storage_chain(
                &self.config,
                &assessment.budget,
                &assessment.host,
                &self.store_overrides,
            )
            .map_err(|e| {
                error!("Failed to build storage chain: {}", e);
                e
            })?,
        );
        let recovery = SessionRecovery::new(
            Arc::clone(&storage),
            Arc::clone(&self.navigation),
            self.config.storage.clone(),
        );

        let token = match recovery.recover_token().await {
            Some(recovered) => {
                self.event_bus.notify(RuntimeEvent::SessionRecovered {
                    source: recovered.source,
                    consistent: recovered.consistent,
                });
                if !recovered.consistent {
                    // Rewrite every replica with the winning token
                    recovery.save_token(&recovered.token).await;
                }
                recovered.token
            }
            None => {
                let token = Uuid::new_v4().to_string();
                recovery.save_token(&token).await;
                info!(token = %token, "Started new session");
                token
            }
        };
        self.set_component_state("storage", ComponentState::Running)
            .await;

        self.budget = Some(assessment.budget.clone());
        self.assessment = Some(assessment);
        self.storage = Some(storage);
        self.recovery = Some(recovery);
        self.session_token = Some(token);

        info!("Runtime initialized");
        Ok(())
    }

    /// Start the detection loop with the current budget.
    /// Without detection collaborators this only records the budget.
    pub async fn start(&mut self) -> Result<()> {
        let budget = self
            .budget
            .clone()
            .ok_or_else(|| AdaptcamError::system("Runtime has not been initialized"))?;

        if self.collaborators.is_none() {
            info!("No detection collaborators configured, skipping detection loop");
            return Ok(());
        }

        self.start_detection(budget).await
    }

    /// Replace the budget with a cheaper one and restart detection under it.
    /// Returns false when the budget is already at its floor.
    pub async fn degrade(&mut self, hint: &DegradeHint) -> Result<bool> {
        let current = self
            .budget
            .clone()
            .ok_or_else(|| AdaptcamError::system("Runtime has not been initialized"))?;
        let next = self.require_assessment()?.degraded_budget(&current, hint);

        if next == current {
            info!(tier = %current.tier, "Budget already at its floor, keeping it");
            return Ok(false);
        }

        info!(from = %current.tier, to = %next.tier, "Re-resolving budget after degrade report");
        self.stop_detection().await;

        self.event_bus.notify(RuntimeEvent::BudgetResolved {
            budget: next.clone(),
            timestamp: SystemTime::now(),
        });
        self.budget = Some(next.clone());

        if self.collaborators.is_some() {
            self.start_detection(next).await?;
        }
        Ok(true)
    }

    async fn start_detection(&mut self, budget: ResourceBudget) -> Result<()> {
        let Some(collaborators) = self.collaborators.clone() else {
            return Ok(());
        };

        self.set_component_state("detection", ComponentState::Starting)
            .await;

        let mut builder = DetectionLoop::builder()
            .pipeline(collaborators.pipeline)
            .video(collaborators.video)
            .renderer(collaborators.renderer)
            .event_bus(Arc::clone(&self.event_bus))
            .config(self.config.detection.clone())
            .budget(budget);
        if let Some(probe) = collaborators.memory_probe {
            builder = builder.memory_probe(probe);
        }
        let detection = Arc::new(builder.build()?);

        if let Err(e) = detection.start().await {
            self.set_component_state("detection", ComponentState::Failed)
                .await;
            self.detection = Some(detection);
            return Err(e);
        }

        let state = match detection.state() {
            LoopState::Stopped => ComponentState::Stopped,
            _ => ComponentState::Running,
        };
        self.detection = Some(detection);
        self.set_component_state("detection", state).await;
        Ok(())
    }

    pub(super) async fn stop_detection(&mut self) {
        if let Some(detection) = self.detection.take() {
            self.set_component_state("detection", ComponentState::Stopping)
                .await;
            detection.stop();
            detection.join().await;
            self.set_component_state("detection", ComponentState::Stopped)
                .await;
        }
    }
}
