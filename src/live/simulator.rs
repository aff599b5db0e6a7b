//! Simulation clock: a periodic task that synthesizes threat-detected
//! broadcasts from the cached collection, for exercising the live path
//! without a real detection pipeline.

use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::live::Broadcaster;
use crate::model::{BroadcastMessage, Threat, ThreatStatus};
use crate::query::{QueryService, ThreatFilter};

/// Two-state machine: stopped (initial) or running one periodic task.
/// `start` and `stop` are idempotent.
pub struct SimulationClock {
    query: QueryService,
    broadcaster: Broadcaster,
    default_interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SimulationClock {
    pub fn new(query: QueryService, broadcaster: Broadcaster, default_interval: Duration) -> Self {
        Self {
            query,
            broadcaster,
            default_interval,
            task: Mutex::new(None),
        }
    }

    /// Transition to running. A no-op when already running; a second call
    /// never schedules a duplicate timer.
    pub async fn start(&self, interval: Option<Duration>) {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("simulation already running");
            return;
        }
        let every = interval.unwrap_or(self.default_interval);
        let query = self.query.clone();
        let broadcaster = self.broadcaster.clone();
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // Skip the immediate first fire so the first event lands one
            // full interval after start.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                tick(&query, &broadcaster).await;
            }
        }));
        info!(interval_ms = every.as_millis() as u64, "simulation started");
    }

    /// Transition to stopped. No tick fires after this returns.
    pub async fn stop(&self) {
        let mut task = self.task.lock().await;
        if let Some(handle) = task.take() {
            handle.abort();
            info!("simulation stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

/// One simulation tick: derive a synthetic detection from a random cached
/// threat and broadcast it. Silent no-op when the collection is empty or
/// unreadable; the clock never surfaces errors.
async fn tick(query: &QueryService, broadcaster: &Broadcaster) {
    let threats = match query.get_threats(&ThreatFilter::default()).await {
        Ok(threats) if !threats.is_empty() => threats,
        Ok(_) => {
            debug!("simulation tick skipped: no threats loaded");
            return;
        }
        Err(e) => {
            debug!(error = %e, "simulation tick skipped");
            return;
        }
    };
    let simulated = synthesize(&threats);
    broadcaster
        .broadcast(&BroadcastMessage::threat_detected(simulated))
        .await;
}

/// Build a fresh synthetic threat from a uniformly chosen template. The
/// payload is entirely simulator-generated, never a cache record passed
/// through as-is.
fn synthesize(threats: &[Threat]) -> Threat {
    let mut rng = rand::thread_rng();
    let base = &threats[rng.gen_range(0..threats.len())];
    let jitter: f64 = rng.gen_range(-0.8..0.8);
    Threat {
        id: format!("SIM-{}", Uuid::new_v4().simple()),
        vendor_name: base.vendor_name.clone(),
        threat_type: base.threat_type.clone(),
        severity: base.severity,
        ai_risk_score: (base.ai_risk_score + jitter).clamp(0.0, 10.0),
        status: ThreatStatus::Active,
        detected_at: Utc::now(),
        description: format!("Simulated detection: {}", base.description),
        affected_systems: base.affected_systems.clone(),
        remediation_steps: None,
        timeline: None,
    }
}
