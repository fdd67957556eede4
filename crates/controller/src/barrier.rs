use crate::actuator::{BarrierActuator, Transition};
use crate::allow_list::AllowList;
use crate::plate::PlateRecognizer;
use bus::{SharedBus, fetch, keys};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BarrierStatus {
    Down,
    Up,
}

impl BarrierStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BarrierStatus::Down => "down",
            BarrierStatus::Up => "up",
        }
    }
}

/// Result of a barrier or plate check, as reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    NoVehicle,
    Available,
    NotAvailable,
    Up,
    Down,
}

impl CheckOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckOutcome::NoVehicle => "no_vehicle",
            CheckOutcome::Available => "available",
            CheckOutcome::NotAvailable => "not_available",
            CheckOutcome::Up => "up",
            CheckOutcome::Down => "down",
        }
    }
}

impl From<BarrierStatus> for CheckOutcome {
    fn from(status: BarrierStatus) -> Self {
        match status {
            BarrierStatus::Down => CheckOutcome::Down,
            BarrierStatus::Up => CheckOutcome::Up,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierState {
    pub status: BarrierStatus,
    pub raised_at: Option<DateTime<Utc>>,
}

impl Default for BarrierState {
    fn default() -> Self {
        Self {
            status: BarrierStatus::Down,
            raised_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BarrierConfig {
    /// Total wait for the presence signal.
    pub presence_timeout: Duration,
    pub presence_poll: Duration,
    /// Delay from raising to the unconditional lower.
    pub auto_lower: Duration,
}

impl Default for BarrierConfig {
    fn default() -> Self {
        Self {
            presence_timeout: Duration::from_secs(30),
            presence_poll: Duration::from_millis(500),
            auto_lower: Duration::from_secs(10),
        }
    }
}

struct Gate {
    state: BarrierState,
    /// Bumped on every raise; a pending lower only applies to its own raise.
    generation: u64,
}

struct Shared {
    gate: Mutex<Gate>,
    actuators: Vec<Arc<dyn BarrierActuator>>,
}

impl Shared {
    fn gate(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn actuate(&self, transition: &Transition) {
        for actuator in &self.actuators {
            actuator.apply(transition);
        }
    }

    fn lower(&self, generation: u64) {
        let transition = {
            let mut gate = self.gate();
            if gate.generation != generation || gate.state.status == BarrierStatus::Down {
                return;
            }
            gate.state = BarrierState::default();
            Transition::new(BarrierStatus::Down, BarrierStatus::Up)
        };
        tracing::info!("Barrier lowered");
        self.actuate(&transition);
    }
}

/// DOWN/UP barrier policy driven by the presence signal on the bus.
///
/// Every raise schedules its own lower, independent of later presence.
pub struct BarrierController<P, A> {
    bus: SharedBus,
    plates: P,
    allow_list: A,
    config: BarrierConfig,
    shared: Arc<Shared>,
}

impl<P: PlateRecognizer, A: AllowList> BarrierController<P, A> {
    pub fn new(
        bus: SharedBus,
        plates: P,
        allow_list: A,
        config: BarrierConfig,
        actuators: Vec<Arc<dyn BarrierActuator>>,
    ) -> Self {
        Self {
            bus,
            plates,
            allow_list,
            config,
            shared: Arc::new(Shared {
                gate: Mutex::new(Gate {
                    state: BarrierState::default(),
                    generation: 0,
                }),
                actuators,
            }),
        }
    }

    pub fn get_status(&self) -> BarrierState {
        self.shared.gate().state
    }

    /// Waits for a vehicle and reports whether its plate is allowed,
    /// without touching the barrier.
    pub async fn check_plate(&self) -> CheckOutcome {
        match self.authorize().await {
            Authorization::Granted(_) => CheckOutcome::Available,
            Authorization::NoVehicle => CheckOutcome::NoVehicle,
            Authorization::Denied => CheckOutcome::NotAvailable,
        }
    }

    /// Raises the barrier for an authorized vehicle and schedules the lower.
    /// An already raised barrier reports `Up` and keeps its original timer.
    pub async fn check_and_raise(&self) -> CheckOutcome {
        if self.get_status().status == BarrierStatus::Up {
            tracing::debug!("Barrier already up");
            return CheckOutcome::Up;
        }
        match self.authorize().await {
            Authorization::Granted(plate) => {
                self.raise(&plate);
                CheckOutcome::Up
            }
            Authorization::NoVehicle => CheckOutcome::NoVehicle,
            Authorization::Denied => CheckOutcome::NotAvailable,
        }
    }

    async fn authorize(&self) -> Authorization {
        let allowed = match self.allow_list.plates().await {
            Ok(allowed) => allowed,
            Err(e) => {
                tracing::warn!(error = %e, "Allow-list unavailable");
                return Authorization::Denied;
            }
        };
        if allowed.is_empty() {
            tracing::debug!("Allow-list empty, skipping presence wait");
            return Authorization::NoVehicle;
        }

        let Some(snapshot) = self.wait_for_vehicle().await else {
            tracing::info!(
                timeout_secs = self.config.presence_timeout.as_secs(),
                "No vehicle within presence timeout"
            );
            return Authorization::NoVehicle;
        };

        let candidates = match self.plates.recognize(snapshot).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(error = %e, "Plate recognition failed");
                return Authorization::Denied;
            }
        };
        match candidates.into_iter().find(|plate| allowed.contains(plate)) {
            Some(plate) => {
                tracing::info!(plate = %plate, "Plate authorized");
                Authorization::Granted(plate)
            }
            None => {
                tracing::info!("No authorized plate recognized");
                Authorization::Denied
            }
        }
    }

    async fn wait_for_vehicle(&self) -> Option<Vec<u8>> {
        let deadline = tokio::time::Instant::now() + self.config.presence_timeout;
        loop {
            if let Some(snapshot) = fetch(self.bus.as_ref(), keys::VEHICLE_IN) {
                return Some(snapshot);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep_until(deadline.min(tokio::time::Instant::now() + self.config.presence_poll)).await;
        }
    }

    fn raise(&self, plate: &str) {
        let (transition, generation) = {
            let mut gate = self.shared.gate();
            if gate.state.status == BarrierStatus::Up {
                return;
            }
            let raised_at = Utc::now();
            gate.state = BarrierState {
                status: BarrierStatus::Up,
                raised_at: Some(raised_at),
            };
            gate.generation += 1;
            (Transition::new(BarrierStatus::Up, BarrierStatus::Down), gate.generation)
        };
        tracing::info!(plate, auto_lower_secs = self.config.auto_lower.as_secs(), "Barrier raised");
        self.shared.actuate(&transition);

        let shared = Arc::clone(&self.shared);
        let delay = self.config.auto_lower;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            shared.lower(generation);
        });
    }
}

enum Authorization {
    Granted(String),
    NoVehicle,
    Denied,
}
