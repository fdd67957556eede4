//! Barrier automation: wait for a vehicle, read its plate, raise the barrier
//! for authorized plates and always lower it again.

pub mod actuator;
pub mod allow_list;
pub mod barrier;
pub mod plate;

pub use actuator::{BarrierActuator, BusActuator, MqttActuator, Transition};
pub use allow_list::{AllowList, AllowListSource};
pub use barrier::{BarrierConfig, BarrierController, BarrierState, BarrierStatus, CheckOutcome};
pub use plate::{HttpPlateRecognizer, PlateRecognizer, plates_from_response};
