//! Sliding-window admission control.

mod gate;
mod window;

pub use gate::AdmissionGate;
pub use window::TimeUnit;
