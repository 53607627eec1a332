//! Usage quotas: reset windows and the pre-send limit gate.

pub mod gate;
pub mod window;
