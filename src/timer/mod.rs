pub mod controller;
pub mod state;

pub use controller::{PracticeTimer, TimerEvent, TimerSnapshot};
pub use state::{RunState, ToggleTransition};
