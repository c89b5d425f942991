pub mod category;
pub mod entry;
pub mod goal;

pub use category::{Category, GoalCycle, PerCategory};
pub use entry::{DayEntry, WeeklyStats};
pub use goal::Goal;
