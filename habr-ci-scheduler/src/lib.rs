pub mod error;
pub mod schedule;
pub mod trigger;

pub use error::{ScheduleError, ScheduleResult};
pub use schedule::CronSchedule;
pub use trigger::{Clock, SystemClock, Trigger};
