mod frame;
mod history;

pub use frame::{Decision, Frame, FrameTiming, Sample};
pub use history::{ActionHistory, ActionHistoryEntry, ACTION_HISTORY_CAPACITY};
