pub mod controller;
pub mod input;
pub mod loop_worker;

pub use controller::SessionController;
pub use input::{decode_line, InputError};
pub use loop_worker::{session_loop, SessionEnd, SessionOptions, SessionSummary};
