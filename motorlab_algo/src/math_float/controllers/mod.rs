pub mod pid;

pub use pid::{PidGains, PID};
