// Serial line protocol shared by the firmware and the host tools.

// Key Features:
// - Line assembly from a byte stream with a bounded buffer.
// - Tagged command parsing with strict numeric validation.
// - Exact wire formatting of replies and telemetry, plus host-side telemetry parsing.
// - Non-blocking reply output through a byte queue drained by the UART interrupt.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use core::fmt;

use thiserror::Error;

pub mod command;
pub mod line_buffer;
pub mod response;
pub mod telemetry;
pub mod tx_queue;

pub use command::Command;
pub use line_buffer::LineBuffer;
pub use response::Response;
pub use telemetry::{TelemetryError, TelemetryLine};
pub use tx_queue::QueuedWriter;

/// Numeric argument named in an `ERROR_INVALID_<FIELD>_FORMAT` reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Field {
    Pwm,
    Duration,
    Kp,
    Ki,
    Kd,
    Speed,
}

impl Field {
    pub const fn token(self) -> &'static str {
        match self {
            Field::Pwm => "PWM",
            Field::Duration => "DURATION",
            Field::Kp => "KP",
            Field::Ki => "KI",
            Field::Kd => "KD",
            Field::Speed => "SPEED",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Rejected input. `Display` yields the exact reply line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    #[error("ERROR_UNKNOWN_COMMAND")]
    UnknownCommand,
    /// Missing, non-numeric or non-finite mandatory argument
    #[error("ERROR_INVALID_{0}_FORMAT")]
    InvalidFormat(Field),
    /// PWM parsed but outside 0..=255
    #[error("ERROR_PWM_OUT_OF_RANGE")]
    PwmOutOfRange,
    #[error("ERROR_LINE_TOO_LONG")]
    LineTooLong,
}
