//! H-bridge driver pins.
use super::PinDef;
use super::{PinMode, Port};

/// Reset pin of the bridge driver, held high while running
pub const RESET: PinDef = PinDef::new(Port::B, 2, PinMode::Output);

/// Enable pin of the bridge driver
pub const ENABLE: PinDef = PinDef::new(Port::A, 4, PinMode::Output);

/// Bridge input 1, TIM2 CH1. Driven for forward rotation
pub const IN1: PinDef = PinDef::new(Port::A, 0, PinMode::Alt(1));

/// Bridge input 2, TIM2 CH2. Driven for reverse rotation
pub const IN2: PinDef = PinDef::new(Port::A, 1, PinMode::Alt(1));
