use super::PinDef;
use super::{PinMode, Port};

pub const RED: PinDef = PinDef::new(Port::B, 15, PinMode::Output);
pub const GRN: PinDef = PinDef::new(Port::B, 14, PinMode::Output);
pub const BLU: PinDef = PinDef::new(Port::B, 13, PinMode::Output);
