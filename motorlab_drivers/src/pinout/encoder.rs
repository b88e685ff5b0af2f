use super::PinDef;
use super::{PinMode, Port};

// Open-collector quadrature outputs, pulled up internally
pub const ENC_A: PinDef = PinDef::new(Port::C, 0, PinMode::Input);
pub const ENC_B: PinDef = PinDef::new(Port::C, 1, PinMode::Input);
