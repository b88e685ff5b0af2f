use super::PinDef;
use super::{PinMode, Port};

/// USART1 transmit, towards the host
pub const TX: PinDef = PinDef::new(Port::A, 9, PinMode::Alt(7));
/// USART1 receive
pub const RX: PinDef = PinDef::new(Port::A, 10, PinMode::Alt(7));
