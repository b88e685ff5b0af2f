//! Pin assignments of the board. Every peripheral module pulls its pins from here.
use hal::gpio::{Pin, PinMode, Port};

pub mod driver;
pub mod encoder;
pub mod led;
pub mod serial;

/// Represents the definition of a GPIO pin.
pub struct PinDef {
    /// The port to which the pin belongs (e.g., Port::A, Port::B).
    port: Port,
    /// The pin number within the port.
    pin: u8,
    /// The mode of the pin (e.g., Output, Input, Alternate function).
    mode: PinMode,
}

impl PinDef {
    pub const fn new(port: Port, pin: u8, mode: PinMode) -> PinDef {
        PinDef { port, pin, mode }
    }

    /// EXTI line served by this pin. Lines are shared across ports.
    pub const fn exti_line(&self) -> u8 {
        self.pin
    }

    /// Configures the pin and hands out the HAL handle.
    /// # Example
    /// ```ignore
    /// let mut dr_reset = pinout::driver::RESET.init();
    /// dr_reset.set_high();
    /// ```
    pub fn init(&self) -> Pin {
        Pin::new(self.port, self.pin, self.mode)
    }
}
