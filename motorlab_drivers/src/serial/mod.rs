// Host link over USART1, fully interrupt driven.

// The USART1 interrupt owns the peripheral. Received bytes go out through the
// RX queue, replies come in through the TX queue and are moved into the
// transmitter as it empties. Nothing outside the interrupt touches the port.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use hal::{
    clocks::Clocks,
    pac::USART1,
    usart::{Usart, UsartConfig, UsartInterrupt},
};
use heapless::spsc::Consumer;

use super::pinout;

pub struct SerialLink {
    usart: Usart<USART1>,
}

impl SerialLink {
    pub fn new(usart1: USART1, clock_cfg: &Clocks, baud: u32) -> Self {
        pinout::serial::TX.init();
        pinout::serial::RX.init();

        let mut usart = Usart::new(usart1, baud, UsartConfig::default(), clock_cfg);
        usart.enable_interrupt(UsartInterrupt::ReadNotEmpty);
        SerialLink { usart }
    }

    /// Pops the received byte, if any.
    ///
    /// Overrun and framing errors are cleared here; left set, ORE keeps the
    /// RX interrupt pending and reception stalls.
    pub fn read_byte(&mut self) -> Option<u8> {
        let byte = if self.usart.check_status_flag(UsartInterrupt::ReadNotEmpty) {
            Some(self.usart.read_one())
        } else {
            None
        };
        if self.usart.check_status_flag(UsartInterrupt::Overrun) {
            self.usart.clear_interrupt(UsartInterrupt::Overrun);
            defmt::warn!("SERIAL: rx overrun");
        }
        if self.usart.check_status_flag(UsartInterrupt::FramingError) {
            self.usart.clear_interrupt(UsartInterrupt::FramingError);
            defmt::warn!("SERIAL: framing error");
        }
        byte
    }

    /// Moves queued bytes into the transmitter while it has room. The TX-empty
    /// interrupt stays armed only while bytes remain.
    pub fn pump_tx<const N: usize>(&mut self, tx: &mut Consumer<'static, u8, N>) {
        while self.usart.check_status_flag(UsartInterrupt::TransmitEmpty) {
            match tx.dequeue() {
                Some(byte) => self.usart.write_one(byte),
                None => break,
            }
        }
        if tx.ready() {
            self.usart.enable_interrupt(UsartInterrupt::TransmitEmpty);
        } else {
            self.usart.disable_interrupt(UsartInterrupt::TransmitEmpty);
        }
    }
}
