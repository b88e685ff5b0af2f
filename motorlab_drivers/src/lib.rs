// Board support for the motor lab firmware on the STM32G431: pin map, H-bridge
// PWM, quadrature encoder interrupts, serial link and analog sensing.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

#![no_std]

pub mod encoder_exti;
pub mod pinout;
pub mod pwm;
pub mod sense;
pub mod serial;
