// Floating-point math used by the control loops.

pub mod controllers;
