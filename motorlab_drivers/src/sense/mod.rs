// Bridge current and supply voltage sensing on ADC1.

// Conversions are started from the millisecond tick and land in a DMA buffer
// owned by the application. Results are left aligned, so full scale is 0xFFFF
// regardless of the ADC resolution.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use hal::{
    adc::{Adc, AdcDevice, Align, InputType, SampleTime},
    clocks::Clocks,
    dma::{DmaChannel, DmaPeriph},
    pac::ADC1,
};

use motorlab_algo::ElectricalReading;

const I_SENSE: u8 = 4;
const V_SENSE: u8 = 3;

pub const SAMPLING_COUNT: usize = 2;
const ADC1_SEQUENCE: [u8; SAMPLING_COUNT] = [I_SENSE, V_SENSE];

const FULL_SCALE: f32 = 65535.0;
const MID_SCALE: f32 = 32768.0;

/// Converts raw counts into physical units.
#[derive(Clone, Copy)]
pub struct SenseScale {
    pub current_full_scale_a: f32, // Current at either rail of the bipolar amplifier
    pub supply_full_scale_v: f32,  // Supply voltage that reads as full scale
}

impl SenseScale {
    pub fn reading(&self, raw: [u16; SAMPLING_COUNT]) -> ElectricalReading {
        ElectricalReading {
            current_a: (raw[0] as f32 - MID_SCALE) / MID_SCALE * self.current_full_scale_a,
            voltage_v: raw[1] as f32 / FULL_SCALE * self.supply_full_scale_v,
        }
    }
}

pub struct AnalogSense {
    adc: Adc<ADC1>,
}

impl AnalogSense {
    pub fn new(adc1: ADC1, clock_cfg: &Clocks) -> Self {
        let mut adc = Adc::new_adc1(adc1, AdcDevice::One, Default::default(), clock_cfg.systick());

        for (i, ch) in ADC1_SEQUENCE.iter().enumerate() {
            adc.set_sequence(*ch, i as u8 + 1);
            adc.set_input_type(*ch, InputType::SingleEnded);
            adc.set_sample_time(*ch, SampleTime::T2);
        }
        adc.set_sequence_len(SAMPLING_COUNT as u8);
        adc.set_align(Align::Left);

        AnalogSense { adc }
    }

    /// Starts one conversion of the whole sequence into `buf` on DMA1 channel 1.
    ///
    /// # Safety
    /// `buf` must stay untouched until the transfer-complete interrupt fires.
    pub unsafe fn start(&mut self, buf: &mut [u16; SAMPLING_COUNT]) {
        self.adc.read_dma(
            buf,
            &ADC1_SEQUENCE,
            DmaChannel::C1,
            Default::default(),
            DmaPeriph::Dma1,
        );
    }
}
