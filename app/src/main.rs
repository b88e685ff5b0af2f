#![no_main]
#![no_std]

use defmt_rtt as _;
use panic_probe as _;

use core::sync::atomic::{AtomicU32, Ordering};

use hal::{
    self,
    clocks::Clocks,
    dma,
    dma::{Dma, DmaChannel, DmaInput, DmaInterrupt, DmaPeriph},
    gpio::Pin,
    pac,
    pac::{DMA1, TIM3},
    timer::{Timer, TimerInterrupt},
};
use heapless::spsc::{Consumer, Producer, Queue};

use motorlab_algo::{LabConfig, LabInputs, LineBuffer, MotorLab, QuadratureDecoder, QueuedWriter};
use motorlab_drivers::sense::{SenseScale, SAMPLING_COUNT};

use cortex_m;

const PWM_FREQ: u16 = 20_000;
const TICK_FREQ: f32 = 1_000.;
const BAUD: u32 = 115_200;

const RX_CAPACITY: usize = 128;
const TX_CAPACITY: usize = 512;

const SENSE_SCALE: SenseScale = SenseScale {
    current_full_scale_a: 5.0,
    supply_full_scale_v: 69.0,
};

static DECODER: QuadratureDecoder = QuadratureDecoder::new();
static NOW_MS: AtomicU32 = AtomicU32::new(0);

static mut ADC_READ_BUF: [u16; SAMPLING_COUNT] = [0; SAMPLING_COUNT];

#[rtic::app(device = pac, peripherals = true)]
mod app {
    use super::*;

    use core::fmt::Write;
    use motorlab_drivers::*;

    #[shared]
    struct Shared {
        encoder: encoder_exti::EncoderPins,
        sense_raw: Option<[u16; SAMPLING_COUNT]>,
    }

    #[local]
    struct Local {
        lab: MotorLab<pwm::HBridgePwm>,
        line: LineBuffer,
        serial: serial::SerialLink,
        rx_prod: Producer<'static, u8, RX_CAPACITY>,
        rx_cons: Consumer<'static, u8, RX_CAPACITY>,
        tx_prod: Producer<'static, u8, TX_CAPACITY>,
        tx_cons: Consumer<'static, u8, TX_CAPACITY>,
        tick: Timer<TIM3>,
        sense: sense::AnalogSense,
        dma1: Dma<DMA1>,
        test_led: Pin,
        drive_led: Pin,
    }

    #[init(local = [
        rx_queue: Queue<u8, RX_CAPACITY> = Queue::new(),
        tx_queue: Queue<u8, TX_CAPACITY> = Queue::new(),
    ])]
    fn init(cx: init::Context) -> (Shared, Local) {
        let dp = cx.device;
        let clock_cfg = Clocks::default();
        clock_cfg.setup().unwrap();

        let sysclk_freq = clock_cfg.sysclk(); // System clock frequency in Hz
        defmt::debug!("SYSTEM: Clock frequency is {} MHz", sysclk_freq / 1000000);
        init_driver_pins();
        let (test_led, drive_led) = init_leds();

        let mut bridge = pwm::HBridgePwm::new(dp.TIM2, &clock_cfg, PWM_FREQ);
        bridge.begin();
        let lab = MotorLab::new(bridge, LabConfig::default());

        let encoder = encoder_exti::EncoderPins::new();
        let serial = serial::SerialLink::new(dp.USART1, &clock_cfg, BAUD);

        let dma1 = Dma::new(dp.DMA1);
        dma::enable_mux1();
        dma::mux(DmaPeriph::Dma1, DmaChannel::C1, DmaInput::Adc1);
        let sense = sense::AnalogSense::new(dp.ADC1, &clock_cfg);

        let mut tick = Timer::new_tim3(dp.TIM3, TICK_FREQ, Default::default(), &clock_cfg);
        tick.enable_interrupt(TimerInterrupt::Update);
        tick.enable();

        let (rx_prod, rx_cons) = cx.local.rx_queue.split();
        let (tx_prod, tx_cons) = cx.local.tx_queue.split();

        defmt::info!("SYSTEM: motor lab ready, {} baud", BAUD);
        (
            Shared {
                encoder,
                sense_raw: None,
            },
            Local {
                lab,
                line: LineBuffer::new(),
                serial,
                rx_prod,
                rx_cons,
                tx_prod,
                tx_cons,
                tick,
                sense,
                dma1,
                test_led,
                drive_led,
            },
        )
    }

    fn init_driver_pins() {
        let mut dr_reset = pinout::driver::RESET.init();
        dr_reset.set_high();

        let mut dr_en = pinout::driver::ENABLE.init();
        dr_en.set_high();
    }

    /// LEDs are active low. Green marks a running test, blue an energized motor.
    fn init_leds() -> (Pin, Pin) {
        pinout::led::RED.init().set_high();
        let mut grn = pinout::led::GRN.init();
        grn.set_high();
        let mut blu = pinout::led::BLU.init();
        blu.set_high();
        (grn, blu)
    }

    /// Gets the USART1 interrupt draining the TX queue.
    fn kick_tx() {
        rtic::pend(pac::Interrupt::USART1);
    }

    fn set_led(led: &mut Pin, lit: bool) {
        if lit {
            led.set_low();
        } else {
            led.set_high();
        }
    }

    // Replies go through the TX queue, so idle never holds a lock while a line
    // is transmitted.
    #[idle(shared = [sense_raw], local = [lab, line, rx_cons, tx_prod, test_led, drive_led])]
    fn idle(mut cx: idle::Context) -> ! {
        let lab = cx.local.lab;
        let tx = cx.local.tx_prod;
        loop {
            let now_ms = NOW_MS.load(Ordering::Relaxed);

            while let Some(byte) = cx.local.rx_cons.dequeue() {
                let Some(line) = cx.local.line.push(byte) else {
                    continue;
                };
                let mut out = QueuedWriter::new(tx, kick_tx);
                let written = match line {
                    Ok(text) => lab.handle_line(text, now_ms, &mut out),
                    Err(err) => writeln!(out, "{}", err),
                };
                if written.is_err() {
                    defmt::warn!("SERIAL: reply dropped");
                }
            }

            let electrical = cx
                .shared
                .sense_raw
                .lock(|raw| raw.map(|raw| SENSE_SCALE.reading(raw)));
            let inputs = LabInputs {
                position: DECODER.read_position(),
                electrical,
            };
            let mut out = QueuedWriter::new(tx, kick_tx);
            if lab.poll(now_ms, inputs, &mut out).is_err() {
                defmt::warn!("SERIAL: telemetry dropped");
            }

            set_led(cx.local.test_led, lab.sequencer_state().is_active());
            set_led(cx.local.drive_led, lab.drive().command() != 0);
        }
    }

    #[task(binds = EXTI0, shared = [encoder], priority = 4)]
    fn encoder_a(mut cx: encoder_a::Context) {
        cx.shared.encoder.lock(|enc| enc.on_a(&DECODER));
    }

    #[task(binds = EXTI1, shared = [encoder], priority = 4)]
    fn encoder_b(mut cx: encoder_b::Context) {
        cx.shared.encoder.lock(|enc| enc.on_b(&DECODER));
    }

    // Above every lock taken by idle or the serial path, so no millisecond is lost
    #[task(binds = TIM3, local = [tick, sense], priority = 3)]
    fn tick_elapsed(cx: tick_elapsed::Context) {
        cx.local.tick.clear_interrupt(TimerInterrupt::Update);
        NOW_MS.fetch_add(1, Ordering::Relaxed);

        // The buffer is only read back in adc_end_read, after the transfer completes
        unsafe {
            cx.local
                .sense
                .start(&mut *core::ptr::addr_of_mut!(ADC_READ_BUF))
        };
    }

    #[task(binds = DMA1_CH1, shared = [sense_raw], local = [dma1], priority = 2)]
    fn adc_end_read(mut cx: adc_end_read::Context) {
        dma::clear_interrupt(
            DmaPeriph::Dma1,
            DmaChannel::C1,
            DmaInterrupt::TransferComplete,
        );
        cx.local.dma1.stop(DmaChannel::C1);

        let raw = unsafe { core::ptr::addr_of!(ADC_READ_BUF).read_volatile() };
        cx.shared.sense_raw.lock(|sense_raw| *sense_raw = Some(raw));
    }

    #[task(binds = USART1, local = [serial, rx_prod, tx_cons], priority = 2)]
    fn serial_io(cx: serial_io::Context) {
        let serial = cx.local.serial;
        if let Some(byte) = serial.read_byte() {
            if cx.local.rx_prod.enqueue(byte).is_err() {
                defmt::warn!("SERIAL: rx queue full, byte dropped");
            }
        }
        serial.pump_tx(cx.local.tx_cons);
    }
}

#[defmt::panic_handler]
fn panic() -> ! {
    cortex_m::asm::udf()
}
