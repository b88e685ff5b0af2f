//! One-line confirmations sent back for accepted commands.

use core::fmt;

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Response {
    Stopped,
    PidSet { kp: f32, ki: f32, kd: f32 },
    SpeedSet { rpm: f32 },
    PidControlStarted,
    PidControlStopped,
    Speed { rpm: f32 },
    PidData { speed: f32, error: f32, output: i16 },
    Ready,
    Encoder { position: i32, rpm: f32, timestamp_ms: u32 },
    EncoderCalibrated,
    Disconnected,
    MotorSet { pwm: i16 },
    SystemInfo {
        counts_per_rev: u32,
        speed_window_ms: u32,
        control_period_ms: u32,
        firmware: &'static str,
    },
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Response::Stopped => f.write_str("STOPPED"),
            Response::PidSet { kp, ki, kd } => {
                write!(f, "PID_SET_OK Kp:{:.4} Ki:{:.4} Kd:{:.4}", kp, ki, kd)
            }
            Response::SpeedSet { rpm } => write!(f, "SPEED_SET_OK Target:{:.2}", rpm),
            Response::PidControlStarted => f.write_str("PID_CONTROL_STARTED"),
            Response::PidControlStopped => f.write_str("PID_CONTROL_STOPPED"),
            Response::Speed { rpm } => write!(f, "SPEED:{:.2}", rpm),
            Response::PidData { speed, error, output } => {
                write!(f, "SPEED:{:.2},ERROR:{:.2},OUTPUT:{}", speed, error, output)
            }
            Response::Ready => f.write_str("READY"),
            Response::Encoder { position, rpm, timestamp_ms } => {
                write!(f, "ENCODER:{},{:.2},{}", position, rpm, timestamp_ms)
            }
            Response::EncoderCalibrated => f.write_str("ENCODER_CALIBRATED"),
            Response::Disconnected => f.write_str("DISCONNECTED"),
            Response::MotorSet { pwm } => write!(f, "MOTOR_OK PWM:{}", pwm),
            Response::SystemInfo {
                counts_per_rev,
                speed_window_ms,
                control_period_ms,
                firmware,
            } => write!(
                f,
                "SYSTEM_INFO CPR:{},SPEED_WINDOW_MS:{},CONTROL_PERIOD_MS:{},FIRMWARE:{}",
                counts_per_rev, speed_window_ms, control_period_ms, firmware
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shapes() {
        assert_eq!(
            Response::PidSet { kp: 1.0, ki: 0.1, kd: 0.01 }.to_string(),
            "PID_SET_OK Kp:1.0000 Ki:0.1000 Kd:0.0100"
        );
        assert_eq!(Response::SpeedSet { rpm: 150.0 }.to_string(), "SPEED_SET_OK Target:150.00");
        assert_eq!(
            Response::PidData { speed: 98.5, error: 1.5, output: 120 }.to_string(),
            "SPEED:98.50,ERROR:1.50,OUTPUT:120"
        );
        assert_eq!(
            Response::Encoder { position: -42, rpm: 0.0, timestamp_ms: 900 }.to_string(),
            "ENCODER:-42,0.00,900"
        );
        assert_eq!(Response::MotorSet { pwm: -50 }.to_string(), "MOTOR_OK PWM:-50");
    }
}
