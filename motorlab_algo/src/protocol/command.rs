//! Parsed command line. Verbs are case-sensitive; arguments are separated by
//! commas and/or whitespace and any extra trailing arguments are ignored.
//!
//! The open-loop drive verb carries its argument inline: `MOTOR_FORWARD_200`,
//! `MOTOR_REVERSE_050`, `MOTOR_STOP_000`. A separated argument is accepted too.

use super::{Field, ProtocolError};
use crate::config::PWM_MAX;

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    StartCoastDown,
    StartSteadyState { pwm: i16, duration_ms: u32 },
    StartBackEmf { pwm: i16, duration_ms: u32 },
    Stop,
    SetPid { kp: f32, ki: f32, kd: f32 },
    SetSpeed { rpm: f32 },
    StartPidControl,
    StopPidControl,
    GetSpeed,
    GetPidData,
    Handshake,
    ReadEncoder,
    CalibrateEncoder,
    Disconnect,
    /// Open-loop signed command; zero releases the motor
    Motor { pwm: i16 },
    SystemInfo,
}

impl Command {
    /// Parses one line without its terminator. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, ProtocolError> {
        let mut tokens = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty());

        let verb = match tokens.next() {
            Some(verb) => verb,
            None => return Ok(None),
        };

        let command = match verb {
            "START_COAST_DOWN" => Command::StartCoastDown,
            "START_STEADY_STATE" => {
                let (pwm, duration_ms) = pwm_and_duration(&mut tokens)?;
                Command::StartSteadyState { pwm, duration_ms }
            }
            "START_BACK_EMF" => {
                let (pwm, duration_ms) = pwm_and_duration(&mut tokens)?;
                Command::StartBackEmf { pwm, duration_ms }
            }
            "STOP" | "STOP_TEST" => Command::Stop,
            "SET_PID" => Command::SetPid {
                kp: float(tokens.next(), Field::Kp)?,
                ki: float(tokens.next(), Field::Ki)?,
                kd: float(tokens.next(), Field::Kd)?,
            },
            "SET_SPEED" => Command::SetSpeed {
                rpm: float(tokens.next(), Field::Speed)?,
            },
            "START_PID_CONTROL" => Command::StartPidControl,
            "STOP_PID_CONTROL" => Command::StopPidControl,
            "GET_SPEED" => Command::GetSpeed,
            "GET_PID_DATA" => Command::GetPidData,
            "HANDSHAKE" => Command::Handshake,
            "READ_ENCODER" => Command::ReadEncoder,
            "CALIBRATE_ENCODER" => Command::CalibrateEncoder,
            "DISCONNECT" => Command::Disconnect,
            "SYSTEM_INFO" => Command::SystemInfo,
            _ => match verb.strip_prefix("MOTOR_") {
                Some(rest) => motor(rest, &mut tokens)?,
                None => return Err(ProtocolError::UnknownCommand),
            },
        };
        Ok(Some(command))
    }
}

fn motor<'a>(rest: &'a str, tokens: &mut impl Iterator<Item = &'a str>) -> Result<Command, ProtocolError> {
    let (direction, value) = match rest.split_once('_') {
        Some((direction, value)) => (direction, Some(value)),
        None => (rest, tokens.next()),
    };
    let sign = match direction {
        "FORWARD" => 1,
        "REVERSE" => -1,
        "STOP" => return Ok(Command::Motor { pwm: 0 }),
        _ => return Err(ProtocolError::UnknownCommand),
    };
    Ok(Command::Motor { pwm: sign * pwm(value)? })
}

fn pwm(token: Option<&str>) -> Result<i16, ProtocolError> {
    let pwm: i32 = token
        .and_then(|t| t.parse().ok())
        .ok_or(ProtocolError::InvalidFormat(Field::Pwm))?;
    if !(0..=PWM_MAX as i32).contains(&pwm) {
        return Err(ProtocolError::PwmOutOfRange);
    }
    Ok(pwm as i16)
}

fn pwm_and_duration<'a>(
    tokens: &mut impl Iterator<Item = &'a str>,
) -> Result<(i16, u32), ProtocolError> {
    let pwm = pwm(tokens.next())?;

    // Seconds on the wire, milliseconds internally
    let duration_ms = tokens
        .next()
        .and_then(|t| t.parse::<u32>().ok())
        .filter(|&s| s > 0)
        .and_then(|s| s.checked_mul(1000))
        .ok_or(ProtocolError::InvalidFormat(Field::Duration))?;

    Ok((pwm, duration_ms))
}

fn float(token: Option<&str>, field: Field) -> Result<f32, ProtocolError> {
    token
        .and_then(|t| t.parse::<f32>().ok())
        .filter(|v| v.is_finite())
        .ok_or(ProtocolError::InvalidFormat(field))
}
