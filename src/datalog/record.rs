//! Log record types and the line format written to the medium.
//!
//! One record per line, comma separated, newline terminated:
//!
//! ```text
//! <tick>,BOOT,v<version>
//! <tick>,SAMPLE,<raw>,<level_mm>
//! <tick>,PUMP_START,<level_mm>
//! <tick>,PUMP_STOP,<level_mm>,<reason>
//! <tick>,FAULT,<code>,<streak>
//! ```
//!
//! Levels carry one decimal place. Lines are encoded into a fixed-size
//! stack buffer so the logger never allocates.

use core::fmt::{self, Write};

use crate::clock::Tick;
use crate::drivers::pump::StopReason;

/// Longest encoded line, newline included.
pub const MAX_LINE_LEN: usize = 128;

pub type Line = heapless::String<MAX_LINE_LEN>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Boot,
    Sample,
    PumpStart,
    PumpStop,
    Fault,
}

impl RecordKind {
    /// Safety-relevant records are flushed immediately and never shed.
    pub fn is_critical(&self) -> bool {
        !matches!(self, Self::Sample)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Boot => "BOOT",
            Self::Sample => "SAMPLE",
            Self::PumpStart => "PUMP_START",
            Self::PumpStop => "PUMP_STOP",
            Self::Fault => "FAULT",
        }
    }
}

/// What a `FAULT` record reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCode {
    SensorOutOfRange,
    SensorStale,
    /// A pump start was refused for a reason other than cooldown.
    PumpRejected,
    DriveFault,
    LogDegraded,
    LockoutSensor,
    LockoutPump,
}

impl FaultCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SensorOutOfRange => "SENSOR_OUT_OF_RANGE",
            Self::SensorStale => "SENSOR_STALE",
            Self::PumpRejected => "PUMP_REJECTED",
            Self::DriveFault => "DRIVE_FAULT",
            Self::LogDegraded => "LOG_DEGRADED",
            Self::LockoutSensor => "LOCKOUT_SENSOR_FAILURE",
            Self::LockoutPump => "LOCKOUT_PUMP_STUCK",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "SENSOR_OUT_OF_RANGE" => Self::SensorOutOfRange,
            "SENSOR_STALE" => Self::SensorStale,
            "PUMP_REJECTED" => Self::PumpRejected,
            "DRIVE_FAULT" => Self::DriveFault,
            "LOG_DEGRADED" => Self::LogDegraded,
            "LOCKOUT_SENSOR_FAILURE" => Self::LockoutSensor,
            "LOCKOUT_PUMP_STUCK" => Self::LockoutPump,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecordPayload {
    Boot,
    Sample { raw: u16, level_mm: f32 },
    PumpStart { level_mm: f32 },
    PumpStop { level_mm: f32, reason: StopReason },
    Fault { code: FaultCode, streak: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogRecord {
    pub timestamp: Tick,
    pub payload: RecordPayload,
}

/// Why a line could not be read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    Empty,
    BadTimestamp,
    UnknownKind,
    /// A field is missing, extra, or not a number / known code.
    BadField,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty line"),
            Self::BadTimestamp => write!(f, "bad timestamp"),
            Self::UnknownKind => write!(f, "unknown record kind"),
            Self::BadField => write!(f, "bad field"),
        }
    }
}

impl std::error::Error for ParseError {}

impl LogRecord {
    pub fn new(timestamp: Tick, payload: RecordPayload) -> Self {
        Self { timestamp, payload }
    }

    pub fn kind(&self) -> RecordKind {
        match self.payload {
            RecordPayload::Boot => RecordKind::Boot,
            RecordPayload::Sample { .. } => RecordKind::Sample,
            RecordPayload::PumpStart { .. } => RecordKind::PumpStart,
            RecordPayload::PumpStop { .. } => RecordKind::PumpStop,
            RecordPayload::Fault { .. } => RecordKind::Fault,
        }
    }

    /// Records that explain why the pump stopped for good: the lockout
    /// fault and its stop, or the stop forced by shutdown. A session
    /// produces at most two, and they may use the logger's reserve.
    pub fn is_essential(&self) -> bool {
        match self.payload {
            RecordPayload::PumpStop { reason, .. } => {
                matches!(reason, StopReason::Lockout | StopReason::Shutdown)
            }
            RecordPayload::Fault { code, .. } => {
                matches!(code, FaultCode::LockoutSensor | FaultCode::LockoutPump)
            }
            _ => false,
        }
    }

    /// Encode as one newline-terminated line.
    pub fn encode_line(&self) -> Result<Line, fmt::Error> {
        let mut line = Line::new();
        write!(line, "{},{}", self.timestamp, self.kind().as_str())?;
        match self.payload {
            RecordPayload::Boot => write!(line, ",v{}", env!("CARGO_PKG_VERSION"))?,
            RecordPayload::Sample { raw, level_mm } => write!(line, ",{},{:.1}", raw, level_mm)?,
            RecordPayload::PumpStart { level_mm } => write!(line, ",{:.1}", level_mm)?,
            RecordPayload::PumpStop { level_mm, reason } => {
                write!(line, ",{:.1},{}", level_mm, reason.as_str())?
            }
            RecordPayload::Fault { code, streak } => {
                write!(line, ",{},{}", code.as_str(), streak)?
            }
        }
        line.push('\n').map_err(|_| fmt::Error)?;
        Ok(line)
    }

    /// Parse one line as written by [`encode_line`](Self::encode_line).
    /// The trailing newline is optional; the boot version is not checked.
    pub fn parse_line(line: &str) -> Result<Self, ParseError> {
        let line = line.trim_end_matches(['\n', '\r']);
        if line.is_empty() {
            return Err(ParseError::Empty);
        }

        let mut fields = line.split(',');
        let timestamp = fields
            .next()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Tick)
            .ok_or(ParseError::BadTimestamp)?;
        let kind = fields.next().ok_or(ParseError::UnknownKind)?;

        let payload = match kind {
            "BOOT" => {
                let version = fields.next().ok_or(ParseError::BadField)?;
                if !version.starts_with('v') {
                    return Err(ParseError::BadField);
                }
                RecordPayload::Boot
            }
            "SAMPLE" => RecordPayload::Sample {
                raw: number(fields.next())?,
                level_mm: level(fields.next())?,
            },
            "PUMP_START" => RecordPayload::PumpStart {
                level_mm: level(fields.next())?,
            },
            "PUMP_STOP" => RecordPayload::PumpStop {
                level_mm: level(fields.next())?,
                reason: fields
                    .next()
                    .and_then(StopReason::parse)
                    .ok_or(ParseError::BadField)?,
            },
            "FAULT" => RecordPayload::Fault {
                code: fields
                    .next()
                    .and_then(FaultCode::parse)
                    .ok_or(ParseError::BadField)?,
                streak: number(fields.next())?,
            },
            _ => return Err(ParseError::UnknownKind),
        };

        if fields.next().is_some() {
            return Err(ParseError::BadField);
        }
        Ok(Self { timestamp, payload })
    }
}

fn number<T: core::str::FromStr>(field: Option<&str>) -> Result<T, ParseError> {
    field
        .and_then(|s| s.parse().ok())
        .ok_or(ParseError::BadField)
}

fn level(field: Option<&str>) -> Result<f32, ParseError> {
    let v: f32 = number(field)?;
    if v.is_finite() {
        Ok(v)
    } else {
        Err(ParseError::BadField)
    }
}
