//! Measurement records
//!
//! Each sub-record payload (start byte removed) carries one capture from the
//! sensor: a fixed header with timestamp, temperature, orientation, three
//! angles and acceleration statistics, followed by fields that depend on what
//! triggered the capture. The trigger is a 2-bit event type; [`Event`] models
//! each layout as its own variant.

mod decode;
mod encode;
pub mod tables;
mod tail;

pub use decode::decode_record;
#[cfg(feature = "alloc")]
pub use decode::decode_record_hex;
pub use encode::encode_record;
pub use tables::{Averaging, Cadence, EventType, Range, TriggerAngle, VerticalAxis};
pub use tail::{RecordTail, TAIL_LEN};

use bitflags::bitflags;
use core::fmt;

/// Byte offsets into a sub-record payload
pub mod offsets {
    /// Capture timestamp, u32 seconds since the epoch
    pub const TIMESTAMP: usize = 0;
    /// Temperature (12 bits) packed with the vertical axis (3 bits)
    pub const TEMPERATURE: usize = 4;
    /// First of the three i32 angles
    pub const ALPHA: usize = 6;
    /// Acceleration peak, i16
    pub const ACC_PEAK: usize = 18;
    /// Acceleration RMS, i16
    pub const ACC_RMS: usize = 20;
    /// Event type (bits 6-7) and the first variant bits
    pub const EVENT: usize = 22;
    /// Second variant byte
    pub const EVENT_EXT: usize = 23;
    /// Axis-triggered acceleration threshold, u16
    pub const AXIS_THRESHOLD: usize = 23;
    /// First of the six angle-triggered thresholds, i16 each
    pub const ANGLE_THRESHOLDS: usize = 24;
    /// Angle-triggered first cadence (high nibble)
    pub const FIRST_CADENCE: usize = 36;
    /// Velocity-triggered angular velocity threshold, u24
    pub const VELOCITY_THRESHOLD: usize = 24;
}

bitflags! {
    /// Angles enabled for triggering
    ///
    /// Bit positions match the event byte of the record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AngleEnable: u8 {
        /// alpha1 is monitored
        const ALPHA1 = 1 << 3;
        /// alpha2 is monitored
        const ALPHA2 = 1 << 2;
        /// alpha3 is monitored
        const ALPHA3 = 1 << 1;
    }
}

/// Accelerometer settings in use for the capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sampling {
    /// Samples averaged per measurement
    pub averaging: Averaging,
    /// Full scale
    pub range: Range,
}

impl Sampling {
    /// Decode from a packed byte: averaging in bits 2-4, range in bits 0-1
    pub fn from_byte(byte: u8) -> crate::Result<Self> {
        Ok(Self {
            averaging: Averaging::from_index((byte >> 2) & 0b111)?,
            range: Range::from_index(byte & 0b11)?,
        })
    }

    /// Pack into a byte, inverse of [`Sampling::from_byte`]
    pub fn to_byte(self) -> u8 {
        (self.averaging.index() << 2) | self.range.index()
    }
}

/// Low/high threshold pair of one angle, in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AngleThreshold {
    /// Lower bound
    pub low: f64,
    /// Upper bound
    pub high: f64,
}

/// Trigger-specific part of a record
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    /// Periodic capture
    Cadence {
        /// Capture interval
        cadence: Cadence,
        /// Accelerometer settings
        sampling: Sampling,
    },
    /// Capture triggered by acceleration
    AxisTriggered {
        /// Accelerometer settings
        sampling: Sampling,
        /// Acceleration threshold in g
        threshold: f64,
    },
    /// Capture triggered by an angle leaving its window
    AngleTriggered {
        /// Angle that fired
        trigger: TriggerAngle,
        /// Angles being monitored
        enabled: AngleEnable,
        /// Accelerometer settings
        sampling: Sampling,
        /// Windows for alpha1, alpha2 and alpha3
        thresholds: [AngleThreshold; 3],
        /// Interval of the first capture after triggering
        first_cadence: Cadence,
    },
    /// Capture triggered by angular velocity
    VelocityTriggered {
        /// Angle that fired
        trigger: TriggerAngle,
        /// Angles being monitored
        enabled: AngleEnable,
        /// Accelerometer settings
        sampling: Sampling,
        /// Angular velocity threshold
        threshold: f64,
    },
}

impl Event {
    /// The 2-bit event type of this variant
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Cadence { .. } => EventType::Cadence,
            Self::AxisTriggered { .. } => EventType::AxisTriggered,
            Self::AngleTriggered { .. } => EventType::AngleTriggered,
            Self::VelocityTriggered { .. } => EventType::VelocityTriggered,
        }
    }

    /// Accelerometer settings, common to every variant
    pub fn sampling(&self) -> Sampling {
        match self {
            Self::Cadence { sampling, .. }
            | Self::AxisTriggered { sampling, .. }
            | Self::AngleTriggered { sampling, .. }
            | Self::VelocityTriggered { sampling, .. } => *sampling,
        }
    }

    /// Bytes of payload the firmware fills for this variant
    pub fn payload_len(&self) -> usize {
        match self {
            Self::Cadence { .. } => 24,
            Self::AxisTriggered { .. } => 25,
            Self::AngleTriggered { .. } => 37,
            Self::VelocityTriggered { .. } => 27,
        }
    }
}

/// A decoded measurement record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Record {
    /// Capture time, seconds since the Unix epoch
    pub timestamp: u32,
    /// Temperature in degrees Celsius
    pub temperature: f64,
    /// Axis pointing up
    pub vertical_axis: VerticalAxis,
    /// alpha1, alpha2 and alpha3 in degrees
    pub alpha: [f64; 3],
    /// Acceleration peak in g
    pub acc_peak: f64,
    /// Acceleration RMS in g
    pub acc_rms: f64,
    /// Trigger-specific fields
    pub event: Event,
}

impl Record {
    /// Capture time as a timestamp
    #[cfg(feature = "std")]
    pub fn captured_at(&self) -> jiff::Timestamp {
        jiff::Timestamp::from_second(i64::from(self.timestamp)).unwrap_or(jiff::Timestamp::UNIX_EPOCH)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        #[cfg(feature = "std")]
        writeln!(f, "time:          {}", self.captured_at())?;
        #[cfg(not(feature = "std"))]
        writeln!(f, "time:          {}", self.timestamp)?;
        writeln!(f, "temperature:   {:.2}", self.temperature)?;
        writeln!(f, "vertical axis: {}", self.vertical_axis)?;
        for (i, alpha) in self.alpha.iter().enumerate() {
            writeln!(f, "alpha{}:        {:.7}", i + 1, alpha)?;
        }
        writeln!(f, "acc peak:      {:.3}", self.acc_peak)?;
        writeln!(f, "acc rms:       {:.3}", self.acc_rms)?;
        writeln!(f, "event:         {}", self.event.event_type())?;

        let sampling = self.event.sampling();
        writeln!(f, "avg samples:   {}", sampling.averaging)?;
        write!(f, "range:         {}", sampling.range)?;

        match &self.event {
            Event::Cadence { cadence, .. } => {
                write!(f, "\ncadence:       {}", cadence)?;
            }
            Event::AxisTriggered { threshold, .. } => {
                write!(f, "\nacc threshold: {:.3}", threshold)?;
            }
            Event::AngleTriggered {
                trigger,
                enabled,
                thresholds,
                first_cadence,
                ..
            } => {
                write!(f, "\ntrigger angle: {}", trigger)?;
                write!(f, "\nenabled:       {:?}", enabled)?;
                for (i, th) in thresholds.iter().enumerate() {
                    write!(f, "\nalpha{} window: {:.1} .. {:.1}", i + 1, th.low, th.high)?;
                }
                write!(f, "\nfirst cadence: {}", first_cadence)?;
            }
            Event::VelocityTriggered {
                trigger,
                enabled,
                threshold,
                ..
            } => {
                write!(f, "\ntrigger angle: {}", trigger)?;
                write!(f, "\nenabled:       {:?}", enabled)?;
                write!(f, "\nvel threshold: {:.6}", threshold)?;
            }
        }
        Ok(())
    }
}
