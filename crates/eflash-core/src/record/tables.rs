//! Lookup tables and fixed-point scales used by the record format
//!
//! Every enumerated field of a record is stored as a small index into one of
//! these tables. An index past the end of its table is a decode error: either
//! the data is corrupt or the firmware writes a newer format.

use core::fmt;

use crate::error::{Error, Result};

macro_rules! lookup_table {
    (
        $(#[$meta:meta])*
        $name:ident, $table:literal {
            $( $variant:ident => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum $name {
            $( #[doc = $label] $variant ),+
        }

        impl $name {
            /// All entries, in encoding order
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Table name used in error reports
            pub const TABLE: &'static str = $table;

            /// Look up an entry by its encoded index
            pub fn from_index(index: u8) -> Result<Self> {
                Self::ALL
                    .get(index as usize)
                    .copied()
                    .ok_or(Error::InvalidEnumIndex {
                        table: Self::TABLE,
                        index,
                    })
            }

            /// Encoded index of this entry
            pub fn index(self) -> u8 {
                self as u8
            }

            /// Human-readable label
            pub fn label(self) -> &'static str {
                match self {
                    $( Self::$variant => $label ),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}

lookup_table! {
    /// Axis of the sensor that points up
    VerticalAxis, "vertical axis" {
        PosX => "+X",
        NegX => "-X",
        PosY => "+Y",
        NegY => "-Y",
        PosZ => "+Z",
        NegZ => "-Z",
    }
}

lookup_table! {
    /// What caused a record to be captured
    EventType, "event type" {
        Cadence => "OnCadence",
        AxisTriggered => "OnAxeTrig",
        AngleTriggered => "OnAngTrig",
        VelocityTriggered => "OnVelTrig",
    }
}

lookup_table! {
    /// Capture interval
    Cadence, "cadence" {
        S30 => "30s",
        M1 => "1m",
        M1S30 => "1m30s",
        M2 => "2m",
        M3 => "3m",
        M4 => "4m",
        M5 => "5m",
        M10 => "10m",
        M15 => "15m",
        M20 => "20m",
        M30 => "30m",
        H1 => "1h",
        H2 => "2h",
        H6 => "6h",
        H12 => "12h",
        H24 => "24h",
    }
}

impl Cadence {
    /// Interval length in seconds
    pub fn seconds(self) -> u32 {
        const SECONDS: [u32; 16] = [
            30, 60, 90, 120, 180, 240, 300, 600, 900, 1200, 1800, 3600, 7200, 21600, 43200, 86400,
        ];
        SECONDS[self as usize]
    }
}

lookup_table! {
    /// Number of accelerometer samples averaged per measurement
    Averaging, "averaging" {
        Samples125 => "125",
        Samples250 => "250",
        Samples500 => "500",
        Samples1000 => "1000",
        Samples2000 => "2000",
    }
}

impl Averaging {
    /// Sample count
    pub fn samples(self) -> u16 {
        125 << (self as u16)
    }
}

lookup_table! {
    /// Accelerometer full scale
    Range, "range" {
        G2 => "2g",
        G4 => "4g",
        G8 => "8g",
    }
}

impl Range {
    /// Full scale in g
    pub fn g(self) -> u8 {
        2 << (self as u8)
    }
}

lookup_table! {
    /// Angle whose threshold crossing triggers a capture
    TriggerAngle, "triggered angle" {
        Alpha1 => "alpha1",
        Alpha2 => "alpha2",
        Alpha3 => "alpha3",
    }
}

/// Fixed-point scale of a numeric field
///
/// The physical value is `raw * resolution - offset`, rounded to `decimals`
/// decimal figures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    /// Value of one raw step
    pub resolution: f64,
    /// Subtracted after scaling
    pub offset: f64,
    /// Decimal figures kept after rounding
    pub decimals: usize,
}

/// Acceleration peak, RMS and axis threshold (g)
pub const ACCELERATION: Scale = Scale {
    resolution: 0.125,
    offset: 0.0,
    decimals: 3,
};

/// Angular velocity threshold
pub const ANGULAR_VELOCITY: Scale = Scale {
    resolution: 1e-6,
    offset: 0.0,
    decimals: 6,
};

/// 32-bit angle measurements (degrees)
pub const ANGLE32: Scale = Scale {
    resolution: 1e-7,
    offset: 0.0,
    decimals: 7,
};

/// 16-bit angle thresholds (degrees)
pub const ANGLE16: Scale = Scale {
    resolution: 0.1,
    offset: 0.0,
    decimals: 1,
};

/// Temperature (degrees Celsius)
pub const TEMPERATURE: Scale = Scale {
    resolution: 0.05,
    offset: 50.0,
    decimals: 2,
};

const POWERS_OF_TEN: [f64; 8] = [1.0, 1e1, 1e2, 1e3, 1e4, 1e5, 1e6, 1e7];

/// Round half away from zero without `f64::round` (not available in core)
fn round_half_away(x: f64) -> i64 {
    if x >= 0.0 {
        (x + 0.5) as i64
    } else {
        (x - 0.5) as i64
    }
}

impl Scale {
    /// Convert a raw field value to its physical value
    pub fn apply(&self, raw: i64) -> f64 {
        let value = raw as f64 * self.resolution - self.offset;
        let p = POWERS_OF_TEN[self.decimals];
        round_half_away(value * p) as f64 / p
    }

    /// Convert a physical value back to the nearest raw field value
    pub fn raw(&self, value: f64) -> i64 {
        round_half_away((value + self.offset) / self.resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_table_sizes() {
        assert_eq!(VerticalAxis::ALL.len(), 6);
        assert_eq!(EventType::ALL.len(), 4);
        assert_eq!(Cadence::ALL.len(), 16);
        assert_eq!(Averaging::ALL.len(), 5);
        assert_eq!(Range::ALL.len(), 3);
        assert_eq!(TriggerAngle::ALL.len(), 3);
    }

    #[test]
    fn test_lookup() {
        assert_eq!(Cadence::from_index(0).unwrap().label(), "30s");
        assert_eq!(Cadence::from_index(15).unwrap().label(), "24h");
        assert_eq!(Cadence::H6.seconds(), 6 * 3600);
        assert_eq!(Averaging::from_index(4).unwrap().samples(), 2000);
        assert_eq!(Averaging::Samples500.samples(), 500);
        assert_eq!(Range::from_index(2).unwrap().g(), 8);
        assert_eq!(VerticalAxis::from_index(5).unwrap().to_string(), "-Z");
    }

    #[test]
    fn test_out_of_range_index() {
        assert_eq!(
            Averaging::from_index(5),
            Err(Error::InvalidEnumIndex {
                table: "averaging",
                index: 5
            })
        );
        assert!(Range::from_index(3).is_err());
        assert!(TriggerAngle::from_index(3).is_err());
        assert!(VerticalAxis::from_index(6).is_err());
    }

    #[test]
    fn test_scale() {
        assert_eq!(TEMPERATURE.apply(1000), 0.0);
        assert_eq!(TEMPERATURE.apply(1500), 25.0);
        assert_eq!(TEMPERATURE.raw(25.0), 1500);
        assert_eq!(ACCELERATION.apply(-9), -1.125);
        assert_eq!(ANGLE16.apply(-455), -45.5);
        assert_eq!(ANGLE32.apply(123_456_789), 12.3456789);
        assert_eq!(ANGLE32.raw(-12.3456789), -123_456_789);
    }
}
