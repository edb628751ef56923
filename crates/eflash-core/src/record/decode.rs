//! Record decoding

use super::offsets::*;
use super::tables::{self, Cadence, EventType, TriggerAngle, VerticalAxis};
use super::{AngleEnable, AngleThreshold, Event, Record, Sampling};
use crate::error::{Error, Result};
use crate::page::RECORD_PAYLOAD_LEN;

fn u16_at(pl: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([pl[at], pl[at + 1]])
}

fn i16_at(pl: &[u8], at: usize) -> i16 {
    i16::from_le_bytes([pl[at], pl[at + 1]])
}

fn u24_at(pl: &[u8], at: usize) -> u32 {
    u32::from(pl[at]) | (u32::from(pl[at + 1]) << 8) | (u32::from(pl[at + 2]) << 16)
}

fn u32_at(pl: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([pl[at], pl[at + 1], pl[at + 2], pl[at + 3]])
}

fn i32_at(pl: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([pl[at], pl[at + 1], pl[at + 2], pl[at + 3]])
}

/// Trigger angle and enable flags share the event byte of the angle and
/// velocity layouts
fn trigger_and_enables(event: u8) -> Result<(TriggerAngle, AngleEnable)> {
    let trigger = TriggerAngle::from_index((event >> 4) & 0b11)?;
    Ok((trigger, AngleEnable::from_bits_truncate(event)))
}

/// Decode a sub-record payload (start byte already stripped)
///
/// The payload must be exactly [`RECORD_PAYLOAD_LEN`] bytes. Any lookup index
/// outside its table yields [`Error::InvalidEnumIndex`].
pub fn decode_record(pl: &[u8]) -> Result<Record> {
    if pl.len() != RECORD_PAYLOAD_LEN {
        return Err(Error::InvalidLength {
            expected: RECORD_PAYLOAD_LEN,
            actual: pl.len(),
        });
    }

    let packed = u16_at(pl, TEMPERATURE);
    let temperature = tables::TEMPERATURE.apply(i64::from(packed & 0x0FFF));
    let vertical_axis = VerticalAxis::from_index(((packed >> 12) & 0b111) as u8)?;

    let alpha = core::array::from_fn(|i| tables::ANGLE32.apply(i64::from(i32_at(pl, ALPHA + 4 * i))));

    let event_byte = pl[EVENT];
    let event = match EventType::from_index(event_byte >> 6)? {
        EventType::Cadence => Event::Cadence {
            cadence: Cadence::from_index((event_byte >> 2) & 0b1111)?,
            sampling: Sampling::from_byte(pl[EVENT_EXT])?,
        },
        EventType::AxisTriggered => Event::AxisTriggered {
            sampling: Sampling::from_byte(event_byte)?,
            threshold: tables::ACCELERATION.apply(i64::from(u16_at(pl, AXIS_THRESHOLD))),
        },
        EventType::AngleTriggered => {
            let (trigger, enabled) = trigger_and_enables(event_byte)?;
            let raw = |n: usize| tables::ANGLE16.apply(i64::from(i16_at(pl, ANGLE_THRESHOLDS + 2 * n)));
            Event::AngleTriggered {
                trigger,
                enabled,
                sampling: Sampling::from_byte(pl[EVENT_EXT])?,
                thresholds: core::array::from_fn(|i| AngleThreshold {
                    low: raw(2 * i),
                    high: raw(2 * i + 1),
                }),
                first_cadence: Cadence::from_index(pl[FIRST_CADENCE] >> 4)?,
            }
        }
        EventType::VelocityTriggered => {
            let (trigger, enabled) = trigger_and_enables(event_byte)?;
            Event::VelocityTriggered {
                trigger,
                enabled,
                sampling: Sampling::from_byte(pl[EVENT_EXT])?,
                threshold: tables::ANGULAR_VELOCITY.apply(i64::from(u24_at(pl, VELOCITY_THRESHOLD))),
            }
        }
    };

    Ok(Record {
        timestamp: u32_at(pl, TIMESTAMP),
        temperature,
        vertical_axis,
        alpha,
        acc_peak: tables::ACCELERATION.apply(i64::from(i16_at(pl, ACC_PEAK))),
        acc_rms: tables::ACCELERATION.apply(i64::from(i16_at(pl, ACC_RMS))),
        event,
    })
}

/// Decode a sub-record payload given as hex text
#[cfg(feature = "alloc")]
pub fn decode_record_hex(text: &str) -> Result<Record> {
    let payload = hex::decode(text.trim()).map_err(|_| Error::InvalidHex)?;
    decode_record(&payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::encode_record;
    use crate::record::tables::{Averaging, Range};
    use pretty_assertions::assert_eq;

    fn payload() -> [u8; RECORD_PAYLOAD_LEN] {
        [0xFF; RECORD_PAYLOAD_LEN]
    }

    /// Header of a cadence record, everything zero except the given bytes
    fn cadence_payload() -> [u8; RECORD_PAYLOAD_LEN] {
        let mut pl = payload();
        pl[..24].fill(0);
        // 1000 raw -> 0.0 degC, vertical axis +Z (index 4)
        pl[4] = 0xE8;
        pl[5] = 0x43;
        pl
    }

    #[test]
    fn test_known_vectors() {
        let rec = decode_record(&cadence_payload()).unwrap();
        assert_eq!(rec.timestamp, 0);
        assert_eq!(rec.captured_at(), jiff::Timestamp::UNIX_EPOCH);
        assert_eq!(rec.temperature, 0.0);
        assert_eq!(rec.vertical_axis, VerticalAxis::PosZ);
        assert_eq!(rec.alpha, [0.0; 3]);
    }

    #[test]
    fn test_byte_order() {
        let mut pl = cadence_payload();
        pl[0..4].copy_from_slice(&[0x78, 0x56, 0x34, 0x12]);
        // alpha1 = -1 raw, alpha2 = 90.0 degrees, alpha3 = -90.0 degrees
        pl[6..10].copy_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
        pl[10..14].copy_from_slice(&900_000_000i32.to_le_bytes());
        pl[14..18].copy_from_slice(&(-900_000_000i32).to_le_bytes());
        pl[18..20].copy_from_slice(&[0xF7, 0xFF]);
        pl[20..22].copy_from_slice(&[0x10, 0x00]);

        let rec = decode_record(&pl).unwrap();
        assert_eq!(rec.timestamp, 0x1234_5678);
        assert_eq!(rec.alpha, [-0.0000001, 90.0, -90.0]);
        assert_eq!(rec.acc_peak, -1.125);
        assert_eq!(rec.acc_rms, 2.0);
    }

    #[test]
    fn test_cadence_variant() {
        let mut pl = cadence_payload();
        // event type 0, cadence 1h (index 11)
        pl[22] = 11 << 2;
        // averaging 1000 (index 3), range 8g (index 2)
        pl[23] = (3 << 2) | 2;

        let rec = decode_record(&pl).unwrap();
        assert_eq!(
            rec.event,
            Event::Cadence {
                cadence: Cadence::H1,
                sampling: Sampling {
                    averaging: Averaging::Samples1000,
                    range: Range::G8,
                },
            }
        );
    }

    #[test]
    fn test_axis_variant() {
        let mut pl = cadence_payload();
        pl[22] = (1 << 6) | (1 << 2) | 1;
        pl[23..25].copy_from_slice(&20u16.to_le_bytes());

        let rec = decode_record(&pl).unwrap();
        assert_eq!(
            rec.event,
            Event::AxisTriggered {
                sampling: Sampling {
                    averaging: Averaging::Samples250,
                    range: Range::G4,
                },
                threshold: 2.5,
            }
        );
    }

    #[test]
    fn test_angle_variant() {
        let mut pl = cadence_payload();
        // trigger alpha2, alpha1 and alpha3 enabled
        pl[22] = (2 << 6) | (1 << 4) | 0b1010;
        pl[23] = 0;
        let thresholds: [i16; 6] = [-450, 450, -100, 100, 0, 1800];
        for (i, th) in thresholds.iter().enumerate() {
            pl[24 + 2 * i..26 + 2 * i].copy_from_slice(&th.to_le_bytes());
        }
        pl[36] = 7 << 4;

        let rec = decode_record(&pl).unwrap();
        assert_eq!(
            rec.event,
            Event::AngleTriggered {
                trigger: TriggerAngle::Alpha2,
                enabled: AngleEnable::ALPHA1 | AngleEnable::ALPHA3,
                sampling: Sampling {
                    averaging: Averaging::Samples125,
                    range: Range::G2,
                },
                thresholds: [
                    AngleThreshold { low: -45.0, high: 45.0 },
                    AngleThreshold { low: -10.0, high: 10.0 },
                    AngleThreshold { low: 0.0, high: 180.0 },
                ],
                first_cadence: Cadence::M10,
            }
        );
    }

    #[test]
    fn test_velocity_variant() {
        let mut pl = cadence_payload();
        pl[22] = (3 << 6) | 0b1110;
        pl[23] = (4 << 2) | 1;
        pl[24..27].copy_from_slice(&[0x40, 0x42, 0x0F]);

        let rec = decode_record(&pl).unwrap();
        assert_eq!(
            rec.event,
            Event::VelocityTriggered {
                trigger: TriggerAngle::Alpha1,
                enabled: AngleEnable::all(),
                sampling: Sampling {
                    averaging: Averaging::Samples2000,
                    range: Range::G4,
                },
                threshold: 1.0,
            }
        );
    }

    #[test]
    fn test_invalid_indices() {
        let mut pl = cadence_payload();
        pl[23] = 5 << 2;
        assert_eq!(
            decode_record(&pl),
            Err(Error::InvalidEnumIndex {
                table: "averaging",
                index: 5
            })
        );

        let mut pl = cadence_payload();
        pl[23] = 3;
        assert!(matches!(
            decode_record(&pl),
            Err(Error::InvalidEnumIndex { table: "range", .. })
        ));

        let mut pl = cadence_payload();
        pl[5] = 0x60;
        assert!(matches!(
            decode_record(&pl),
            Err(Error::InvalidEnumIndex {
                table: "vertical axis",
                index: 6
            })
        ));

        let mut pl = cadence_payload();
        pl[22] = (3 << 6) | (3 << 4);
        assert!(matches!(
            decode_record(&pl),
            Err(Error::InvalidEnumIndex {
                table: "triggered angle",
                ..
            })
        ));
    }

    #[test]
    fn test_wrong_length() {
        assert_eq!(
            decode_record(&[0u8; 24]),
            Err(Error::InvalidLength {
                expected: RECORD_PAYLOAD_LEN,
                actual: 24
            })
        );
    }

    #[test]
    fn test_decode_is_pure() {
        let pl = cadence_payload();
        assert_eq!(decode_record(&pl), decode_record(&pl));
    }

    #[test]
    fn test_decode_hex() {
        let pl = cadence_payload();
        let text = hex::encode(pl);
        assert_eq!(decode_record_hex(&text), decode_record(&pl));
        assert_eq!(decode_record_hex("zz"), Err(Error::InvalidHex));
    }

    #[test]
    fn test_roundtrip_precision() {
        let record = Record {
            timestamp: 1_700_000_000,
            temperature: 23.45,
            vertical_axis: VerticalAxis::NegY,
            alpha: [12.3456789, -0.0000123, 179.9999999],
            acc_peak: 1.875,
            acc_rms: -0.25,
            event: Event::VelocityTriggered {
                trigger: TriggerAngle::Alpha3,
                enabled: AngleEnable::ALPHA2,
                sampling: Sampling {
                    averaging: Averaging::Samples500,
                    range: Range::G2,
                },
                threshold: 12.345678,
            },
        };

        let decoded = decode_record(&encode_record(&record)).unwrap();
        assert_eq!(decoded.timestamp, record.timestamp);
        assert_eq!(decoded.vertical_axis, record.vertical_axis);
        assert!((decoded.temperature - record.temperature).abs() < 0.005);
        for (a, b) in decoded.alpha.iter().zip(record.alpha.iter()) {
            assert!((a - b).abs() < 0.5e-7);
        }
        assert!((decoded.acc_peak - record.acc_peak).abs() < 0.0005);
        assert!((decoded.acc_rms - record.acc_rms).abs() < 0.0005);
        match decoded.event {
            Event::VelocityTriggered { threshold, .. } => {
                assert!((threshold - 12.345678).abs() < 0.5e-6)
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
