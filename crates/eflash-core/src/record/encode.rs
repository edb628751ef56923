//! Record encoding
//!
//! Writes a [`Record`] into the on-flash payload layout. The sensor firmware is
//! the only real producer of records; this exists to build synthetic pages for
//! the emulator and to check the decoder against known values.

use super::offsets::*;
use super::tables;
use super::tail::{TAIL_LEN, TAIL_OFFSET};
use super::{Event, Record};
use crate::page::RECORD_PAYLOAD_LEN;

fn put(pl: &mut [u8], at: usize, bytes: &[u8]) {
    pl[at..at + bytes.len()].copy_from_slice(bytes);
}

/// Encode a record into a sub-record payload (start byte not included)
///
/// Bytes the layout does not use are left erased (`0xFF`). The tail carries
/// the filled length (start byte included) and a copy of the timestamp.
/// Values outside a field's range wrap.
pub fn encode_record(record: &Record) -> [u8; RECORD_PAYLOAD_LEN] {
    let mut pl = [0xFFu8; RECORD_PAYLOAD_LEN];

    put(&mut pl, TIMESTAMP, &record.timestamp.to_le_bytes());

    let temperature = tables::TEMPERATURE.raw(record.temperature) as u16 & 0x0FFF;
    let packed = temperature | (u16::from(record.vertical_axis.index()) << 12);
    put(&mut pl, TEMPERATURE, &packed.to_le_bytes());

    for (i, alpha) in record.alpha.iter().enumerate() {
        let raw = tables::ANGLE32.raw(*alpha) as i32;
        put(&mut pl, ALPHA + 4 * i, &raw.to_le_bytes());
    }

    put(&mut pl, ACC_PEAK, &(tables::ACCELERATION.raw(record.acc_peak) as i16).to_le_bytes());
    put(&mut pl, ACC_RMS, &(tables::ACCELERATION.raw(record.acc_rms) as i16).to_le_bytes());

    let event_type = record.event.event_type().index() << 6;
    match &record.event {
        Event::Cadence { cadence, sampling } => {
            pl[EVENT] = event_type | (cadence.index() << 2);
            pl[EVENT_EXT] = sampling.to_byte();
        }
        Event::AxisTriggered { sampling, threshold } => {
            pl[EVENT] = event_type | sampling.to_byte();
            let raw = tables::ACCELERATION.raw(*threshold) as u16;
            put(&mut pl, AXIS_THRESHOLD, &raw.to_le_bytes());
        }
        Event::AngleTriggered {
            trigger,
            enabled,
            sampling,
            thresholds,
            first_cadence,
        } => {
            pl[EVENT] = event_type | (trigger.index() << 4) | enabled.bits();
            pl[EVENT_EXT] = sampling.to_byte();
            for (i, th) in thresholds.iter().enumerate() {
                let low = tables::ANGLE16.raw(th.low) as i16;
                let high = tables::ANGLE16.raw(th.high) as i16;
                put(&mut pl, ANGLE_THRESHOLDS + 4 * i, &low.to_le_bytes());
                put(&mut pl, ANGLE_THRESHOLDS + 4 * i + 2, &high.to_le_bytes());
            }
            pl[FIRST_CADENCE] = (first_cadence.index() << 4) | 0x0F;
        }
        Event::VelocityTriggered {
            trigger,
            enabled,
            sampling,
            threshold,
        } => {
            pl[EVENT] = event_type | (trigger.index() << 4) | enabled.bits();
            pl[EVENT_EXT] = sampling.to_byte();
            let raw = tables::ANGULAR_VELOCITY.raw(*threshold) as u32;
            put(&mut pl, VELOCITY_THRESHOLD, &raw.to_le_bytes()[..3]);
        }
    }

    let mut tail = [0xFFu8; TAIL_LEN];
    tail[0] = (record.event.payload_len() + 1) as u8;
    tail[1..5].copy_from_slice(&record.timestamp.to_be_bytes());
    put(&mut pl, TAIL_OFFSET, &tail);

    pl
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tables::{Averaging, Cadence, Range, TriggerAngle, VerticalAxis};
    use crate::record::{decode_record, AngleEnable, AngleThreshold, Sampling};
    use pretty_assertions::assert_eq;

    fn sampling() -> Sampling {
        Sampling {
            averaging: Averaging::Samples1000,
            range: Range::G2,
        }
    }

    fn record(event: Event) -> Record {
        Record {
            timestamp: 1_714_000_000,
            temperature: -12.35,
            vertical_axis: VerticalAxis::NegX,
            alpha: [1.5, -2.25, 0.0000007],
            acc_peak: 3.125,
            acc_rms: 0.5,
            event,
        }
    }

    #[test]
    fn test_every_variant_roundtrips() {
        let events = [
            Event::Cadence {
                cadence: Cadence::H24,
                sampling: sampling(),
            },
            Event::AxisTriggered {
                sampling: sampling(),
                threshold: 0.875,
            },
            Event::AngleTriggered {
                trigger: TriggerAngle::Alpha3,
                enabled: AngleEnable::ALPHA3,
                sampling: sampling(),
                thresholds: [
                    AngleThreshold { low: -1.5, high: 1.5 },
                    AngleThreshold { low: -90.0, high: 90.0 },
                    AngleThreshold { low: 10.1, high: 20.2 },
                ],
                first_cadence: Cadence::M1S30,
            },
            Event::VelocityTriggered {
                trigger: TriggerAngle::Alpha2,
                enabled: AngleEnable::ALPHA1 | AngleEnable::ALPHA2,
                sampling: sampling(),
                threshold: 0.000123,
            },
        ];

        for event in events {
            let rec = record(event);
            assert_eq!(decode_record(&encode_record(&rec)).unwrap(), rec);
        }
    }

    #[test]
    fn test_cadence_layout() {
        let pl = encode_record(&record(Event::Cadence {
            cadence: Cadence::S30,
            sampling: sampling(),
        }));
        assert_eq!(pl[EVENT] >> 6, 0);
        // Nothing past the cadence fields is written
        assert!(pl[24..TAIL_OFFSET].iter().all(|&b| b == 0xFF));
        assert_eq!(pl[TAIL_OFFSET], 25);
    }
}
