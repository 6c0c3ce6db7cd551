//! Data publish payload
//!
//! The batch goes out as one JSON array, oldest sample first:
//!
//! ```text
//! [{"id":"VBAT","value":4.12,"time":-140},{"id":"0x28ff...","value":21.5,"time":-140},...]
//! ```
//!
//! `time` is the sample's offset in seconds before the publish instant:
//! `-(cycles - cycle - 1) * period`, where `cycles` is the number of wakes
//! the batch was accumulated over (the batch size in steady state) and
//! `cycle` the sample's age marker. The newest wake is at `0`.

use serde::ser::{SerializeSeq, Serializer};
use serde::Serialize;

use crate::error::PayloadError;
use crate::sample::Sample;

#[derive(Serialize)]
struct Record<'a> {
    id: &'a str,
    value: f32,
    time: i32,
}

struct Batch<'a> {
    samples: &'a [Sample],
    cycles: u16,
    period_secs: u32,
}

impl Serialize for Batch<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.samples.len()))?;
        for sample in self.samples {
            let label = sample.source.label();
            seq.serialize_element(&Record {
                id: label.as_str(),
                value: sample.value,
                time: relative_time(self.cycles, sample.cycle, self.period_secs),
            })?;
        }
        seq.end()
    }
}

/// Seconds before the publish instant at which a sample was taken
pub fn relative_time(cycles: u16, cycle: u16, period_secs: u32) -> i32 {
    let elapsed = (i64::from(cycles) - i64::from(cycle) - 1) * i64::from(period_secs);
    (-elapsed).clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Encode a batch into `buf`, returning the encoded length
pub fn encode_batch(
    samples: &[Sample],
    cycles: u16,
    period_secs: u32,
    buf: &mut [u8],
) -> Result<usize, PayloadError> {
    let batch = Batch {
        samples,
        cycles,
        period_secs,
    };
    Ok(serde_json_core::to_slice(&batch, buf)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PAYLOAD_CAPACITY;
    use crate::sample::SampleSource;
    use hal_abstractions::SensorId;

    #[test]
    fn test_relative_time_example() {
        // batch 15, period 10 s, recorded at cycle 3: 11 periods before publish
        assert_eq!(relative_time(15, 3, 10), -110);
    }

    #[test]
    fn test_relative_time_newest_and_oldest() {
        assert_eq!(relative_time(15, 14, 10), 0);
        assert_eq!(relative_time(15, 0, 10), -140);
        assert_eq!(relative_time(1, 0, 600), 0);
    }

    #[test]
    fn test_encode_batch() {
        let id = SensorId::new([0x28, 0xaa, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05]);
        let samples = [
            Sample {
                source: SampleSource::Battery,
                value: 4.25,
                cycle: 0,
            },
            Sample {
                source: SampleSource::Sensor(id),
                value: 21.5,
                cycle: 0,
            },
            Sample {
                source: SampleSource::Battery,
                value: 4.125,
                cycle: 1,
            },
        ];
        let mut buf = [0u8; 256];
        let len = encode_batch(&samples, 2, 30, &mut buf).unwrap();
        let json = core::str::from_utf8(&buf[..len]).unwrap();
        assert_eq!(
            json,
            "[{\"id\":\"VBAT\",\"value\":4.25,\"time\":-30},\
             {\"id\":\"0x28aa000102030405\",\"value\":21.5,\"time\":-30},\
             {\"id\":\"VBAT\",\"value\":4.125,\"time\":0}]"
        );
    }

    #[test]
    fn test_encode_empty_batch() {
        let mut buf = [0u8; 8];
        let len = encode_batch(&[], 0, 10, &mut buf).unwrap();
        assert_eq!(&buf[..len], b"[]");
    }

    #[test]
    fn test_encode_buffer_full() {
        let samples = [Sample {
            source: SampleSource::Battery,
            value: 4.0,
            cycle: 0,
        }];
        let mut buf = [0u8; 8];
        assert_eq!(
            encode_batch(&samples, 1, 10, &mut buf),
            Err(PayloadError::BufferFull)
        );
    }

    #[test]
    fn test_worst_case_batch_fits_payload_buffer() {
        let id = SensorId::new([0xff; 8]);
        let sample = Sample {
            source: SampleSource::Sensor(id),
            value: -1.234_567_8e-12,
            cycle: 0,
        };
        let samples = [sample; crate::config::SAMPLE_CAPACITY];
        let mut buf = [0u8; PAYLOAD_CAPACITY];
        assert!(encode_batch(&samples, 15, crate::config::MAX_SLEEP_PERIOD_SECS, &mut buf).is_ok());
    }
}
