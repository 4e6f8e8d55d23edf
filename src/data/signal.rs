// src/data/signal.rs
//! Append-only analog time series

use std::collections::{BTreeSet, TryReserveError};

use parking_lot::RwLock;

use crate::data::quantity::{format_unit, Quantity, QuantityFlag, Unit};

/// Key of a signal inside its channel
pub type QuantityKey = (Quantity, BTreeSet<QuantityFlag>);

/// One measurement; `timestamp` is absolute, in seconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: f64,
    pub value: f64,
}

/// Strided view of one channel inside an interleaved buffer.
///
/// For a buffer `[s0_ch0, s0_ch1, s0_ch2, s1_ch0, ..]` the view of channel 1
/// has `offset == 1` and `stride == 3`.
#[derive(Debug, Clone, Copy)]
pub struct InterleavedSamples<'a> {
    data: &'a [f32],
    offset: usize,
    stride: usize,
    num_samples: usize,
}

impl<'a> InterleavedSamples<'a> {
    pub fn new(data: &'a [f32], offset: usize, stride: usize, num_samples: usize) -> Self {
        debug_assert!(stride > 0 && offset < stride);
        debug_assert!(num_samples == 0 || offset + (num_samples - 1) * stride < data.len());
        Self {
            data,
            offset,
            stride,
            num_samples,
        }
    }

    pub fn len(&self) -> usize {
        self.num_samples
    }

    pub fn is_empty(&self) -> bool {
        self.num_samples == 0
    }

    /// Position of the channel in the interleave
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn iter(&self) -> impl Iterator<Item = f32> + 'a {
        self.data
            .iter()
            .skip(self.offset)
            .step_by(self.stride.max(1))
            .take(self.num_samples)
            .copied()
    }
}

#[derive(Debug)]
struct SignalData {
    timestamps: Vec<f64>,
    values: Vec<f64>,
    min: f64,
    max: f64,
    digits: i32,
}

impl SignalData {
    fn new() -> Self {
        Self {
            timestamps: Vec::new(),
            values: Vec::new(),
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            digits: 0,
        }
    }

    fn push(&mut self, timestamp: f64, value: f64) {
        self.timestamps.push(timestamp);
        self.values.push(value);
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }
}

/// Time series of one quantity of one channel.
///
/// Written by the owning channel on the acquisition thread, read from any
/// thread. Every accessor takes the internal lock for the duration of the call.
#[derive(Debug)]
pub struct AnalogSignal {
    channel_name: String,
    quantity: Quantity,
    quantity_flags: BTreeSet<QuantityFlag>,
    unit: Unit,
    signal_start_timestamp: RwLock<f64>,
    data: RwLock<SignalData>,
}

impl AnalogSignal {
    pub fn new(
        channel_name: impl Into<String>,
        quantity: Quantity,
        quantity_flags: BTreeSet<QuantityFlag>,
        unit: Unit,
        signal_start_timestamp: f64,
    ) -> Self {
        Self {
            channel_name: channel_name.into(),
            quantity,
            quantity_flags,
            unit,
            signal_start_timestamp: RwLock::new(signal_start_timestamp),
            data: RwLock::new(SignalData::new()),
        }
    }

    /// Name of the channel owning this signal
    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    pub fn quantity_flags(&self) -> &BTreeSet<QuantityFlag> {
        &self.quantity_flags
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    pub fn key(&self) -> QuantityKey {
        (self.quantity, self.quantity_flags.clone())
    }

    /// E.g. `"CH1 [V DC]"`
    pub fn display_name(&self) -> String {
        let unit = format_unit(self.unit, &self.quantity_flags);
        if unit.is_empty() {
            self.channel_name.clone()
        } else {
            format!("{} [{}]", self.channel_name, unit)
        }
    }

    pub fn signal_start_timestamp(&self) -> f64 {
        *self.signal_start_timestamp.read()
    }

    pub fn set_signal_start_timestamp(&self, timestamp: f64) {
        *self.signal_start_timestamp.write() = timestamp;
    }

    pub fn sample_count(&self) -> usize {
        self.data.read().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count() == 0
    }

    pub fn get_sample(&self, pos: usize) -> Option<Sample> {
        let data = self.data.read();
        Some(Sample {
            timestamp: *data.timestamps.get(pos)?,
            value: *data.values.get(pos)?,
        })
    }

    pub fn last_sample(&self) -> Option<Sample> {
        let data = self.data.read();
        let pos = data.values.len().checked_sub(1)?;
        Some(Sample {
            timestamp: data.timestamps[pos],
            value: data.values[pos],
        })
    }

    /// Copy of all samples
    pub fn samples(&self) -> Vec<Sample> {
        self.samples_since(0)
    }

    /// Copy of the samples from `pos` on, for incremental readers
    pub fn samples_since(&self, pos: usize) -> Vec<Sample> {
        let data = self.data.read();
        let start = pos.min(data.values.len());
        data.timestamps[start..]
            .iter()
            .zip(&data.values[start..])
            .map(|(&timestamp, &value)| Sample { timestamp, value })
            .collect()
    }

    /// Time of the sample at `pos` relative to the signal start timestamp
    pub fn relative_timestamp(&self, pos: usize) -> Option<f64> {
        let timestamp = *self.data.read().timestamps.get(pos)?;
        Some(timestamp - self.signal_start_timestamp())
    }

    pub fn min(&self) -> Option<f64> {
        let data = self.data.read();
        (!data.values.is_empty()).then_some(data.min)
    }

    pub fn max(&self) -> Option<f64> {
        let data = self.data.read();
        (!data.values.is_empty()).then_some(data.max)
    }

    /// Number of significant digits reported with the last batch
    pub fn digits(&self) -> i32 {
        self.data.read().digits
    }

    pub fn push_sample(&self, timestamp: f64, value: f64) {
        self.data.write().push(timestamp, value);
    }

    /// Append a strided batch.
    ///
    /// Sample `i` is stamped `timestamp + i / samplerate`, or `timestamp` when
    /// the sample rate is unknown (0). Storage is reserved up front, so a
    /// failed reservation leaves the signal untouched.
    pub fn push_interleaved(
        &self,
        samples: &InterleavedSamples<'_>,
        timestamp: f64,
        samplerate: u64,
        digits: i32,
    ) -> Result<usize, TryReserveError> {
        let count = samples.len();
        let period = if samplerate > 0 { 1.0 / samplerate as f64 } else { 0.0 };

        let mut data = self.data.write();
        data.timestamps.try_reserve(count)?;
        data.values.try_reserve(count)?;
        for (i, value) in samples.iter().enumerate() {
            data.push(timestamp + i as f64 * period, value as f64);
        }
        data.digits = digits;
        Ok(count)
    }

    pub fn clear(&self) {
        *self.data.write() = SignalData::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voltage_signal() -> AnalogSignal {
        let flags: BTreeSet<_> = [QuantityFlag::Dc].into_iter().collect();
        AnalogSignal::new("CH1", Quantity::Voltage, flags, Unit::Volt, 100.0)
    }

    #[test]
    fn test_interleaved_view_strides() {
        let data = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let view = InterleavedSamples::new(&data, 1, 3, 3);
        assert_eq!(view.iter().collect::<Vec<_>>(), vec![1.0, 4.0, 7.0]);
        assert_eq!(view.len(), 3);
        assert_eq!(view.offset(), 1);
    }

    #[test]
    fn test_push_interleaved_spaces_by_samplerate() {
        let signal = voltage_signal();
        let data = [1.0, 10.0, 2.0, 20.0];
        let view = InterleavedSamples::new(&data, 0, 2, 2);

        assert_eq!(signal.push_interleaved(&view, 200.0, 4, 3).unwrap(), 2);
        assert_eq!(signal.get_sample(0), Some(Sample { timestamp: 200.0, value: 1.0 }));
        assert_eq!(signal.get_sample(1), Some(Sample { timestamp: 200.25, value: 2.0 }));
        assert_eq!(signal.digits(), 3);
        assert_eq!(signal.relative_timestamp(1), Some(100.25));
    }

    #[test]
    fn test_push_interleaved_without_samplerate_keeps_timestamp() {
        let signal = voltage_signal();
        let data = [1.0, 2.0, 3.0];
        let view = InterleavedSamples::new(&data, 0, 1, 3);

        signal.push_interleaved(&view, 42.0, 0, 0).unwrap();
        assert!(signal.samples().iter().all(|s| s.timestamp == 42.0));
    }

    #[test]
    fn test_min_max_and_clear() {
        let signal = voltage_signal();
        assert_eq!(signal.min(), None);

        signal.push_sample(1.0, 3.5);
        signal.push_sample(2.0, -1.5);
        signal.push_sample(3.0, 0.5);

        assert_eq!(signal.min(), Some(-1.5));
        assert_eq!(signal.max(), Some(3.5));
        assert_eq!(signal.last_sample().map(|s| s.value), Some(0.5));
        assert_eq!(signal.samples_since(2).len(), 1);
        assert!(signal.samples_since(10).is_empty());

        signal.clear();
        assert!(signal.is_empty());
        assert_eq!(signal.max(), None);
    }

    #[test]
    fn test_display_name() {
        assert_eq!(voltage_signal().display_name(), "CH1 [V DC]");
        let unitless = AnalogSignal::new("M1", Quantity::Unknown, BTreeSet::new(), Unit::Unitless, 0.0);
        assert_eq!(unitless.display_name(), "M1");
    }
}
