// src/devices/feed.rs
//! Packet demultiplexing on the acquisition thread

use std::sync::Arc;

use crate::acquisition::AcquisitionState;
use crate::channels::Channel;
use crate::data::InterleavedSamples;
use crate::devices::configurable::route_meta;
use crate::devices::device::DeviceShared;
use crate::error::CoreError;
use crate::hal::{AnalogPayload, MetaPayload, Packet};

/// Hooks for packet kinds the core does not interpret.
///
/// Both run synchronously on the acquisition thread.
pub trait PacketHooks: Send + Sync {
    fn on_header(&self, _device: &str) {}
    fn on_trigger(&self, _device: &str) {}
}

/// Hooks that do nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl PacketHooks for NoopHooks {}

/// Bookkeeping carried from one packet to the next
#[derive(Debug, Default)]
pub(crate) struct FeedState {
    frame_began: bool,
    frame_start_timestamp: f64,
    consecutive_alloc_failures: u32,
    /// Failure count at which the session was stopped, not yet reported
    allocation_limit_hit: Option<u32>,
    /// Decoded interleaved values of the current analog packet, reused
    buffer: Vec<f32>,
}

impl FeedState {
    pub(crate) fn reset(&mut self) {
        self.frame_began = false;
        self.frame_start_timestamp = 0.0;
        self.consecutive_alloc_failures = 0;
        self.allocation_limit_hit = None;
        self.buffer = Vec::new();
    }
}

impl DeviceShared {
    /// Dispatch one packet. Errors are logged here and never returned.
    pub(crate) fn data_feed_in(&self, packet: &Packet) {
        tracing::trace!(device = %self.identity.short_name(), kind = packet.kind(), "packet");

        match packet {
            Packet::Header => self.hooks().on_header(&self.identity.short_name()),
            Packet::Meta(meta) => self.feed_in_meta(meta),
            Packet::Trigger => self.hooks().on_trigger(&self.identity.short_name()),
            Packet::FrameBegin => {
                let mut feed = self.feed.lock();
                feed.frame_began = true;
                feed.frame_start_timestamp = self.context.now();
            }
            Packet::FrameEnd => self.feed.lock().frame_began = false,
            Packet::Analog(payload) => self.feed_in_analog(payload),
            Packet::End => {
                let _data = self.data_mutex.lock();
                self.feed.lock().frame_began = false;
                tracing::debug!(device = %self.identity.short_name(), "end of stream");
            }
            Packet::Logic(_) | Packet::Unknown(_) => {}
        }
    }

    /// Hooks run outside the lock so they may replace themselves
    fn hooks(&self) -> Arc<dyn PacketHooks> {
        self.hooks.read().clone()
    }

    /// Error raised while feeding that must reach the handler once the
    /// session has returned
    pub(crate) fn take_deferred_error(&self) -> Option<CoreError> {
        self.feed
            .lock()
            .allocation_limit_hit
            .take()
            .map(|failures| CoreError::AllocationLimit { failures })
    }

    fn feed_in_meta(&self, meta: &MetaPayload) {
        let configurables = self.configurables.read();
        match route_meta(&configurables) {
            Some(configurable) => {
                let updated = configurable.feed_in_meta(meta);
                tracing::debug!(configurable = configurable.name(), updated, "meta applied");
            }
            None => tracing::debug!(device = %self.identity.short_name(), "meta without configurable dropped"),
        }
    }

    fn feed_in_analog(&self, payload: &AnalogPayload) {
        if self.state.load() != AcquisitionState::Running {
            return;
        }
        if payload.num_samples == 0 || payload.channels.is_empty() {
            return;
        }

        let _data = self.data_mutex.lock();
        let samplerate = self.current_samplerate();

        let channels = match self.resolve_channels(payload) {
            Some(channels) => channels,
            None => return,
        };

        let count = match payload.checked_value_count() {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(device = %self.identity.short_name(), error = %e, "malformed analog packet dropped");
                return;
            }
        };

        let budget = self.context.config().acquisition.max_packet_values;
        let mut feed = self.feed.lock();
        feed.buffer.clear();
        let over_budget = budget > 0 && count as u64 > budget;
        if over_budget || feed.buffer.try_reserve_exact(count).is_err() {
            drop(feed);
            self.on_allocation_failure(count);
            return;
        }

        if let Err(e) = payload.decode_into(&mut feed.buffer) {
            tracing::warn!(device = %self.identity.short_name(), error = %e, "malformed analog packet dropped");
            return;
        }

        let timestamp = if feed.frame_began {
            feed.frame_start_timestamp
        } else {
            self.context.now()
        };

        let stride = channels.len();
        for (offset, channel) in channels.iter().enumerate() {
            let samples = InterleavedSamples::new(&feed.buffer, offset, stride, payload.num_samples);
            if let Err(e) = channel.push_interleaved_samples(&samples, timestamp, samplerate, payload) {
                tracing::warn!(channel = channel.name(), error = %e, "signal storage exhausted, samples dropped");
            }
        }
        feed.consecutive_alloc_failures = 0;
    }

    /// Look up every payload channel before touching any signal
    fn resolve_channels(&self, payload: &AnalogPayload) -> Option<Vec<Arc<Channel>>> {
        let registry = self.channels.read();
        let mut resolved = Vec::with_capacity(payload.channels.len());
        for driver_channel in &payload.channels {
            match registry.get(&driver_channel.name) {
                Some(channel) => resolved.push(channel),
                None => {
                    let err = CoreError::UnknownChannel(driver_channel.name.clone());
                    if self.context.config().devices.strict_channel_registry {
                        panic!("{err}");
                    }
                    tracing::warn!(device = %self.identity.short_name(), error = %err, "analog packet dropped");
                    return None;
                }
            }
        }
        Some(resolved)
    }

    fn on_allocation_failure(&self, requested: usize) {
        let limit = self.context.config().acquisition.max_consecutive_alloc_failures;
        let mut feed = self.feed.lock();
        feed.consecutive_alloc_failures += 1;
        let failures = feed.consecutive_alloc_failures;

        tracing::warn!(
            device = %self.identity.short_name(),
            error = %CoreError::Allocation { requested },
            failures,
            "analog packet dropped"
        );

        // Reported by the acquisition thread after the session returns;
        // the handler may close the device, which is not allowed from here
        if limit > 0 && failures == limit {
            feed.allocation_limit_hit = Some(failures);
            drop(feed);
            tracing::error!(device = %self.identity.short_name(), failures, "stopping acquisition");
            if let Err(e) = self.session.stop() {
                tracing::warn!(error = %e, "session stop failed");
            }
        }
    }
}
