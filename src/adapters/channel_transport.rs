//! Channel-backed network ports.
//!
//! The network core sees the transport only through [`MessageSource`] and
//! [`MessageSink`]. These adapters put an `embassy-sync` channel behind each
//! trait so the transport task and the core-0 loop never block each other.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::app::ports::{MessageSink, MessageSource};
use crate::messaging::channels::{
    INBOUND_CONTROL_CHANNEL, INBOUND_DEPTH, OUTBOUND_CHANNEL, OUTBOUND_DEPTH,
};
use crate::messaging::codec::MqttMessage;

pub type MessageChannel<const N: usize> = Channel<CriticalSectionRawMutex, MqttMessage, N>;

/// Receives control messages queued by the transport task.
pub struct ChannelSource<'c, const N: usize> {
    channel: &'c MessageChannel<N>,
}

impl<'c, const N: usize> ChannelSource<'c, N> {
    pub fn new(channel: &'c MessageChannel<N>) -> Self {
        Self { channel }
    }
}

impl ChannelSource<'static, INBOUND_DEPTH> {
    pub fn inbound() -> Self {
        Self::new(&INBOUND_CONTROL_CHANNEL)
    }
}

impl<const N: usize> MessageSource for ChannelSource<'_, N> {
    fn poll(&mut self) -> Option<MqttMessage> {
        self.channel.try_receive().ok()
    }
}

/// Queues outbound messages for the transport task.
pub struct ChannelSink<'c, const N: usize> {
    channel: &'c MessageChannel<N>,
}

impl<'c, const N: usize> ChannelSink<'c, N> {
    pub fn new(channel: &'c MessageChannel<N>) -> Self {
        Self { channel }
    }
}

impl ChannelSink<'static, OUTBOUND_DEPTH> {
    pub fn outbound() -> Self {
        Self::new(&OUTBOUND_CHANNEL)
    }
}

impl<const N: usize> MessageSink for ChannelSink<'_, N> {
    /// `false` when the transport has fallen `N` messages behind.
    fn publish(&mut self, message: &MqttMessage) -> bool {
        self.channel.try_send(message.clone()).is_ok()
    }
}
