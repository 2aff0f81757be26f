//! Application notifications.
//!
//! A [`Manager`][crate::Manager] has at most one [`EventSink`]. Events are delivered synchronously on whichever thread
//! produced them: the application's own thread for an explicit release, the backend's callback thread for discovery
//! and disconnects. Sinks must therefore be `Send + Sync` and must not assume events arrive serialized. No internal
//! lock is held while a sink method runs, so a sink may call back into the manager.

use std::pin::Pin;
use std::sync::Arc;
use std::task;

use futures_core::Stream;
use futures_lite::StreamExt;

use crate::Peripheral;

/// Receives peripheral lifecycle events
///
/// Every method has an empty default so implementations only override what they need.
pub trait EventSink: Send + Sync {
    /// An advertisement from `peripheral` was received.
    fn discover_peripheral(&self, peripheral: &Peripheral) {
        let _ = peripheral;
    }

    /// `peripheral` disconnected. `error` is `0` for an orderly disconnect, otherwise a platform error code.
    fn disconnect_peripheral(&self, peripheral: &Peripheral, error: i32) {
        let _ = (peripheral, error);
    }

    /// `peripheral` is about to be removed from the registry.
    ///
    /// Its fields are still readable during this call.
    fn release_peripheral(&self, peripheral: &Peripheral) {
        let _ = peripheral;
    }
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn discover_peripheral(&self, peripheral: &Peripheral) {
        (**self).discover_peripheral(peripheral)
    }

    fn disconnect_peripheral(&self, peripheral: &Peripheral, error: i32) {
        (**self).disconnect_peripheral(peripheral, error)
    }

    fn release_peripheral(&self, peripheral: &Peripheral) {
        (**self).release_peripheral(peripheral)
    }
}

/// An owned copy of a sink notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeripheralEvent {
    /// See [`EventSink::discover_peripheral`]
    Discovered(Peripheral),
    /// See [`EventSink::disconnect_peripheral`]
    Disconnected {
        /// The peripheral that disconnected
        peripheral: Peripheral,
        /// `0`, or the platform error code
        error: i32,
    },
    /// See [`EventSink::release_peripheral`]
    Released(Peripheral),
}

impl PeripheralEvent {
    /// The peripheral this event is about
    pub fn peripheral(&self) -> &Peripheral {
        match self {
            PeripheralEvent::Discovered(peripheral)
            | PeripheralEvent::Disconnected { peripheral, .. }
            | PeripheralEvent::Released(peripheral) => peripheral,
        }
    }
}

/// An [`EventSink`] that queues every event for asynchronous consumption through an [`EventStream`].
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: async_channel::Sender<PeripheralEvent>,
}

impl ChannelSink {
    /// Creates a sink and the stream receiving its events. The queue is unbounded, so backend threads never block.
    pub fn new() -> (ChannelSink, EventStream) {
        let (sender, receiver) = async_channel::unbounded();
        (
            ChannelSink { sender },
            EventStream {
                receiver: Box::pin(receiver),
            },
        )
    }

    fn send(&self, event: PeripheralEvent) {
        // a dropped stream just means nobody is listening any more
        let _ = self.sender.try_send(event);
    }
}

impl EventSink for ChannelSink {
    fn discover_peripheral(&self, peripheral: &Peripheral) {
        self.send(PeripheralEvent::Discovered(peripheral.clone()));
    }

    fn disconnect_peripheral(&self, peripheral: &Peripheral, error: i32) {
        self.send(PeripheralEvent::Disconnected {
            peripheral: peripheral.clone(),
            error,
        });
    }

    fn release_peripheral(&self, peripheral: &Peripheral) {
        self.send(PeripheralEvent::Released(peripheral.clone()));
    }
}

/// A stream of [`PeripheralEvent`]s fed by a [`ChannelSink`]
///
/// The stream ends once every clone of its sink has been dropped and the queue is drained.
#[derive(Debug)]
pub struct EventStream {
    receiver: Pin<Box<async_channel::Receiver<PeripheralEvent>>>,
}

impl EventStream {
    /// Waits for the next event.
    pub async fn next_event(&mut self) -> Option<PeripheralEvent> {
        self.next().await
    }

    /// Returns a queued event without waiting.
    pub fn try_next_event(&mut self) -> Option<PeripheralEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Stream for EventStream {
    type Item = PeripheralEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> task::Poll<Option<PeripheralEvent>> {
        Stream::poll_next(self.receiver.as_mut(), cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        Stream::size_hint(&*self.receiver)
    }
}
