//! Events published by the display and lifecycle events it consumes.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use crate::bitmap::BitmapHandle;
use crate::device::TextureId;

/// Events published by the display.
#[derive(Clone, Debug, PartialEq)]
pub enum DisplayEvent {
    /// An asynchronously loaded bitmap (image or font) finished decoding.
    BitmapLoaded {
        /// The bitmap that finished.
        bitmap: BitmapHandle,
        /// Resolved location it was read from.
        location: String,
        /// Stable hash of `location`.
        id: u64,
        /// New texture, or `None` when decoding failed and the bitmap fell
        /// back to a 1×1 placeholder.
        texture: Option<TextureId>,
    },
    /// The screen was (re)created with a new size.
    VideoModeChanged {
        /// New screen width.
        width: u32,
        /// New screen height.
        height: u32,
    },
}

/// Platform surface notifications (mobile).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// A drawable surface exists again.
    Created {
        /// Surface width.
        width: u32,
        /// Surface height.
        height: u32,
    },
    /// The surface is gone; nothing can be presented.
    Destroyed,
    /// The surface changed size.
    Resized {
        /// New width.
        width: u32,
        /// New height.
        height: u32,
    },
}

/// Engine and platform events the display reacts to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// End of a render pass.
    RenderStop,
    /// A surface notification.
    Surface(SurfaceEvent),
}

/// Kinds of incoming events a display can subscribe to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// [`LifecycleEvent::RenderStop`].
    RenderStop,
    /// [`LifecycleEvent::Surface`].
    Surface,
}

/// Typed publish/subscribe bus.
pub trait EventBus {
    /// Deliver an event to listeners.
    fn publish(&mut self, event: DisplayEvent);

    /// Ask to receive events of `kind`.
    fn subscribe(&mut self, kind: EventKind);

    /// Stop receiving events of `kind`.
    fn unsubscribe(&mut self, kind: EventKind);

    /// Whether the display currently listens to `kind`.
    fn is_subscribed(&self, kind: EventKind) -> bool;
}

#[derive(Debug, Default)]
struct Queue {
    published: Vec<DisplayEvent>,
    subscriptions: HashSet<EventKind>,
}

/// Event bus that queues published events until drained.
///
/// Clones share the same queue, so the application keeps one clone and
/// hands another to the display.
#[derive(Clone, Debug, Default)]
pub struct QueuedEventBus {
    queue: Arc<Mutex<Queue>>,
}

impl QueuedEventBus {
    /// An empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every event published so far, oldest first.
    #[must_use]
    pub fn drain(&self) -> Vec<DisplayEvent> {
        std::mem::take(&mut self.lock().published)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventBus for QueuedEventBus {
    fn publish(&mut self, event: DisplayEvent) {
        self.lock().published.push(event);
    }

    fn subscribe(&mut self, kind: EventKind) {
        self.lock().subscriptions.insert(kind);
    }

    fn unsubscribe(&mut self, kind: EventKind) {
        self.lock().subscriptions.remove(&kind);
    }

    fn is_subscribed(&self, kind: EventKind) -> bool {
        self.lock().subscriptions.contains(&kind)
    }
}

/// 64-bit FNV-1a hash, used as the stable id of a resource location.
#[must_use]
pub fn location_id(location: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    location
        .bytes()
        .fold(OFFSET, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(PRIME))
}
