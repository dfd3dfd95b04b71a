// Tick sources driving the reconciliation loop
//
// The engine never sleeps on its own between cycles; it waits on a
// `TickSource`. Production uses a tokio interval, tests push ticks through a
// channel and run cycles deterministically.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

#[async_trait]
pub trait TickSource: Send {
    /// `None` once the source is exhausted
    async fn next_tick(&mut self) -> Option<()>;
}

/// Fixed-period ticks; the first fires one period after creation.
pub struct IntervalTicks {
    interval: Interval,
}

impl IntervalTicks {
    pub fn new(period: Duration) -> Self {
        let mut interval = interval_at(Instant::now() + period, period);
        // A slow cycle must not be followed by a burst of catch-up cycles.
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }
}

#[async_trait]
impl TickSource for IntervalTicks {
    async fn next_tick(&mut self) -> Option<()> {
        self.interval.tick().await;
        Some(())
    }
}

/// Ticks delivered by hand through a `TickSender`
pub struct ChannelTicks {
    rx: mpsc::Receiver<()>,
}

#[derive(Clone)]
pub struct TickSender {
    tx: mpsc::Sender<()>,
}

impl TickSender {
    /// Queue one tick; false once the receiving side is gone
    pub async fn tick(&self) -> bool {
        self.tx.send(()).await.is_ok()
    }
}

impl ChannelTicks {
    pub fn new(capacity: usize) -> (TickSender, ChannelTicks) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (TickSender { tx }, ChannelTicks { rx })
    }

    /// A source that yields exactly `count` ticks and then ends
    pub fn finite(count: usize) -> ChannelTicks {
        let (tx, rx) = mpsc::channel(count.max(1));
        for _ in 0..count {
            // Capacity covers every tick, so this cannot fail.
            let _ = tx.try_send(());
        }
        ChannelTicks { rx }
    }
}

#[async_trait]
impl TickSource for ChannelTicks {
    async fn next_tick(&mut self) -> Option<()> {
        self.rx.recv().await
    }
}
