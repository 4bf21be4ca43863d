//! Mock venue implementations for testing.
//!
//! - [`ScriptedGateway`] - An [`OrderGateway`] with programmable placement
//!   results and fill behavior. Best for: executor state-machine paths,
//!   timeout and unwind handling.
//! - [`ChannelFeed`] - A [`MarketDataStream`] driven externally through a
//!   [`ChannelFeedHandle`]. Best for: engine integration tests needing
//!   precise, on-demand event delivery.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::domain::{OrderId, OrderKind, OrderSpec, OrderStatus, Price, Symbol, VenueId};
use crate::error::{Result, VenueError};
use crate::port::venue::{MarketDataStream, MarketEvent, OrderGateway, OrderStatusReport};

/// How a scripted order behaves once placed.
#[derive(Debug, Clone, Copy)]
pub enum FillMode {
    /// Fill fully at the limit price (market orders at the market price)
    /// on the first status poll.
    FillAtLimit,
    /// Fill the given fraction, then sit PartiallyFilled until cancelled.
    FillPartial(Decimal),
    /// Stay Open until cancelled.
    StayOpen,
}

#[derive(Debug, Clone)]
struct ScriptedOrder {
    spec: OrderSpec,
    mode: FillMode,
    cancelled: bool,
}

/// A mock order gateway with programmable behavior.
///
/// Placement results pop from a queue (defaulting to success); the fill
/// mode at placement time decides how status polls answer.
pub struct ScriptedGateway {
    venue: VenueId,
    sequence: AtomicU64,
    place_errors: Mutex<VecDeque<String>>,
    fill_mode: Mutex<FillMode>,
    fill_mode_queue: Mutex<VecDeque<FillMode>>,
    market_price: Mutex<Option<Price>>,
    orders: Mutex<HashMap<OrderId, ScriptedOrder>>,
    place_count: AtomicU32,
    cancel_count: AtomicU32,
}

impl ScriptedGateway {
    /// Create a gateway that fills everything at the limit price.
    pub fn new(venue: VenueId) -> Arc<Self> {
        Arc::new(Self {
            venue,
            sequence: AtomicU64::new(1),
            place_errors: Mutex::new(VecDeque::new()),
            fill_mode: Mutex::new(FillMode::FillAtLimit),
            fill_mode_queue: Mutex::new(VecDeque::new()),
            market_price: Mutex::new(None),
            orders: Mutex::new(HashMap::new()),
            place_count: AtomicU32::new(0),
            cancel_count: AtomicU32::new(0),
        })
    }

    /// Queue a placement failure for the next `place_order` call.
    pub fn push_place_error(&self, reason: impl Into<String>) {
        self.place_errors.lock().push_back(reason.into());
    }

    /// Set the default behavior applied to subsequently placed orders.
    pub fn set_fill_mode(&self, mode: FillMode) {
        *self.fill_mode.lock() = mode;
    }

    /// Queue a behavior for the next placed order only; later orders fall
    /// back to the default mode.
    pub fn push_fill_mode(&self, mode: FillMode) {
        self.fill_mode_queue.lock().push_back(mode);
    }

    /// Set the price market orders fill at.
    pub fn set_market_price(&self, price: Price) {
        *self.market_price.lock() = Some(price);
    }

    /// How many placements were attempted.
    pub fn place_count(&self) -> u32 {
        self.place_count.load(Ordering::SeqCst)
    }

    /// How many cancels were requested.
    pub fn cancel_count(&self) -> u32 {
        self.cancel_count.load(Ordering::SeqCst)
    }

    fn fill_price(&self, spec: &OrderSpec) -> Option<Price> {
        match spec.kind {
            OrderKind::Limit => spec.limit_price,
            OrderKind::Market => (*self.market_price.lock()).or(spec.limit_price),
        }
    }
}

#[async_trait]
impl OrderGateway for ScriptedGateway {
    async fn place_order(&self, spec: &OrderSpec) -> Result<OrderId> {
        self.place_count.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.place_errors.lock().pop_front() {
            return Err(VenueError::Rejected(reason).into());
        }

        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let order_id = OrderId::new(format!("scripted-{}-{}", self.venue, seq));
        let mode = self
            .fill_mode_queue
            .lock()
            .pop_front()
            .unwrap_or(*self.fill_mode.lock());
        self.orders.lock().insert(
            order_id.clone(),
            ScriptedOrder {
                spec: spec.clone(),
                mode,
                cancelled: false,
            },
        );
        Ok(order_id)
    }

    async fn cancel_order(&self, order_id: &OrderId) -> Result<()> {
        self.cancel_count.fetch_add(1, Ordering::SeqCst);
        let mut orders = self.orders.lock();
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| VenueError::UnknownOrder(order_id.to_string()))?;
        order.cancelled = true;
        Ok(())
    }

    async fn fetch_order_status(&self, order_id: &OrderId) -> Result<OrderStatusReport> {
        let orders = self.orders.lock();
        let order = orders
            .get(order_id)
            .ok_or_else(|| VenueError::UnknownOrder(order_id.to_string()))?;

        let price = self.fill_price(&order.spec);
        let report = match order.mode {
            FillMode::FillAtLimit => OrderStatusReport {
                order_id: order_id.clone(),
                status: OrderStatus::Filled,
                filled_quantity: order.spec.quantity,
                avg_fill_price: price,
            },
            FillMode::FillPartial(fraction) => {
                let filled = order.spec.quantity * fraction;
                OrderStatusReport {
                    order_id: order_id.clone(),
                    status: if order.cancelled {
                        OrderStatus::Cancelled
                    } else {
                        OrderStatus::PartiallyFilled
                    },
                    filled_quantity: filled,
                    avg_fill_price: price,
                }
            }
            FillMode::StayOpen => OrderStatusReport {
                order_id: order_id.clone(),
                status: if order.cancelled {
                    OrderStatus::Cancelled
                } else {
                    OrderStatus::Open
                },
                filled_quantity: Decimal::ZERO,
                avg_fill_price: None,
            },
        };
        Ok(report)
    }

    fn venue(&self) -> &VenueId {
        &self.venue
    }
}

/// A mock market data stream controlled externally via a
/// [`ChannelFeedHandle`].
pub struct ChannelFeed {
    venue: VenueId,
    events: tokio::sync::mpsc::Receiver<Option<MarketEvent>>,
    connect_count: Arc<AtomicU32>,
    subscribed: Arc<Mutex<Vec<Symbol>>>,
}

/// Control handle for a [`ChannelFeed`].
pub struct ChannelFeedHandle {
    events: tokio::sync::mpsc::Sender<Option<MarketEvent>>,
    connect_count: Arc<AtomicU32>,
    subscribed: Arc<Mutex<Vec<Symbol>>>,
}

impl ChannelFeedHandle {
    /// Send an event to the feed.
    pub async fn send(&self, event: MarketEvent) {
        let _ = self.events.send(Some(event)).await;
    }

    /// Signal end-of-stream (causes `next_event` to return `None`).
    pub async fn close(&self) {
        let _ = self.events.send(None).await;
    }

    /// How many times `connect()` was called.
    pub fn connect_count(&self) -> u32 {
        self.connect_count.load(Ordering::SeqCst)
    }

    /// Which symbols were last subscribed to.
    pub fn subscribed(&self) -> Vec<Symbol> {
        self.subscribed.lock().clone()
    }
}

/// Create a [`ChannelFeed`] and its control [`ChannelFeedHandle`].
pub fn channel_feed(venue: VenueId, buffer: usize) -> (ChannelFeed, ChannelFeedHandle) {
    let (tx, rx) = tokio::sync::mpsc::channel(buffer);
    let connect_count = Arc::new(AtomicU32::new(0));
    let subscribed = Arc::new(Mutex::new(Vec::new()));
    (
        ChannelFeed {
            venue,
            events: rx,
            connect_count: connect_count.clone(),
            subscribed: subscribed.clone(),
        },
        ChannelFeedHandle {
            events: tx,
            connect_count,
            subscribed,
        },
    )
}

#[async_trait]
impl MarketDataStream for ChannelFeed {
    async fn connect(&mut self) -> Result<()> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(&mut self, symbols: &[Symbol]) -> Result<()> {
        *self.subscribed.lock() = symbols.to_vec();
        Ok(())
    }

    async fn next_event(&mut self) -> Option<MarketEvent> {
        match self.events.recv().await {
            Some(Some(event)) => Some(event),
            Some(None) | None => None,
        }
    }

    fn venue(&self) -> &VenueId {
        &self.venue
    }
}
