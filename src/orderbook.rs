// src/orderbook.rs
use crate::parser::Side;
use hashbrown::HashMap;
use slab::Slab;
use std::collections::BTreeMap;

/// Preallocated order slots; the slab grows past this transparently when a
/// deep book overflows it.
pub const ORDER_POOL_CAPACITY: usize = 50_000;

/// Reported depth per side.
pub const DEPTH: usize = 10;

type Handle = usize;

#[derive(Clone, Debug)]
struct Node {
    order_id: u64,
    price_raw: i64,
    size: u32,
    #[allow(dead_code)]
    original_size: u32,
    #[allow(dead_code)]
    timestamp_ns: u64,
    side: Side,
    prev: Option<Handle>,
    next: Option<Handle>,
}

#[derive(Clone, Debug, Default)]
struct Level {
    head: Option<Handle>,
    tail: Option<Handle>,
    total_size: u64,
    order_count: u32,
}

/// Price-aggregated depth, ten levels per side in priority order. Empty
/// slots are zero-filled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Depth10 {
    pub bid_px: [i64; DEPTH],
    pub bid_sz: [u64; DEPTH],
    pub ask_px: [i64; DEPTH],
    pub ask_sz: [u64; DEPTH],
}

/// Order book for a single instrument.
///
/// Orders live in a slab and are threaded through per-level FIFO chains
/// (insertion order = time priority). Both sides are ordered maps keyed by
/// raw price; bids iterate from the back for best-first visitation. A
/// ten-level cache is invalidated by every mutation and rebuilt lazily on
/// the next depth read.
pub struct OrderBook {
    bids: BTreeMap<i64, Level>,
    asks: BTreeMap<i64, Level>,
    orders: Slab<Node>,
    index: HashMap<u64, Handle>,
    cache: Depth10,
    cache_valid: bool,
    total_orders_processed: u64,
    price_levels_created: u64,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::with_capacity(ORDER_POOL_CAPACITY)
    }

    pub fn with_capacity(pool_capacity: usize) -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            orders: Slab::with_capacity(pool_capacity),
            index: HashMap::with_capacity(pool_capacity.min(10_000)),
            cache: Depth10::default(),
            cache_valid: false,
            total_orders_processed: 0,
            price_levels_created: 0,
        }
    }

    #[inline]
    fn levels(&self, side: Side) -> &BTreeMap<i64, Level> {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    #[inline]
    fn levels_mut(&mut self, side: Side) -> &mut BTreeMap<i64, Level> {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    /// Inserts a fresh order at the tail of its price level. Fails on a
    /// duplicate id; the id stays registered until cancel/consume/clear.
    pub fn add_order(
        &mut self,
        order_id: u64,
        price_raw: i64,
        size: u32,
        side: Side,
        timestamp_ns: u64,
    ) -> bool {
        if self.index.contains_key(&order_id) {
            return false;
        }
        let h = self.orders.insert(Node {
            order_id,
            price_raw,
            size,
            original_size: size,
            timestamp_ns,
            side,
            prev: None,
            next: None,
        });
        self.link_at_tail(h);
        self.index.insert(order_id, h);
        self.total_orders_processed += 1;
        self.cache_valid = false;
        true
    }

    /// Price-preserving modifies adjust size in place; a price change
    /// re-queues the order at the tail of the destination level on the same
    /// side, losing time priority.
    pub fn modify_order(&mut self, order_id: u64, new_price: i64, new_size: u32) -> bool {
        let h = match self.index.get(&order_id) {
            Some(h) => *h,
            None => return false,
        };
        let (old_price, old_size, side) = {
            let n = &self.orders[h];
            (n.price_raw, n.size, n.side)
        };

        if old_price == new_price {
            if let Some(lvl) = self.levels_mut(side).get_mut(&old_price) {
                lvl.total_size = lvl.total_size - old_size as u64 + new_size as u64;
            }
            self.orders[h].size = new_size;
        } else {
            self.unlink_from_level(h);
            {
                let n = &mut self.orders[h];
                n.price_raw = new_price;
                n.size = new_size;
            }
            self.link_at_tail(h);
        }
        self.cache_valid = false;
        true
    }

    pub fn cancel_order(&mut self, order_id: u64) -> bool {
        let h = match self.index.remove(&order_id) {
            Some(h) => h,
            None => return false,
        };
        self.unlink_from_level(h);
        self.orders.remove(h);
        self.cache_valid = false;
        true
    }

    /// Consumes up to `size` from the passive side at exactly `price_raw`,
    /// walking the level FIFO head-first. Partial head fills decrement in
    /// place and stop. Returns false only when no level rests at that price;
    /// a size exceeding the resting depth drains the level and still
    /// succeeds (the event stream is authoritative).
    pub fn execute_trade(&mut self, price_raw: i64, size: u32, aggressor_side: Side) -> bool {
        let passive = aggressor_side.opposite();
        if !self.levels(passive).contains_key(&price_raw) {
            return false;
        }

        let mut remaining = size;
        while remaining > 0 {
            let h = match self.levels(passive).get(&price_raw).and_then(|l| l.head) {
                Some(h) => h,
                None => break,
            };
            let head_size = self.orders[h].size;
            if head_size <= remaining {
                remaining -= head_size;
                let oid = self.orders[h].order_id;
                self.unlink_from_level(h);
                self.index.remove(&oid);
                self.orders.remove(h);
            } else {
                if let Some(lvl) = self.levels_mut(passive).get_mut(&price_raw) {
                    lvl.total_size -= remaining as u64;
                }
                self.orders[h].size = head_size - remaining;
                remaining = 0;
            }
        }

        self.cache_valid = false;
        true
    }

    /// Destroys all resting orders and both side maps.
    pub fn clear(&mut self) {
        self.orders.clear();
        self.index.clear();
        self.bids.clear();
        self.asks.clear();
        self.cache_valid = false;
    }

    /// Current ten-level depth, rebuilt from the side maps only when a
    /// mutation has invalidated the cache.
    pub fn top10(&mut self) -> Depth10 {
        if !self.cache_valid {
            self.rebuild_cache();
        }
        self.cache
    }

    /// Best bid as `(price, total_size)`, zeros when the side is empty.
    pub fn best_bid(&self) -> (i64, u64) {
        self.bids
            .iter()
            .next_back()
            .map(|(p, l)| (*p, l.total_size))
            .unwrap_or((0, 0))
    }

    /// Best ask as `(price, total_size)`, zeros when the side is empty.
    pub fn best_ask(&self) -> (i64, u64) {
        self.asks
            .iter()
            .next()
            .map(|(p, l)| (*p, l.total_size))
            .unwrap_or((0, 0))
    }

    pub fn active_orders(&self) -> usize {
        self.index.len()
    }

    pub fn price_level_count(&self) -> usize {
        self.bids.len() + self.asks.len()
    }

    pub fn total_orders_processed(&self) -> u64 {
        self.total_orders_processed
    }

    pub fn price_levels_created(&self) -> u64 {
        self.price_levels_created
    }

    fn link_at_tail(&mut self, h: Handle) {
        let (price, side, size) = {
            let n = &self.orders[h];
            (n.price_raw, n.side, n.size)
        };
        // Obtain the previous tail without holding the level borrow across
        // order mutations.
        let (prev_tail, fresh_level) = {
            let map = self.levels_mut(side);
            let fresh = !map.contains_key(&price);
            let lvl = map.entry(price).or_default();
            (lvl.tail, fresh)
        };
        if fresh_level {
            self.price_levels_created += 1;
        }
        if let Some(t) = prev_tail {
            self.orders[t].next = Some(h);
        }
        {
            let n = &mut self.orders[h];
            n.prev = prev_tail;
            n.next = None;
        }
        let lvl = self.levels_mut(side).entry(price).or_default();
        if prev_tail.is_none() {
            lvl.head = Some(h);
        }
        lvl.tail = Some(h);
        lvl.order_count += 1;
        lvl.total_size += size as u64;
    }

    fn unlink_from_level(&mut self, h: Handle) {
        let (price, side, prev, next, size) = {
            let n = &self.orders[h];
            (n.price_raw, n.side, n.prev, n.next, n.size)
        };
        if let Some(p) = prev {
            self.orders[p].next = next;
        }
        if let Some(nx) = next {
            self.orders[nx].prev = prev;
        }
        let now_empty = if let Some(lvl) = self.levels_mut(side).get_mut(&price) {
            if prev.is_none() {
                lvl.head = next;
            }
            if next.is_none() {
                lvl.tail = prev;
            }
            lvl.order_count -= 1;
            lvl.total_size -= size as u64;
            lvl.order_count == 0
        } else {
            false
        };
        if now_empty {
            self.levels_mut(side).remove(&price);
        }
        let n = &mut self.orders[h];
        n.prev = None;
        n.next = None;
    }

    fn rebuild_cache(&mut self) {
        self.cache = Depth10::default();
        for (i, (px, lvl)) in self.bids.iter().rev().take(DEPTH).enumerate() {
            self.cache.bid_px[i] = *px;
            self.cache.bid_sz[i] = lvl.total_size;
        }
        for (i, (px, lvl)) in self.asks.iter().take(DEPTH).enumerate() {
            self.cache.ask_px[i] = *px;
            self.cache.ask_sz[i] = lvl.total_size;
        }
        self.cache_valid = true;
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}
