// src/engine.rs
//
// Interprets the raw MBO action stream and drives the order book. Trades
// arrive as a three-event protocol: `T` announces the trade, `F` with the
// same identifier confirms the aggressor fill, and the closing `C` triggers
// the actual book mutation. Any deviation resets the machine to idle so a
// malformed sequence cannot latch it.

use crate::orderbook::OrderBook;
use crate::parser::{Event, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TradeState {
    Idle,
    TradeReceived,
    FillReceived,
}

#[derive(Debug, Clone, Copy)]
struct PendingTrade {
    #[allow(dead_code)]
    timestamp_ns: u64,
    trade_id: u64,
    price_raw: i64,
    size: u32,
    side: u8, // aggressor side wire byte, taken from the T record as-is
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EngineStats {
    pub actions_processed: u64,
    pub trades_aggregated: u64,
    pub errors: u64,
    pub adds: u64,
    pub modifies: u64,
    pub cancels: u64,
    pub trades: u64,
    pub fills: u64,
    pub clears: u64,
    pub noops: u64,
}

pub struct ActionEngine {
    state: TradeState,
    pending: Option<PendingTrade>,
    first_clear_seen: bool,
    stats: EngineStats,
}

impl ActionEngine {
    pub fn new() -> Self {
        Self {
            state: TradeState::Idle,
            pending: None,
            first_clear_seen: false,
            stats: EngineStats::default(),
        }
    }

    /// Applies one event to the book. The return value tells the caller
    /// whether the visible depth may have changed and the emitter should be
    /// consulted.
    pub fn apply(&mut self, book: &mut OrderBook, ev: &Event) -> bool {
        self.stats.actions_processed += 1;
        match ev.action {
            b'A' => {
                self.stats.adds += 1;
                self.on_add(book, ev)
            }
            b'M' => {
                self.stats.modifies += 1;
                self.on_modify(book, ev)
            }
            b'C' => {
                self.stats.cancels += 1;
                self.on_cancel(book, ev)
            }
            b'T' => {
                self.stats.trades += 1;
                self.on_trade(ev)
            }
            b'F' => {
                self.stats.fills += 1;
                self.on_fill(ev)
            }
            b'R' => {
                self.stats.clears += 1;
                self.on_clear(book)
            }
            b'N' => {
                self.stats.noops += 1;
                true
            }
            _ => {
                self.stats.errors += 1;
                false
            }
        }
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    fn on_add(&mut self, book: &mut OrderBook, ev: &Event) -> bool {
        let side = match Side::from_byte(ev.side) {
            Some(s) => s,
            None => {
                self.stats.errors += 1;
                return false;
            }
        };
        let ok = book.add_order(ev.order_id, ev.price_raw, ev.size, side, ev.timestamp_ns);
        if !ok {
            self.stats.errors += 1;
        }
        ok
    }

    fn on_modify(&mut self, book: &mut OrderBook, ev: &Event) -> bool {
        if Side::from_byte(ev.side).is_none() {
            self.stats.errors += 1;
            return false;
        }
        let ok = book.modify_order(ev.order_id, ev.price_raw, ev.size);
        if !ok {
            self.stats.errors += 1;
        }
        ok
    }

    fn on_cancel(&mut self, book: &mut OrderBook, ev: &Event) -> bool {
        if self.state == TradeState::FillReceived {
            return self.complete_trade(book);
        }
        let ok = book.cancel_order(ev.order_id);
        if !ok {
            self.stats.errors += 1;
        }
        ok
    }

    /// Buffers the announced trade without touching the book. A `T` always
    /// restarts the sequence, discarding any half-finished predecessor.
    fn on_trade(&mut self, ev: &Event) -> bool {
        self.state = TradeState::TradeReceived;
        self.pending = Some(PendingTrade {
            timestamp_ns: ev.timestamp_ns,
            trade_id: ev.order_id,
            price_raw: ev.price_raw,
            size: ev.size,
            side: ev.side,
        });
        false
    }

    fn on_fill(&mut self, ev: &Event) -> bool {
        if self.state != TradeState::TradeReceived {
            self.stats.errors += 1;
            self.state = TradeState::Idle;
            self.pending = None;
            return false;
        }
        match self.pending {
            Some(p) if p.trade_id == ev.order_id => {
                self.state = TradeState::FillReceived;
            }
            _ => {
                self.state = TradeState::Idle;
                self.pending = None;
                self.stats.errors += 1;
            }
        }
        false
    }

    /// The first clear ever observed is a stream preamble and is absorbed;
    /// every later one wipes the book and resets the trade machine.
    fn on_clear(&mut self, book: &mut OrderBook) -> bool {
        if !self.first_clear_seen {
            self.first_clear_seen = true;
            return false;
        }
        book.clear();
        self.state = TradeState::Idle;
        self.pending = None;
        true
    }

    /// Replays the buffered trade against the book. The closing `C` record's
    /// own fields are not used; only its arrival matters.
    fn complete_trade(&mut self, book: &mut OrderBook) -> bool {
        let p = match self.pending.take() {
            Some(p) => p,
            None => {
                self.stats.errors += 1;
                self.state = TradeState::Idle;
                return false;
            }
        };
        let aggressor = if p.side == b'B' { Side::Bid } else { Side::Ask };
        let ok = book.execute_trade(p.price_raw, p.size, aggressor);
        if ok {
            self.stats.trades_aggregated += 1;
        } else {
            self.stats.errors += 1;
        }
        self.state = TradeState::Idle;
        ok
    }
}

impl Default for ActionEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(ts: u64, action: u8, side: u8, px: i64, sz: u32, oid: u64) -> Event {
        Event {
            timestamp_ns: ts,
            order_id: oid,
            price_raw: px,
            size: sz,
            action,
            side,
        }
    }

    #[test]
    fn complete_trade_sequence_mutates_on_the_closing_cancel() {
        let mut book = OrderBook::new();
        let mut engine = ActionEngine::new();

        assert!(engine.apply(&mut book, &ev(1000, b'A', b'A', 10100, 200, 1001)));

        assert!(!engine.apply(&mut book, &ev(2000, b'T', b'B', 10100, 100, 2001)));
        assert_eq!(book.best_ask(), (10100, 200)); // untouched so far
        assert!(!engine.apply(&mut book, &ev(3000, b'F', b'B', 10100, 100, 2001)));
        assert_eq!(book.best_ask(), (10100, 200));
        assert!(engine.apply(&mut book, &ev(4000, b'C', b'B', 10100, 0, 2001)));

        assert_eq!(book.best_ask(), (10100, 100));
        assert_eq!(engine.stats().trades_aggregated, 1);
        assert_eq!(engine.stats().errors, 0);
    }

    #[test]
    fn trade_fills_across_orders_in_fifo_order() {
        let mut book = OrderBook::new();
        let mut engine = ActionEngine::new();

        assert!(engine.apply(&mut book, &ev(1, b'A', b'A', 10100, 100, 1)));
        assert!(engine.apply(&mut book, &ev(2, b'A', b'A', 10100, 150, 2)));

        assert!(!engine.apply(&mut book, &ev(3, b'T', b'B', 10100, 200, 9)));
        assert!(!engine.apply(&mut book, &ev(4, b'F', b'B', 10100, 200, 9)));
        assert!(engine.apply(&mut book, &ev(5, b'C', b'B', 10100, 0, 9)));

        assert_eq!(book.best_ask(), (10100, 50));
        assert_eq!(book.active_orders(), 1);
    }

    #[test]
    fn mismatched_fill_discards_the_pending_trade() {
        let mut book = OrderBook::new();
        let mut engine = ActionEngine::new();
        assert!(engine.apply(&mut book, &ev(1, b'A', b'A', 10100, 200, 1001)));

        assert!(!engine.apply(&mut book, &ev(2, b'T', b'B', 10100, 100, 2001)));
        assert!(!engine.apply(&mut book, &ev(3, b'F', b'B', 10100, 100, 9999)));
        assert_eq!(engine.stats().errors, 1);

        // The following C is a plain cancel of an unknown id, not a trade
        // completion, and the book is untouched.
        assert!(!engine.apply(&mut book, &ev(4, b'C', b'B', 10100, 0, 2001)));
        assert_eq!(book.best_ask(), (10100, 200));
        assert_eq!(engine.stats().errors, 2);
    }

    #[test]
    fn stray_fill_resets_to_idle() {
        let mut book = OrderBook::new();
        let mut engine = ActionEngine::new();

        assert!(!engine.apply(&mut book, &ev(1, b'F', b'B', 10100, 100, 5)));
        assert_eq!(engine.stats().errors, 1);
        assert_eq!(engine.state, TradeState::Idle);

        // A second stray F after a completed F must not latch FillReceived.
        assert!(!engine.apply(&mut book, &ev(2, b'T', b'B', 10100, 100, 5)));
        assert!(!engine.apply(&mut book, &ev(3, b'F', b'B', 10100, 100, 5)));
        assert!(!engine.apply(&mut book, &ev(4, b'F', b'B', 10100, 100, 5)));
        assert_eq!(engine.state, TradeState::Idle);
        assert!(engine.pending.is_none());
    }

    #[test]
    fn second_trade_restarts_the_sequence() {
        let mut book = OrderBook::new();
        let mut engine = ActionEngine::new();
        assert!(engine.apply(&mut book, &ev(1, b'A', b'A', 10100, 200, 1)));

        assert!(!engine.apply(&mut book, &ev(2, b'T', b'B', 10100, 50, 100)));
        assert!(!engine.apply(&mut book, &ev(3, b'T', b'B', 10100, 80, 200)));
        // The fill must match the latest trade id.
        assert!(!engine.apply(&mut book, &ev(4, b'F', b'B', 10100, 80, 200)));
        assert!(engine.apply(&mut book, &ev(5, b'C', b'B', 10100, 0, 200)));
        assert_eq!(book.best_ask(), (10100, 120));
    }

    #[test]
    fn first_clear_is_preamble_only() {
        let mut book = OrderBook::new();
        let mut engine = ActionEngine::new();

        assert!(!engine.apply(&mut book, &ev(1, b'R', b'N', 0, 0, 0)));
        assert!(engine.apply(&mut book, &ev(2, b'A', b'B', 10000, 100, 1)));
        assert_eq!(book.best_bid(), (10000, 100));

        assert!(engine.apply(&mut book, &ev(3, b'R', b'N', 0, 0, 0)));
        assert_eq!(book.best_bid(), (0, 0));
        assert_eq!(book.active_orders(), 0);
    }

    #[test]
    fn clear_aborts_a_pending_trade() {
        let mut book = OrderBook::new();
        let mut engine = ActionEngine::new();
        assert!(!engine.apply(&mut book, &ev(1, b'R', b'N', 0, 0, 0)));
        assert!(engine.apply(&mut book, &ev(2, b'A', b'A', 10100, 100, 1)));

        assert!(!engine.apply(&mut book, &ev(3, b'T', b'B', 10100, 50, 7)));
        assert!(!engine.apply(&mut book, &ev(4, b'F', b'B', 10100, 50, 7)));
        assert!(engine.apply(&mut book, &ev(5, b'R', b'N', 0, 0, 0)));

        // The C that would have completed the trade is now a plain cancel.
        assert!(!engine.apply(&mut book, &ev(6, b'C', b'B', 10100, 0, 7)));
        assert_eq!(engine.state, TradeState::Idle);
    }

    #[test]
    fn noop_signals_without_mutating() {
        let mut book = OrderBook::new();
        let mut engine = ActionEngine::new();
        assert!(engine.apply(&mut book, &ev(1, b'N', b'N', 0, 0, 0)));
        assert_eq!(book.active_orders(), 0);
        assert_eq!(engine.stats().errors, 0);
    }

    #[test]
    fn unknown_action_counts_an_error() {
        let mut book = OrderBook::new();
        let mut engine = ActionEngine::new();
        assert!(!engine.apply(&mut book, &ev(1, b'Z', b'B', 10000, 10, 1)));
        assert_eq!(engine.stats().errors, 1);
    }

    #[test]
    fn sideless_add_and_modify_are_rejected_and_counted() {
        let mut book = OrderBook::new();
        let mut engine = ActionEngine::new();
        assert!(!engine.apply(&mut book, &ev(1, b'A', b'N', 10000, 10, 1)));
        assert!(!engine.apply(&mut book, &ev(2, b'M', b'N', 10000, 10, 1)));
        assert_eq!(book.active_orders(), 0);
        assert_eq!(engine.stats().errors, 2);
    }

    #[test]
    fn failed_book_operations_are_counted() {
        let mut book = OrderBook::new();
        let mut engine = ActionEngine::new();
        assert!(engine.apply(&mut book, &ev(1, b'A', b'B', 10000, 10, 1)));
        assert!(!engine.apply(&mut book, &ev(2, b'A', b'B', 10010, 10, 1))); // duplicate id
        assert!(!engine.apply(&mut book, &ev(3, b'M', b'B', 10010, 10, 99))); // unknown id
        assert!(!engine.apply(&mut book, &ev(4, b'C', b'B', 0, 0, 99))); // unknown id
        assert_eq!(engine.stats().errors, 3);
    }

    #[test]
    fn action_tallies_accumulate() {
        let mut book = OrderBook::new();
        let mut engine = ActionEngine::new();
        for e in [
            ev(1, b'A', b'B', 10000, 10, 1),
            ev(2, b'M', b'B', 10000, 20, 1),
            ev(3, b'N', b'N', 0, 0, 0),
            ev(4, b'C', b'B', 0, 0, 1),
        ] {
            engine.apply(&mut book, &e);
        }
        let s = engine.stats();
        assert_eq!(s.actions_processed, 4);
        assert_eq!((s.adds, s.modifies, s.noops, s.cancels), (1, 1, 1, 1));
    }
}
