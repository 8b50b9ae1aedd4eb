// src/replay.rs
use crate::decoder_csv::CsvMboDecoder;
use crate::engine::{ActionEngine, EngineStats};
use crate::orderbook::OrderBook;
use crate::parser::write_px;
use crate::snapshot::{self, SnapshotEmitter};
use log::info;
use std::io::Write;
use std::time::Duration;

/// Aggregate outcome of one replay run, for the end-of-run log block.
pub struct ReplayReport {
    pub events_processed: u64,
    pub rows_emitted: u64,
    pub active_orders: usize,
    pub price_levels: usize,
    pub levels_created: u64,
    pub total_orders: u64,
    pub best_bid: (i64, u64),
    pub best_ask: (i64, u64),
    pub snapshots_generated: u64,
    pub snapshots_skipped: u64,
    pub compression_ratio: f64,
    pub engine: EngineStats,
}

/// Drives the full pipeline over an in-memory MBO byte stream: decode each
/// record, apply it through the engine, and consult the emitter whenever the
/// engine reports the visible depth may have changed. The header row goes
/// out before any data.
pub fn run<W: Write>(
    data: &[u8],
    pool_capacity: usize,
    progress_interval: u64,
    out: &mut W,
) -> anyhow::Result<ReplayReport> {
    let mut book = OrderBook::with_capacity(pool_capacity);
    let mut engine = ActionEngine::new();
    let mut emitter = SnapshotEmitter::new();
    let mut decoder = CsvMboDecoder::new(data);

    snapshot::write_header(out)?;

    let mut events: u64 = 0;
    let mut rows: u64 = 0;
    while let Some(ev) = decoder.next_event() {
        events += 1;

        if engine.apply(&mut book, &ev) && emitter.should_emit(&mut book, ev.timestamp_ns) {
            emitter.write_current(out)?;
            rows += 1;
        }

        if progress_interval != 0 && events % progress_interval == 0 {
            info!("processed {events} events, emitted {rows} rows");
        }
    }

    Ok(ReplayReport {
        events_processed: events,
        rows_emitted: rows,
        active_orders: book.active_orders(),
        price_levels: book.price_level_count(),
        levels_created: book.price_levels_created(),
        total_orders: book.total_orders_processed(),
        best_bid: book.best_bid(),
        best_ask: book.best_ask(),
        snapshots_generated: emitter.generated(),
        snapshots_skipped: emitter.skipped(),
        compression_ratio: emitter.compression_ratio(),
        engine: *engine.stats(),
    })
}

/// Debug mode: echo parsed events to the log without building a book. Only
/// the header reaches the output stream.
pub fn debug_events<W: Write>(data: &[u8], max_events: u64, out: &mut W) -> anyhow::Result<u64> {
    snapshot::write_header(out)?;

    let mut decoder = CsvMboDecoder::new(data);
    let mut count: u64 = 0;
    let mut px = String::new();
    while count < max_events {
        let ev = match decoder.next_event() {
            Some(ev) => ev,
            None => break,
        };
        count += 1;
        px.clear();
        write_px(ev.price_raw, &mut px);
        info!(
            "event {count}: {} {} @{px} size={} oid={}",
            ev.action as char, ev.side as char, ev.size, ev.order_id
        );
    }
    Ok(count)
}

impl ReplayReport {
    pub fn log(&self, elapsed: Duration) {
        info!("total processing time: {:.3}s", elapsed.as_secs_f64());
        info!(
            "events={} rows={} snapshots_generated={} snapshots_skipped={} compression={:.2}%",
            self.events_processed,
            self.rows_emitted,
            self.snapshots_generated,
            self.snapshots_skipped,
            self.compression_ratio * 100.0
        );
        if self.rows_emitted > 0 {
            info!(
                "events per row: {:.2}",
                self.events_processed as f64 / self.rows_emitted as f64
            );
        }
        info!(
            "book: active_orders={} price_levels={} levels_created={} total_orders={} bbo_bid={:?} bbo_ask={:?}",
            self.active_orders,
            self.price_levels,
            self.levels_created,
            self.total_orders,
            self.best_bid,
            self.best_ask
        );
        let e = &self.engine;
        info!(
            "actions: processed={} adds={} modifies={} cancels={} trades={} fills={} clears={} noops={}",
            e.actions_processed, e.adds, e.modifies, e.cancels, e.trades, e.fills, e.clears, e.noops
        );
        info!(
            "trades_aggregated={} errors={}",
            e.trades_aggregated, e.errors
        );
    }
}
