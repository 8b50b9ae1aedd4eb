use std::time::Instant;

// Pull the book directly into this bench to avoid compiling the full binary graph
#[path = "../orderbook.rs"]
mod orderbook;

// Minimal parser types to satisfy the book's interfaces
mod parser {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Side {
        Bid,
        Ask,
    }

    impl Side {
        #[inline]
        pub fn opposite(self) -> Side {
            match self {
                Side::Bid => Side::Ask,
                Side::Ask => Side::Bid,
            }
        }
    }
}

use crate::orderbook::OrderBook;
use crate::parser::Side;

fn parse_arg_u64(args: &[String], idx: usize, default: u64) -> u64 {
    args.get(idx).and_then(|s| s.parse::<u64>().ok()).unwrap_or(default)
}

fn main() {
    // Args: [order_count] [price_levels]
    let args: Vec<String> = std::env::args().collect();
    let order_count = parse_arg_u64(&args, 1, 200_000);
    let price_levels = parse_arg_u64(&args, 2, 500);

    let mut book = OrderBook::new();
    let start_total = Instant::now();

    // Phase 1: adds spread across both sides
    let t0 = Instant::now();
    for i in 0..order_count {
        let px = 1_000_000i64 + (i % price_levels) as i64;
        let sz = 100 + (i % 50) as u32;
        let side = if (i & 1) == 0 { Side::Bid } else { Side::Ask };
        book.add_order(i, px, sz, side, i);
    }
    let adds_dur = t0.elapsed();

    // Phase 2: modifies on random orders (half in place, half price moves)
    let t1 = Instant::now();
    let mut x: u64 = 0x9E3779B97F4A7C15; // xorshift64* state
    let mods = order_count / 2;
    for _ in 0..mods {
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        x = x.wrapping_mul(0x2545F4914F6CDD1D);
        let id = x % order_count;
        let px = 1_000_000i64 + (x % price_levels) as i64;
        let sz = 1 + (x % 200) as u32;
        book.modify_order(id, px, sz);
    }
    let mods_dur = t1.elapsed();

    // Phase 3: trades against the best ask
    let t2 = Instant::now();
    let trades = order_count / 10;
    let mut executed = 0u64;
    for _ in 0..trades {
        let (px, _) = book.best_ask();
        if px == 0 {
            break;
        }
        if book.execute_trade(px, 150, Side::Bid) {
            executed += 1;
        }
    }
    let trades_dur = t2.elapsed();

    // Phase 4: cancel every 3rd order
    let t3 = Instant::now();
    for i in (0..order_count).step_by(3) {
        book.cancel_order(i);
    }
    let dels_dur = t3.elapsed();

    let _ = book.top10();
    let total_dur = start_total.elapsed();
    let total_events = order_count + mods + trades + order_count / 3;

    println!(
        "bench_book: orders={} levels={} executed_trades={} live_orders={} total_time_ms={:.3} adds_ms={:.3} mods_ms={:.3} trades_ms={:.3} dels_ms={:.3} throughput_meps={:.3}",
        order_count,
        price_levels,
        executed,
        book.active_orders(),
        total_dur.as_secs_f64() * 1000.0,
        adds_dur.as_secs_f64() * 1000.0,
        mods_dur.as_secs_f64() * 1000.0,
        trades_dur.as_secs_f64() * 1000.0,
        dels_dur.as_secs_f64() * 1000.0,
        (total_events as f64) / 1_000_000.0 / total_dur.as_secs_f64(),
    );
}
