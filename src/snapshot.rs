// src/snapshot.rs
use crate::orderbook::{Depth10, OrderBook, DEPTH};
use crate::parser::write_px;
use std::fmt::Write as _;
use std::io::{self, Write};

/// MBP-10 snapshot row: the event timestamp plus ten levels per side.
#[derive(Clone, Copy, Debug, Default)]
pub struct Mbp10 {
    pub ts_event: u64,
    pub depth: Depth10,
}

/// Change-detecting emitter. A row is produced iff the current depth
/// differs from the previously emitted one; timestamps never participate in
/// the comparison, so repeated events that leave the top ten levels intact
/// produce no output.
pub struct SnapshotEmitter {
    current: Mbp10,
    previous: Mbp10,
    has_previous: bool,
    line: String,
    generated: u64,
    skipped: u64,
}

impl SnapshotEmitter {
    pub fn new() -> Self {
        Self {
            current: Mbp10::default(),
            previous: Mbp10::default(),
            has_previous: false,
            line: String::with_capacity(512),
            generated: 0,
            skipped: 0,
        }
    }

    /// Refreshes `current` from the book and reports whether it should be
    /// written out. The very first consultation always emits.
    pub fn should_emit(&mut self, book: &mut OrderBook, ts_event: u64) -> bool {
        self.current.depth = book.top10();
        self.current.ts_event = ts_event;

        if self.has_previous && self.current.depth == self.previous.depth {
            self.skipped += 1;
            return false;
        }
        self.previous = self.current;
        self.has_previous = true;
        self.generated += 1;
        true
    }

    /// Writes the current snapshot as one newline-terminated CSV row.
    pub fn write_current<W: Write>(&mut self, w: &mut W) -> io::Result<()> {
        self.line.clear();
        format_row(&self.current, &mut self.line);
        w.write_all(self.line.as_bytes())
    }

    pub fn generated(&self) -> u64 {
        self.generated
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Share of consultations that produced no row.
    pub fn compression_ratio(&self) -> f64 {
        let total = self.generated + self.skipped;
        if total > 0 {
            self.skipped as f64 / total as f64
        } else {
            0.0
        }
    }
}

impl Default for SnapshotEmitter {
    fn default() -> Self {
        Self::new()
    }
}

/// Column header preceding all data rows: `ts_event`, then ten
/// `bid_px_NN,bid_sz_NN` pairs, then ten `ask_px_NN,ask_sz_NN` pairs.
pub fn write_header<W: Write>(w: &mut W) -> io::Result<()> {
    let mut header = String::with_capacity(512);
    header.push_str("ts_event");
    for i in 0..DEPTH {
        let _ = write!(header, ",bid_px_{i:02},bid_sz_{i:02}");
    }
    for i in 0..DEPTH {
        let _ = write!(header, ",ask_px_{i:02},ask_sz_{i:02}");
    }
    header.push('\n');
    w.write_all(header.as_bytes())
}

/// Empty slots (price == 0) emit an empty field for both price and size.
fn format_row(snap: &Mbp10, out: &mut String) {
    let _ = write!(out, "{}", snap.ts_event);
    for i in 0..DEPTH {
        out.push(',');
        if snap.depth.bid_px[i] != 0 {
            write_px(snap.depth.bid_px[i], out);
            let _ = write!(out, ",{}", snap.depth.bid_sz[i]);
        } else {
            out.push(',');
        }
    }
    for i in 0..DEPTH {
        out.push(',');
        if snap.depth.ask_px[i] != 0 {
            write_px(snap.depth.ask_px[i], out);
            let _ = write!(out, ",{}", snap.depth.ask_sz[i]);
        } else {
            out.push(',');
        }
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Side;

    fn row_for(book: &mut OrderBook, ts: u64) -> String {
        let mut em = SnapshotEmitter::new();
        assert!(em.should_emit(book, ts));
        let mut buf = Vec::new();
        em.write_current(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn header_layout() {
        let mut buf = Vec::new();
        write_header(&mut buf).unwrap();
        let header = String::from_utf8(buf).unwrap();
        assert!(header.starts_with("ts_event,bid_px_00,bid_sz_00,bid_px_01"));
        assert!(header.ends_with("ask_px_09,ask_sz_09\n"));
        assert_eq!(header.trim_end().split(',').count(), 41);
    }

    #[test]
    fn empty_book_row_is_all_empty_fields() {
        let mut book = OrderBook::new();
        let row = row_for(&mut book, 42);
        assert_eq!(row, format!("42{}\n", ",".repeat(40)));
    }

    #[test]
    fn populated_row_formats_prices_and_sizes() {
        let mut book = OrderBook::new();
        assert!(book.add_order(1, 10050, 100, Side::Bid, 1000));
        assert!(book.add_order(2, 10100, 200, Side::Ask, 2000));

        let row = row_for(&mut book, 2000);
        let fields: Vec<&str> = row.trim_end().split(',').collect();
        assert_eq!(fields.len(), 41);
        assert_eq!(fields[0], "2000");
        assert_eq!((fields[1], fields[2]), ("100.50", "100"));
        assert_eq!((fields[3], fields[4]), ("", ""));
        assert_eq!((fields[21], fields[22]), ("101", "200"));
        assert_eq!((fields[23], fields[24]), ("", ""));
    }

    #[test]
    fn first_consultation_always_emits() {
        let mut book = OrderBook::new();
        let mut em = SnapshotEmitter::new();
        assert!(em.should_emit(&mut book, 1));
        assert_eq!(em.generated(), 1);
    }

    #[test]
    fn unchanged_depth_is_suppressed_across_timestamps() {
        let mut book = OrderBook::new();
        assert!(book.add_order(1, 10050, 100, Side::Bid, 1));
        let mut em = SnapshotEmitter::new();

        assert!(em.should_emit(&mut book, 100));
        assert!(!em.should_emit(&mut book, 200));
        assert!(!em.should_emit(&mut book, 300));
        assert_eq!(em.skipped(), 2);

        assert!(book.modify_order(1, 10050, 150));
        assert!(em.should_emit(&mut book, 400));
        assert_eq!(em.generated(), 2);
    }

    #[test]
    fn depth_past_ten_levels_does_not_trigger_emission() {
        let mut book = OrderBook::new();
        for i in 0..11u64 {
            assert!(book.add_order(i, 10100 + i as i64, 10, Side::Ask, i));
        }
        let mut em = SnapshotEmitter::new();
        assert!(em.should_emit(&mut book, 1));

        // The 12th-best ask is invisible in MBP-10; nothing to emit.
        assert!(book.add_order(99, 10100 + 11, 10, Side::Ask, 99));
        assert!(!em.should_emit(&mut book, 2));
    }

    #[test]
    fn compression_ratio_tracks_skips() {
        let mut book = OrderBook::new();
        let mut em = SnapshotEmitter::new();
        assert!(em.should_emit(&mut book, 1));
        assert!(!em.should_emit(&mut book, 2));
        assert!(!em.should_emit(&mut book, 3));
        assert!(!em.should_emit(&mut book, 4));
        assert!((em.compression_ratio() - 0.75).abs() < 1e-9);
    }
}
