// =============================================================================
// Bar Store — embedded SQLite-backed OHLCV persistence
// =============================================================================
//
// Single table, primary key (symbol, interval, ts). Upsert semantics: insert
// when the key is absent, overwrite OHLCV on conflict. No schema migrations
// are in scope (spec §6) — the table is created once with `CREATE TABLE IF
// NOT EXISTS` and never altered.
//
// `rusqlite::Connection` is `Send` but not `Sync`, so access is serialised
// behind a `parking_lot::Mutex` rather than shared by reference. All core
// components hold the store behind `Arc<BarStore>`.
// =============================================================================

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection};

use crate::market_model::{Bar, Interval};

/// Embedded relational store for OHLCV bars.
pub struct BarStore {
    conn: Mutex<Connection>,
}

impl BarStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn open(path: &str) -> Result<BarStore> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open bar store at {path}"))?;
        Self::init_schema(&conn)?;
        Ok(BarStore {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store, used by tests and by any caller that does not need
    /// durability across restarts.
    pub fn open_in_memory() -> Result<BarStore> {
        let conn = Connection::open_in_memory().context("failed to open in-memory bar store")?;
        Self::init_schema(&conn)?;
        Ok(BarStore {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS bars (
                symbol   TEXT    NOT NULL,
                interval TEXT    NOT NULL,
                ts       INTEGER NOT NULL,
                open     REAL    NOT NULL,
                high     REAL    NOT NULL,
                low      REAL    NOT NULL,
                close    REAL    NOT NULL,
                volume   REAL    NOT NULL,
                PRIMARY KEY (symbol, interval, ts)
            );",
        )
        .context("failed to create bars table")?;
        Ok(())
    }

    /// Insert `bar` when its key is absent, otherwise overwrite OHLCV.
    pub fn upsert(&self, bar: &Bar) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO bars (symbol, interval, ts, open, high, low, close, volume)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(symbol, interval, ts) DO UPDATE SET
                open = excluded.open,
                high = excluded.high,
                low = excluded.low,
                close = excluded.close,
                volume = excluded.volume",
            params![
                bar.symbol,
                bar.interval.as_str(),
                bar.ts,
                bar.open,
                bar.high,
                bar.low,
                bar.close,
                bar.volume
            ],
        )
        .context("failed to upsert bar")?;
        Ok(())
    }

    /// Batch variant of [`BarStore::upsert`]; all writes share one
    /// transaction so a burst of aggregated buckets is committed atomically.
    pub fn upsert_many(&self, bars: &[Bar]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().context("failed to start transaction")?;
        for bar in bars {
            tx.execute(
                "INSERT INTO bars (symbol, interval, ts, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(symbol, interval, ts) DO UPDATE SET
                    open = excluded.open,
                    high = excluded.high,
                    low = excluded.low,
                    close = excluded.close,
                    volume = excluded.volume",
                params![
                    bar.symbol,
                    bar.interval.as_str(),
                    bar.ts,
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume
                ],
            )
            .context("failed to upsert bar in batch")?;
        }
        tx.commit().context("failed to commit batch upsert")?;
        Ok(())
    }

    /// Return the most recent `limit` bars for `(symbol, interval)`, ordered
    /// oldest-first.
    pub fn recent(&self, symbol: &str, interval: Interval, limit: usize) -> Result<Vec<Bar>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT symbol, interval, ts, open, high, low, close, volume
                 FROM bars WHERE symbol = ?1 AND interval = ?2
                 ORDER BY ts DESC LIMIT ?3",
            )
            .context("failed to prepare recent-bars query")?;

        let rows = stmt
            .query_map(
                params![symbol.to_uppercase(), interval.as_str(), limit as i64],
                |row| {
                    Ok(Bar {
                        symbol: row.get(0)?,
                        interval: Interval::parse(&row.get::<_, String>(1)?)
                            .unwrap_or(Interval::M1),
                        ts: row.get(2)?,
                        open: row.get(3)?,
                        high: row.get(4)?,
                        low: row.get(5)?,
                        close: row.get(6)?,
                        volume: row.get(7)?,
                    })
                },
            )
            .context("failed to query recent bars")?;

        let mut bars: Vec<Bar> = rows.collect::<std::result::Result<_, _>>()?;
        bars.reverse(); // DESC fetch -> ascending output
        Ok(bars)
    }

    /// Total bar count for `(symbol, interval)`, used by the metadata
    /// endpoint to filter by minimum 1-minute coverage.
    pub fn count(&self, symbol: &str, interval: Interval) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM bars WHERE symbol = ?1 AND interval = ?2",
                params![symbol.to_uppercase(), interval.as_str()],
                |row| row.get(0),
            )
            .context("failed to count bars")?;
        Ok(count.max(0) as u64)
    }

    /// Distinct symbols currently present in the store.
    pub fn symbols(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT DISTINCT symbol FROM bars ORDER BY symbol ASC")
            .context("failed to prepare symbols query")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("failed to query symbols")?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ts: i64, close: f64) -> Bar {
        Bar::new("BTCUSDT", Interval::M1, ts, close, close + 1.0, close - 1.0, close, 10.0)
    }

    #[test]
    fn upsert_then_read_back() {
        let store = BarStore::open_in_memory().unwrap();
        store.upsert(&sample(0, 100.0)).unwrap();
        store.upsert(&sample(60, 101.0)).unwrap();

        let bars = store.recent("btcusdt", Interval::M1, 10).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].ts, 0);
        assert_eq!(bars[1].ts, 60);
    }

    #[test]
    fn upsert_overwrites_on_conflict() {
        let store = BarStore::open_in_memory().unwrap();
        store.upsert(&sample(0, 100.0)).unwrap();
        store.upsert(&sample(0, 105.0)).unwrap();

        let bars = store.recent("BTCUSDT", Interval::M1, 10).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].close, 105.0);
    }

    #[test]
    fn recent_respects_limit_and_ordering() {
        let store = BarStore::open_in_memory().unwrap();
        for i in 0..10 {
            store.upsert(&sample(i * 60, 100.0 + i as f64)).unwrap();
        }
        let bars = store.recent("BTCUSDT", Interval::M1, 3).unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars.iter().map(|b| b.ts).collect::<Vec<_>>(), vec![420, 480, 540]);
    }

    #[test]
    fn count_and_symbols() {
        let store = BarStore::open_in_memory().unwrap();
        store.upsert(&sample(0, 100.0)).unwrap();
        store.upsert(&sample(60, 101.0)).unwrap();
        let other = Bar::new("ETHUSDT", Interval::M1, 0, 10.0, 11.0, 9.0, 10.5, 5.0);
        store.upsert(&other).unwrap();

        assert_eq!(store.count("BTCUSDT", Interval::M1).unwrap(), 2);
        assert_eq!(store.symbols().unwrap(), vec!["BTCUSDT", "ETHUSDT"]);
    }
}
