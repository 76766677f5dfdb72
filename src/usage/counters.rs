//! Usage counters keyed by (date, category), stored in SQLite.
//!
//! Writes go through one connection behind a mutex, and each increment is a
//! single UPSERT, so concurrent increments of the same key never lose updates.
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Days, Local, NaiveDate, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::error::AppResult;
use crate::generation::types::{GeneratorKind, MediaKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsageCategory {
    PromptEnhancements,
    ImageGenerations,
    VideoGenerations,
    FailedGenerations,
    /// A generation served by this backend.
    Backend(GeneratorKind),
}

impl UsageCategory {
    pub fn for_media(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Image => UsageCategory::ImageGenerations,
            MediaKind::Video => UsageCategory::VideoGenerations,
        }
    }

    pub fn key(&self) -> String {
        match self {
            UsageCategory::PromptEnhancements => "prompt_enhancements".to_string(),
            UsageCategory::ImageGenerations => "image_generations".to_string(),
            UsageCategory::VideoGenerations => "video_generations".to_string(),
            UsageCategory::FailedGenerations => "failed_generations".to_string(),
            UsageCategory::Backend(kind) => format!("backend:{}", kind),
        }
    }
}

impl fmt::Display for UsageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EndpointStat {
    pub count: u64,
    pub last_used: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub total_requests: u64,
    pub image_generations: u64,
    pub video_generations: u64,
    pub prompt_enhancements: u64,
    pub failed_generations: u64,
}

impl DailyStats {
    fn empty(date: NaiveDate) -> Self {
        DailyStats {
            date,
            total_requests: 0,
            image_generations: 0,
            video_generations: 0,
            prompt_enhancements: 0,
            failed_generations: 0,
        }
    }

    fn add(&mut self, category: &str, count: u64) {
        match category {
            "image_generations" => self.image_generations += count,
            "video_generations" => self.video_generations += count,
            "prompt_enhancements" => self.prompt_enhancements += count,
            "failed_generations" => self.failed_generations += count,
            _ => return,
        }
        if category != "failed_generations" {
            self.total_requests += count;
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageStats {
    pub endpoint_stats: BTreeMap<String, EndpointStat>,
    pub today: DailyStats,
    pub last_7_days: Vec<DailyStats>,
    pub total_all_time: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone)]
pub struct UsageCounters {
    conn: Arc<Mutex<Connection>>,
}

impl UsageCounters {
    pub fn open<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> AppResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> AppResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS usage_counters (
                date TEXT NOT NULL,
                category TEXT NOT NULL,
                count INTEGER NOT NULL DEFAULT 0,
                last_used TEXT NOT NULL,
                PRIMARY KEY (date, category)
            );",
        )?;
        Ok(UsageCounters { conn: Arc::new(Mutex::new(conn)) })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn increment(&self, category: UsageCategory, date: NaiveDate) -> AppResult<()> {
        self.conn().execute(
            "INSERT INTO usage_counters (date, category, count, last_used)
             VALUES (?1, ?2, 1, ?3)
             ON CONFLICT(date, category) DO UPDATE SET
                count = count + 1,
                last_used = excluded.last_used",
            params![date, category.key(), Utc::now()],
        )?;
        Ok(())
    }

    /// Increment for today, logging rather than failing on storage errors.
    pub fn record(&self, category: UsageCategory) {
        if let Err(e) = self.increment(category, Local::now().date_naive()) {
            tracing::warn!("Failed to record usage for {}: {}", category, e);
        }
    }

    pub fn snapshot(&self) -> AppResult<BTreeMap<(NaiveDate, String), u64>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT date, category, count FROM usage_counters")?;
        let rows = stmt.query_map([], |row| {
            Ok(((row.get::<_, NaiveDate>(0)?, row.get::<_, String>(1)?), row.get::<_, i64>(2)?))
        })?;
        let mut out = BTreeMap::new();
        for row in rows {
            let (key, count) = row?;
            out.insert(key, count.max(0) as u64);
        }
        Ok(out)
    }

    /// All-time count for one category.
    pub fn endpoint_count(&self, category: UsageCategory) -> AppResult<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COALESCE(SUM(count), 0) FROM usage_counters WHERE category = ?1",
            params![category.key()],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    pub fn stats(&self) -> AppResult<UsageStats> {
        self.stats_on(Local::now().date_naive())
    }

    pub fn stats_on(&self, today: NaiveDate) -> AppResult<UsageStats> {
        let week_start = today.checked_sub_days(Days::new(6)).unwrap_or(today);
        let conn = self.conn();

        let mut endpoint_stats = BTreeMap::new();
        {
            let mut stmt = conn.prepare(
                "SELECT category, SUM(count), MAX(last_used) FROM usage_counters
                 GROUP BY category ORDER BY SUM(count) DESC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<DateTime<Utc>>>(2)?,
                ))
            })?;
            for row in rows {
                let (category, count, last_used) = row?;
                endpoint_stats.insert(category, EndpointStat { count: count.max(0) as u64, last_used });
            }
        }

        let mut days: BTreeMap<NaiveDate, DailyStats> = BTreeMap::new();
        {
            let mut stmt = conn.prepare(
                "SELECT date, category, count FROM usage_counters WHERE date >= ?1 AND date <= ?2",
            )?;
            let rows = stmt.query_map(params![week_start, today], |row| {
                Ok((row.get::<_, NaiveDate>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
            })?;
            for row in rows {
                let (date, category, count) = row?;
                days.entry(date).or_insert_with(|| DailyStats::empty(date)).add(&category, count.max(0) as u64);
            }
        }

        let total_all_time = ["image_generations", "video_generations", "prompt_enhancements"]
            .iter()
            .filter_map(|k| endpoint_stats.get(*k))
            .map(|s| s.count)
            .sum();

        Ok(UsageStats {
            today: days.get(&today).cloned().unwrap_or_else(|| DailyStats::empty(today)),
            last_7_days: days.into_values().rev().collect(),
            endpoint_stats,
            total_all_time,
            timestamp: Utc::now(),
        })
    }

    /// Drop every counter.
    pub fn reset(&self) -> AppResult<()> {
        self.conn().execute("DELETE FROM usage_counters", [])?;
        tracing::warn!("Usage counters reset");
        Ok(())
    }
}
