//! Taxonomy store: deduplicated SQLite cache of discovered leaves.
//!
//! Inserts are idempotent (`INSERT OR IGNORE` over unique keys), so several
//! sessions, or several processes, can write the same leaves without
//! coordination. One connection sits behind a mutex; a busy timeout covers
//! writers in other processes.

use crate::error::{StoreError, StoreResult};
use crate::types::{region_for, Domain, LeafRecord, LineLeaf, LocationLeaf, PartialKey};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Highest schema version this build understands.
pub const SCHEMA_VERSION: i64 = 1;

/// Labels listed per group in a summary before the remainder is elided.
pub const SUMMARY_GROUP_CAP: usize = 30;

/// Metadata key recording that the legacy JSON caches were imported.
pub const LEGACY_IMPORT_KEY: &str = "legacy_json_imported_at";

/// Variant line names as other systems spell them → the portal's name.
const BUILTIN_ALIASES: &[(&str, &str)] = &[
    ("名古屋市営東山線", "東山線"),
    ("名古屋市営名城線", "名城線"),
    ("名古屋市営名港線", "名港線"),
    ("名古屋市営鶴舞線", "鶴舞線"),
    ("名古屋市営桜通線", "桜通線"),
    ("名古屋市営上飯田線", "上飯田線"),
    ("地下鉄東山線", "東山線"),
    ("地下鉄名城線", "名城線"),
    ("大阪メトロ御堂筋線", "御堂筋線"),
    ("Osaka Metro御堂筋線", "御堂筋線"),
    ("大阪メトロ谷町線", "谷町線"),
    ("大阪メトロ四つ橋線", "四つ橋線"),
    ("大阪メトロ中央線", "中央線"),
];

/// Result of inserting one leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyPresent,
}

/// Counts from a batch insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub inserted: u64,
    pub already_present: u64,
}

impl BatchOutcome {
    fn record(&mut self, outcome: InsertOutcome) {
        match outcome {
            InsertOutcome::Inserted => self.inserted += 1,
            InsertOutcome::AlreadyPresent => self.already_present += 1,
        }
    }

    pub fn merge(&mut self, other: BatchOutcome) {
        self.inserted += other.inserted;
        self.already_present += other.already_present;
    }
}

/// Row counts per level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub prefectures: u64,
    pub wards: u64,
    pub towns: u64,
    pub lines: u64,
    pub stations: u64,
    pub aliases: u64,
}

pub struct TaxonomyStore {
    conn: Mutex<Connection>,
}

impl TaxonomyStore {
    /// Open (creating if needed) the store at `path` and bring its schema up
    /// to date.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        migrate(&conn)?;
        seed_aliases(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    pub fn schema_version(&self) -> StoreResult<i64> {
        let conn = self.conn()?;
        schema_version(&conn)
    }

    // ─── writes ─────────────────────────────────────────────────────

    /// Insert one leaf. Re-inserting an existing tuple is a no-op.
    pub fn insert_leaf(&self, leaf: &LeafRecord) -> StoreResult<InsertOutcome> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let outcome = insert_in(&tx, leaf)?;
        tx.commit()?;
        Ok(outcome)
    }

    /// Insert the leaves of one visit in a single transaction.
    pub fn insert_batch(&self, leaves: &[LeafRecord]) -> StoreResult<BatchOutcome> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut outcome = BatchOutcome::default();
        for leaf in leaves {
            outcome.record(insert_in(&tx, leaf)?);
        }
        tx.commit()?;
        debug!(
            inserted = outcome.inserted,
            already_present = outcome.already_present,
            "stored batch"
        );
        Ok(outcome)
    }

    pub fn add_alias(&self, alias: &str, canonical: &str) -> StoreResult<()> {
        self.conn()?.execute(
            "INSERT INTO line_aliases (alias, canonical) VALUES (?1, ?2)
             ON CONFLICT(alias) DO UPDATE SET canonical = excluded.canonical",
            params![alias.trim(), canonical.trim()],
        )?;
        Ok(())
    }

    pub fn set_meta(&self, key: &str, value: &str) -> StoreResult<()> {
        self.conn()?.execute(
            "INSERT INTO metadata (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value],
        )?;
        Ok(())
    }

    // ─── reads ──────────────────────────────────────────────────────

    pub fn get_meta(&self, key: &str) -> StoreResult<Option<String>> {
        let value = self
            .conn()?
            .query_row("SELECT value FROM metadata WHERE key = ?1", params![key], |row| {
                row.get::<_, Option<String>>(0)
            })
            .optional()?;
        Ok(value.flatten())
    }

    /// True if at least one stored leaf lies under `key`.
    pub fn is_explored(&self, key: &PartialKey) -> StoreResult<bool> {
        let conn = self.conn()?;
        let found = match key {
            PartialKey::Location {
                region,
                prefecture,
                city,
                ward,
            } => conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM locations
                  WHERE region = ?1 AND prefecture = ?2
                    AND (?3 IS NULL OR city = ?3)
                    AND (?4 IS NULL OR ward = ?4))",
                params![canonical_region(region, prefecture), prefecture, city, ward],
                |row| row.get::<_, bool>(0),
            )?,
            PartialKey::Line {
                region,
                prefecture,
                line,
            } => conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM lines
                  WHERE region = ?1 AND prefecture = ?2
                    AND (?3 IS NULL OR line_name = ?3))",
                params![canonical_region(region, prefecture), prefecture, line],
                |row| row.get::<_, bool>(0),
            )?,
        };
        Ok(found)
    }

    /// Map a line name to its canonical form.
    ///
    /// Exact alias first, then containment against known canonical names
    /// (the longest canonical contained in `name`, else the shortest one
    /// containing it), else `name` unchanged.
    pub fn resolve_alias(&self, name: &str) -> StoreResult<String> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(String::new());
        }
        let conn = self.conn()?;
        let exact: Option<String> = conn
            .query_row(
                "SELECT canonical FROM line_aliases WHERE alias = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(canonical) = exact {
            return Ok(canonical);
        }

        let mut stmt = conn.prepare(
            "SELECT line_name FROM lines UNION SELECT canonical FROM line_aliases",
        )?;
        let known = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let contained = known
            .iter()
            .filter(|c| !c.is_empty() && name.contains(c.as_str()))
            .max_by_key(|c| c.chars().count());
        if let Some(canonical) = contained {
            return Ok(canonical.clone());
        }
        let containing = known
            .iter()
            .filter(|c| c.contains(name))
            .min_by_key(|c| c.chars().count());
        Ok(containing.cloned().unwrap_or_else(|| name.to_string()))
    }

    /// Stations of `line` in line order, optionally within one prefecture.
    ///
    /// The name is alias-resolved first; if that yields nothing the original
    /// name is tried once.
    pub fn stations(&self, prefecture: Option<&str>, line: &str) -> StoreResult<Vec<String>> {
        let resolved = self.resolve_alias(line)?;
        let stations = self.stations_exact(prefecture, &resolved)?;
        if stations.is_empty() && resolved != line.trim() {
            return self.stations_exact(prefecture, line.trim());
        }
        Ok(stations)
    }

    fn stations_exact(&self, prefecture: Option<&str>, line: &str) -> StoreResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT station FROM lines
              WHERE line_name = ?1 AND (?2 IS NULL OR prefecture = ?2)
              GROUP BY station
              ORDER BY MIN(station_order), MIN(id)",
        )?;
        let rows = stmt
            .query_map(params![line, prefecture], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Lines known in a prefecture, in first-seen order.
    pub fn lines(&self, prefecture: &str) -> StoreResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT line_name FROM lines WHERE prefecture = ?1
              GROUP BY line_name ORDER BY MIN(id)",
        )?;
        let rows = stmt
            .query_map(params![prefecture], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Towns of one ward, in first-seen order.
    pub fn towns(&self, prefecture: &str, ward: &str) -> StoreResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT town FROM locations
              WHERE prefecture = ?1 AND ward = ?2 AND town IS NOT NULL
              ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![prefecture, ward], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Every stored leaf of `domain`, in insertion order.
    pub fn leaves(&self, domain: Domain) -> StoreResult<Vec<LeafRecord>> {
        let conn = self.conn()?;
        match domain {
            Domain::Location => {
                let mut stmt = conn.prepare(
                    "SELECT region, prefecture, city, ward, town FROM locations ORDER BY id",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(LeafRecord::Location(LocationLeaf {
                            region: row.get(0)?,
                            prefecture: row.get(1)?,
                            city: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                            ward: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                            town: row.get(4)?,
                        }))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            }
            Domain::Line => {
                let mut stmt = conn.prepare(
                    "SELECT region, prefecture, line_name, station, station_order FROM lines ORDER BY id",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(LeafRecord::Line(LineLeaf {
                            region: row.get(0)?,
                            prefecture: row.get(1)?,
                            line: row.get(2)?,
                            station: row.get(3)?,
                            order: row.get(4)?,
                        }))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            }
        }
    }

    pub fn stats(&self) -> StoreResult<StoreStats> {
        let conn = self.conn()?;
        let count = |sql: &str| conn.query_row(sql, [], |row| row.get::<_, i64>(0)).map(|n| n as u64);
        Ok(StoreStats {
            prefectures: count("SELECT COUNT(DISTINCT prefecture) FROM locations")?,
            wards: count(
                "SELECT COUNT(*) FROM (SELECT DISTINCT prefecture, city, ward FROM locations)",
            )?,
            towns: count("SELECT COUNT(*) FROM locations WHERE town IS NOT NULL")?,
            lines: count("SELECT COUNT(*) FROM (SELECT DISTINCT prefecture, line_name FROM lines)")?,
            stations: count("SELECT COUNT(*) FROM lines")?,
            aliases: count("SELECT COUNT(*) FROM line_aliases")?,
        })
    }

    // ─── summaries ──────────────────────────────────────────────────

    pub fn summarize(&self, domain: Domain, prefecture: &str) -> StoreResult<String> {
        match domain {
            Domain::Location => self.summarize_locations(prefecture),
            Domain::Line => self.summarize_lines(prefecture),
        }
    }

    /// Towns of a prefecture grouped by ward.
    pub fn summarize_locations(&self, prefecture: &str) -> StoreResult<String> {
        let rows = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(
                "SELECT ward, town FROM locations
                  WHERE prefecture = ?1 AND town IS NOT NULL
                  ORDER BY id",
            )?;
            let rows = stmt
                .query_map(params![prefecture], |row| {
                    Ok((row.get::<_, Option<String>>(0)?.unwrap_or_default(), row.get::<_, String>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        if rows.is_empty() {
            return Ok(format!(
                "【{prefecture}の町丁目キャッシュ】\nキャッシュが空です。REINSから取得した選択肢を使用してください。"
            ));
        }
        let total = rows.len();
        let groups = group_in_order(rows);

        let mut summary = format!("【{prefecture}の町丁目キャッシュ】（{total}件）\n");
        summary.push_str("以下はREINSで実際に選択可能な町丁目です。推薦する際はこのリストから選んでください。\n\n");
        push_groups(&mut summary, &groups);
        Ok(summary)
    }

    /// Stations of a prefecture grouped by line, in line order.
    pub fn summarize_lines(&self, prefecture: &str) -> StoreResult<String> {
        let rows = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(
                "SELECT l.line_name, l.station FROM lines l
                   JOIN (SELECT line_name, MIN(id) AS first_id FROM lines
                          WHERE prefecture = ?1 GROUP BY line_name) f
                     ON f.line_name = l.line_name
                  WHERE l.prefecture = ?1
                  ORDER BY f.first_id, l.station_order, l.id",
            )?;
            let rows = stmt
                .query_map(params![prefecture], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        if rows.is_empty() {
            return Ok(format!(
                "【{prefecture}の沿線キャッシュ】\nキャッシュが空です。REINSから取得した選択肢を使用してください。"
            ));
        }
        let total = rows.len();
        let groups = group_in_order(rows);

        let mut summary = format!(
            "【{prefecture}の沿線キャッシュ】（{}路線、{total}駅）\n",
            groups.len()
        );
        summary.push_str("以下はREINSで実際に選択可能な沿線・駅です。推薦する際はこのリストから選んでください。\n\n");
        push_groups(&mut summary, &groups);
        Ok(summary)
    }

    // ─── legacy import ──────────────────────────────────────────────

    /// Import the JSON caches written by the previous cache service.
    ///
    /// Runs once per database: the import is recorded under
    /// [`LEGACY_IMPORT_KEY`] and later calls return `Ok(None)`. Missing files
    /// are skipped.
    pub fn import_legacy_json(
        &self,
        location_cache: Option<&Path>,
        line_cache: Option<&Path>,
    ) -> StoreResult<Option<BatchOutcome>> {
        if let Some(at) = self.get_meta(LEGACY_IMPORT_KEY)? {
            debug!(imported_at = %at, "legacy caches already imported");
            return Ok(None);
        }

        let mut leaves = Vec::new();
        if let Some(path) = location_cache.filter(|p| p.exists()) {
            let cache: LegacyCache<LegacyLocationPrefecture> =
                serde_json::from_str(&std::fs::read_to_string(path)?)?;
            legacy_location_leaves(cache, &mut leaves);
        }
        if let Some(path) = line_cache.filter(|p| p.exists()) {
            let cache: LegacyCache<LegacyLinePrefecture> =
                serde_json::from_str(&std::fs::read_to_string(path)?)?;
            legacy_line_leaves(cache, &mut leaves);
        }

        let outcome = self.insert_batch(&leaves)?;
        self.set_meta(LEGACY_IMPORT_KEY, &chrono::Utc::now().to_rfc3339())?;
        info!(
            inserted = outcome.inserted,
            already_present = outcome.already_present,
            "imported legacy caches"
        );
        Ok(Some(outcome))
    }
}

fn schema_version(conn: &Connection) -> StoreResult<i64> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

fn migrate(conn: &Connection) -> StoreResult<()> {
    let current = schema_version(conn)?;
    if current > SCHEMA_VERSION {
        return Err(StoreError::UnsupportedSchemaVersion {
            found: current,
            supported: SCHEMA_VERSION,
        });
    }

    if current < 1 {
        conn.execute_batch(include_str!("../migrations/0001_taxonomy.sql"))?;
        conn.execute("PRAGMA user_version = 1", []).map(|_| ())?;
    }

    Ok(())
}

fn seed_aliases(conn: &Connection) -> StoreResult<()> {
    let mut stmt = conn.prepare("INSERT OR IGNORE INTO line_aliases (alias, canonical) VALUES (?1, ?2)")?;
    for (alias, canonical) in BUILTIN_ALIASES {
        stmt.execute(params![alias, canonical])?;
    }
    Ok(())
}

fn canonical_region(region: &str, prefecture: &str) -> String {
    region_for(prefecture).unwrap_or(region).to_string()
}

fn insert_in(tx: &Transaction<'_>, leaf: &LeafRecord) -> StoreResult<InsertOutcome> {
    let region = canonical_region(
        match leaf {
            LeafRecord::Location(l) => &l.region,
            LeafRecord::Line(l) => &l.region,
        },
        leaf.prefecture(),
    );

    let changed = match leaf {
        LeafRecord::Location(l) => tx.execute(
            "INSERT OR IGNORE INTO locations (region, prefecture, city, ward, town)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![region, l.prefecture, l.city, l.ward, l.town],
        )?,
        LeafRecord::Line(l) => {
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM lines
                  WHERE region = ?1 AND prefecture = ?2 AND line_name = ?3 AND station = ?4)",
                params![region, l.prefecture, l.line, l.station],
                |row| row.get(0),
            )?;
            if exists {
                0
            } else {
                // Orders only grow within a line; a late station goes last.
                let max_order: Option<i64> = tx.query_row(
                    "SELECT MAX(station_order) FROM lines
                      WHERE region = ?1 AND prefecture = ?2 AND line_name = ?3",
                    params![region, l.prefecture, l.line],
                    |row| row.get(0),
                )?;
                let order = match max_order {
                    Some(max) => (l.order as i64).max(max + 1),
                    None => l.order as i64,
                };
                tx.execute(
                    "INSERT OR IGNORE INTO lines (region, prefecture, line_name, station, station_order)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![region, l.prefecture, l.line, l.station, order],
                )?
            }
        }
    };

    Ok(if changed > 0 {
        InsertOutcome::Inserted
    } else {
        InsertOutcome::AlreadyPresent
    })
}

/// Group `(parent, label)` rows by parent, keeping first-seen order.
fn group_in_order(rows: Vec<(String, String)>) -> Vec<(String, Vec<String>)> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for (parent, label) in rows {
        match groups.iter_mut().find(|(p, _)| *p == parent) {
            Some((_, labels)) => labels.push(label),
            None => groups.push((parent, vec![label])),
        }
    }
    groups
}

fn push_groups(summary: &mut String, groups: &[(String, Vec<String>)]) {
    for (parent, labels) in groups {
        summary.push_str(&format!("■ {parent}\n"));
        let shown: Vec<&str> = labels.iter().take(SUMMARY_GROUP_CAP).map(String::as_str).collect();
        summary.push_str(&format!("  {}", shown.join(", ")));
        if labels.len() > SUMMARY_GROUP_CAP {
            summary.push_str(&format!(" ... 他{}件", labels.len() - SUMMARY_GROUP_CAP));
        }
        summary.push('\n');
    }
}

// ─── legacy JSON shapes ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct LegacyCache<T> {
    #[serde(default = "BTreeMap::new")]
    structure: BTreeMap<String, T>,
}

#[derive(Debug, Default, Deserialize)]
struct LegacyLocationPrefecture {
    #[serde(default)]
    regions: BTreeMap<String, LegacyCity>,
}

#[derive(Debug, Default, Deserialize)]
struct LegacyCity {
    #[serde(default)]
    wards: BTreeMap<String, LegacyWard>,
}

#[derive(Debug, Default, Deserialize)]
struct LegacyWard {
    #[serde(default)]
    towns: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LegacyLinePrefecture {
    #[serde(default)]
    lines: BTreeMap<String, LegacyLine>,
}

#[derive(Debug, Default, Deserialize)]
struct LegacyLine {
    #[serde(default)]
    stations: Vec<String>,
}

fn legacy_location_leaves(cache: LegacyCache<LegacyLocationPrefecture>, out: &mut Vec<LeafRecord>) {
    for (prefecture, pref) in cache.structure {
        let Some(region) = region_for(&prefecture) else {
            warn!(%prefecture, "skipping legacy entry with unknown prefecture");
            continue;
        };
        for (city, city_data) in pref.regions {
            for (ward, ward_data) in city_data.wards {
                let leaf = |town: Option<String>| {
                    LeafRecord::Location(LocationLeaf {
                        region: region.to_string(),
                        prefecture: prefecture.clone(),
                        city: city.clone(),
                        ward: ward.clone(),
                        town,
                    })
                };
                if ward_data.towns.is_empty() {
                    out.push(leaf(None));
                } else {
                    out.extend(ward_data.towns.into_iter().map(|t| leaf(Some(t))));
                }
            }
        }
    }
}

fn legacy_line_leaves(cache: LegacyCache<LegacyLinePrefecture>, out: &mut Vec<LeafRecord>) {
    for (prefecture, pref) in cache.structure {
        let Some(region) = region_for(&prefecture) else {
            warn!(%prefecture, "skipping legacy entry with unknown prefecture");
            continue;
        };
        for (line, line_data) in pref.lines {
            for (order, station) in line_data.stations.into_iter().enumerate() {
                out.push(LeafRecord::Line(LineLeaf {
                    region: region.to_string(),
                    prefecture: prefecture.clone(),
                    line: line.clone(),
                    station,
                    order: order as u32,
                }));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn town(pref: &str, ward: &str, town: Option<&str>) -> LeafRecord {
        LeafRecord::Location(LocationLeaf {
            region: "東日本".into(),
            prefecture: pref.into(),
            city: "23区".into(),
            ward: ward.into(),
            town: town.map(str::to_string),
        })
    }

    fn station(line: &str, station: &str, order: u32) -> LeafRecord {
        LeafRecord::Line(LineLeaf {
            region: "中部圏".into(),
            prefecture: "愛知県".into(),
            line: line.into(),
            station: station.into(),
            order,
        })
    }

    #[test]
    fn test_schema_version() {
        let store = TaxonomyStore::open_in_memory().unwrap();
        assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_insert_is_idempotent() {
        let store = TaxonomyStore::open_in_memory().unwrap();
        let leaf = town("東京都", "港区", Some("芝"));
        assert_eq!(store.insert_leaf(&leaf).unwrap(), InsertOutcome::Inserted);
        assert_eq!(store.insert_leaf(&leaf).unwrap(), InsertOutcome::AlreadyPresent);
        assert_eq!(store.leaves(Domain::Location).unwrap().len(), 1);
    }

    #[test]
    fn test_null_town_deduplicates() {
        let store = TaxonomyStore::open_in_memory().unwrap();
        let ward = town("東京都", "港区", None);
        assert_eq!(store.insert_leaf(&ward).unwrap(), InsertOutcome::Inserted);
        assert_eq!(store.insert_leaf(&ward).unwrap(), InsertOutcome::AlreadyPresent);
        let stats = store.stats().unwrap();
        assert_eq!(stats.wards, 1);
        assert_eq!(stats.towns, 0);
    }

    #[test]
    fn test_region_recomputed_from_prefecture() {
        let store = TaxonomyStore::open_in_memory().unwrap();
        let mut leaf = LocationLeaf {
            region: "西日本".into(),
            prefecture: "大阪府".into(),
            city: "大阪市".into(),
            ward: "北区".into(),
            town: Some("梅田".into()),
        };
        store.insert_leaf(&LeafRecord::Location(leaf.clone())).unwrap();
        leaf.region = "近畿圏".into();
        assert_eq!(
            store.insert_leaf(&LeafRecord::Location(leaf)).unwrap(),
            InsertOutcome::AlreadyPresent
        );
        match &store.leaves(Domain::Location).unwrap()[0] {
            LeafRecord::Location(l) => assert_eq!(l.region, "近畿圏"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_is_explored_prefixes() {
        let store = TaxonomyStore::open_in_memory().unwrap();
        store.insert_leaf(&town("東京都", "港区", Some("芝"))).unwrap();

        let key = |city: Option<&str>, ward: Option<&str>| PartialKey::Location {
            region: "東日本".into(),
            prefecture: "東京都".into(),
            city: city.map(str::to_string),
            ward: ward.map(str::to_string),
        };
        assert!(store.is_explored(&key(None, None)).unwrap());
        assert!(store.is_explored(&key(Some("23区"), Some("港区"))).unwrap());
        assert!(!store.is_explored(&key(Some("23区"), Some("千代田区"))).unwrap());
    }

    #[test]
    fn test_station_order_never_reused() {
        let store = TaxonomyStore::open_in_memory().unwrap();
        store
            .insert_batch(&[station("東山線", "名古屋", 0), station("東山線", "伏見", 1)])
            .unwrap();
        // A station first seen later goes after the existing ones.
        store.insert_leaf(&station("東山線", "栄", 0)).unwrap();
        let orders: Vec<u32> = store
            .leaves(Domain::Line)
            .unwrap()
            .into_iter()
            .filter_map(|l| match l {
                LeafRecord::Line(l) => Some(l.order),
                _ => None,
            })
            .collect();
        assert_eq!(orders, vec![0, 1, 2]);
        assert_eq!(store.stations(None, "東山線").unwrap(), vec!["名古屋", "伏見", "栄"]);
    }

    #[test]
    fn test_alias_resolution() {
        let store = TaxonomyStore::open_in_memory().unwrap();
        store
            .insert_batch(&[station("東山線", "名古屋", 0), station("東山線", "栄", 1)])
            .unwrap();
        assert_eq!(store.resolve_alias("名古屋市営東山線").unwrap(), "東山線");
        assert_eq!(
            store.stations(Some("愛知県"), "名古屋市営東山線").unwrap(),
            store.stations(Some("愛知県"), "東山線").unwrap()
        );

        // Containment against known names.
        assert_eq!(store.resolve_alias("市営地下鉄東山線").unwrap(), "東山線");
        assert_eq!(store.resolve_alias("知らない線").unwrap(), "知らない線");

        store.add_alias("ひがしやません", "東山線").unwrap();
        assert_eq!(store.resolve_alias("ひがしやません").unwrap(), "東山線");
    }

    #[test]
    fn test_alias_falls_back_to_original_name() {
        let store = TaxonomyStore::open_in_memory().unwrap();
        store.add_alias("名城線", "地下鉄名城線").unwrap();
        store.insert_leaf(&station("名城線", "大曽根", 0)).unwrap();
        assert_eq!(store.stations(None, "名城線").unwrap(), vec!["大曽根"]);
    }

    #[test]
    fn test_location_summary_caps_groups() {
        let store = TaxonomyStore::open_in_memory().unwrap();
        let leaves: Vec<LeafRecord> = (1..=32)
            .map(|i| town("東京都", "港区", Some(&format!("町{i}"))))
            .chain(std::iter::once(town("東京都", "千代田区", Some("丸の内"))))
            .collect();
        store.insert_batch(&leaves).unwrap();

        let summary = store.summarize(Domain::Location, "東京都").unwrap();
        assert!(summary.starts_with("【東京都の町丁目キャッシュ】（33件）\n"));
        assert!(summary.contains("■ 港区\n  町1, 町2,"));
        assert!(summary.contains("町30 ... 他2件\n"));
        assert!(!summary.contains("町31"));
        assert!(summary.contains("■ 千代田区\n  丸の内\n"));
    }

    #[test]
    fn test_empty_summaries() {
        let store = TaxonomyStore::open_in_memory().unwrap();
        assert!(store
            .summarize(Domain::Location, "沖縄県")
            .unwrap()
            .contains("キャッシュが空です"));
        assert!(store
            .summarize(Domain::Line, "沖縄県")
            .unwrap()
            .starts_with("【沖縄県の沿線キャッシュ】\n"));
    }

    #[test]
    fn test_line_summary() {
        let store = TaxonomyStore::open_in_memory().unwrap();
        store
            .insert_batch(&[
                station("東山線", "名古屋", 0),
                station("東山線", "栄", 1),
                station("名城線", "大曽根", 0),
            ])
            .unwrap();
        let summary = store.summarize(Domain::Line, "愛知県").unwrap();
        assert!(summary.starts_with("【愛知県の沿線キャッシュ】（2路線、3駅）\n"));
        assert!(summary.contains("■ 東山線\n  名古屋, 栄\n■ 名城線\n  大曽根\n"));
    }

    #[test]
    fn test_meta_roundtrip() {
        let store = TaxonomyStore::open_in_memory().unwrap();
        assert_eq!(store.get_meta("last_run").unwrap(), None);
        store.set_meta("last_run", "a").unwrap();
        store.set_meta("last_run", "b").unwrap();
        assert_eq!(store.get_meta("last_run").unwrap().as_deref(), Some("b"));
    }
}
