use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use tracing::debug;

use crate::db::value::ColumnType;
use crate::frame::frame::{Column, Frame, Schema};
use crate::frame::lazy::LazyFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinHow {
    Inner,
    Left,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStrategy {
    /// Build a hash map from the smaller side and broadcast-probe it —
    /// cheap when one side is a small reference table (POP_STRATUM,
    /// POP_EVAL, species reference) against a much larger fact table.
    Broadcast,
    /// Build hash maps on both sides' keys; used when both sides are large
    /// enough that neither comfortably fits as a broadcast-probed map.
    Hash,
}

/// Row count above which neither side of a join is assumed to be a cheap
/// reference table, so the full hash strategy is used instead of broadcast.
pub const BROADCAST_THRESHOLD_ROWS: usize = 10_000;

pub fn choose_strategy(left_rows: usize, right_rows: usize) -> JoinStrategy {
    if left_rows.min(right_rows) <= BROADCAST_THRESHOLD_ROWS {
        JoinStrategy::Broadcast
    } else {
        JoinStrategy::Hash
    }
}

fn key_at(frame: &Frame, cols: &[usize], row: usize) -> Vec<String> {
    cols.iter().map(|&c| frame.column_at(c).get(row).to_string()).collect()
}

/// Execute an equi-join on `left_keys`/`right_keys` (same arity, positionally
/// paired). Right-side columns are suffixed with `_r` wherever a name
/// collides with a left-side column, mirroring how stratification joins
/// keep both sides' CN columns distinguishable after collecting.
pub fn hash_join(left: &Frame, right: &Frame, left_keys: &[&str], right_keys: &[&str], how: JoinHow) -> Frame {
    assert_eq!(left_keys.len(), right_keys.len(), "hash_join: key arity mismatch");
    let left_idx: Vec<usize> =
        left_keys.iter().map(|&k| left.schema().position(k).expect("hash_join: unknown left key")).collect();
    let right_idx: Vec<usize> =
        right_keys.iter().map(|&k| right.schema().position(k).expect("hash_join: unknown right key")).collect();

    let mut right_index: HashMap<Vec<String>, Vec<usize>> = HashMap::new();
    for r in 0..right.num_rows() {
        right_index.entry(key_at(right, &right_idx, r)).or_default().push(r);
    }

    let mut left_rows: Vec<usize> = Vec::new();
    let mut right_rows: Vec<Option<usize>> = Vec::new();
    for l in 0..left.num_rows() {
        let k = key_at(left, &left_idx, l);
        match right_index.get(&k) {
            Some(matches) => {
                for &r in matches {
                    left_rows.push(l);
                    right_rows.push(Some(r));
                }
            }
            None => {
                if how == JoinHow::Left {
                    left_rows.push(l);
                    right_rows.push(None);
                }
            }
        }
    }

    debug!(
        left_rows = left.num_rows(),
        right_rows = right.num_rows(),
        out_rows = left_rows.len(),
        "hash_join"
    );

    combine(left, right, &left_rows, &right_rows, &right_idx)
}

fn combine(
    left: &Frame,
    right: &Frame,
    left_rows: &[usize],
    right_rows: &[Option<usize>],
    right_key_idx: &[usize],
) -> Frame {
    let left_gathered = left.gather(left_rows);

    let mut schema_cols: Vec<(String, ColumnType)> = left_gathered.schema().names().iter().cloned().zip(
        left_gathered.schema().names().iter().map(|n| left_gathered.schema().type_of(n).unwrap()),
    ).collect();

    let right_non_key_positions: Vec<usize> = (0..right.schema().len())
        .filter(|i| !right_key_idx.contains(i))
        .collect();

    let mut right_columns: Vec<Column> = Vec::with_capacity(right_non_key_positions.len());
    for &pos in &right_non_key_positions {
        let mut name = right.schema().names()[pos].clone();
        if left_gathered.schema().contains(&name) {
            name = format!("{name}_r");
        }
        let ty = right.schema().type_of(&right.schema().names()[pos]).unwrap();
        schema_cols.push((name, ty));

        let col = right.column_at(pos);
        let gathered = match col {
            Column::Int(v) => Column::Int(right_rows.iter().map(|r| r.and_then(|i| v[i])).collect()),
            Column::Float(v) => Column::Float(right_rows.iter().map(|r| r.and_then(|i| v[i])).collect()),
            Column::Text(v) => Column::Text(right_rows.iter().map(|r| r.and_then(|i| v[i].clone())).collect()),
        };
        right_columns.push(gathered);
    }

    let mut all_columns: Vec<Column> =
        (0..left_gathered.schema().len()).map(|i| left_gathered.column_at(i).clone()).collect();
    all_columns.extend(right_columns);

    Frame::new(Schema::new(schema_cols), all_columns)
}

/// The FIA-aware join patterns named in spec.md §4.2 ("Specialized
/// helpers"), expressed as plain functions over `LazyFrame` rather than a
/// dedicated manager object — a `LazyFrame`'s own `.join()` already carries
/// the plan; these just pin down the keys and join kind for each recurring
/// pattern so callers don't repeat them.
pub struct JoinManager;

impl JoinManager {
    /// TREE joined to COND on `(PLT_CN, CONDID)` — the join every per-tree
    /// estimator uses to reach the condition's land-type domain indicator
    /// and `PROP_BASIS`.
    pub fn join_tree_condition(tree: LazyFrame, cond: LazyFrame) -> LazyFrame {
        tree.join(
            cond,
            vec!["PLT_CN".to_string(), "CONDID".to_string()],
            vec!["PLT_CN".to_string(), "CONDID".to_string()],
            JoinHow::Inner,
        )
    }

    /// TREE joined to PLOT on `PLT_CN` — needed for `MACRO_BREAKPOINT_DIA`
    /// and `REMPER`, which live on PLOT rather than COND or TREE.
    pub fn join_tree_plot(tree: LazyFrame, plot: LazyFrame) -> LazyFrame {
        tree.join(plot, vec!["PLT_CN".to_string()], vec!["CN".to_string()], JoinHow::Inner)
    }

    /// PLOT joined through `POP_PLOT_STRATUM_ASSGN` to `POP_STRATUM` (already
    /// carrying `POP_ESTN_UNIT` columns per `StratificationLoader::load`) —
    /// the join that attaches `EXPNS`/`ADJ_FACTOR_*`/`W_H` to each plot.
    pub fn join_stratification(plot: LazyFrame, stratification: LazyFrame) -> LazyFrame {
        plot.join(
            stratification,
            vec!["CN".to_string()],
            vec!["PLT_CN".to_string()],
            JoinHow::Inner,
        )
    }
}

/// Fingerprint for a bounded LRU cache of join results keyed by the shape of
/// the join, not its row contents — two joins on the same table pair and
/// keys with the same row counts are treated as the same cache entry,
/// matching how repeated per-group aggregation calls re-join the same
/// stratification tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JoinFingerprint {
    pub left_rows: usize,
    pub right_rows: usize,
    pub left_keys: Vec<String>,
    pub right_keys: Vec<String>,
    pub how: bool,
}

impl JoinFingerprint {
    pub fn new(left: &Frame, right: &Frame, left_keys: &[&str], right_keys: &[&str], how: JoinHow) -> Self {
        Self {
            left_rows: left.num_rows(),
            right_rows: right.num_rows(),
            left_keys: left_keys.iter().map(|s| s.to_string()).collect(),
            right_keys: right_keys.iter().map(|s| s.to_string()).collect(),
            how: how == JoinHow::Left,
        }
    }

    fn hash_u64(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.hash(&mut h);
        h.finish()
    }
}

/// Bounded, thread-safe cache of materialized join results. Eviction is
/// strict LRU by insertion/access order; capacity is small because entries
/// are whole frames.
pub struct JoinCache {
    capacity: usize,
    entries: Mutex<Vec<(u64, Frame)>>,
}

impl JoinCache {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, entries: Mutex::new(Vec::new()) }
    }

    pub fn get(&self, fp: &JoinFingerprint) -> Option<Frame> {
        let key = fp.hash_u64();
        let mut entries = self.entries.lock().expect("join cache mutex poisoned");
        if let Some(pos) = entries.iter().position(|(k, _)| *k == key) {
            let (_, frame) = entries.remove(pos);
            entries.push((key, frame.clone()));
            return Some(frame);
        }
        None
    }

    pub fn put(&self, fp: &JoinFingerprint, frame: Frame) {
        let key = fp.hash_u64();
        let mut entries = self.entries.lock().expect("join cache mutex poisoned");
        if let Some(pos) = entries.iter().position(|(k, _)| *k == key) {
            entries.remove(pos);
        }
        entries.push((key, frame));
        while entries.len() > self.capacity {
            entries.remove(0);
        }
    }
}
