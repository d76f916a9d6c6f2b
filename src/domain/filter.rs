use crate::frame::frame::{Column, Frame};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandType {
    Forest,
    Timberland,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeType {
    Live,
    Dead,
    /// Growing stock: live, merchantable-class trees (`TREECLCD == 2`).
    GrowingStock,
    /// "All live" — a distinct config value from `Live` at the API surface
    /// (spec.md §4.4.3) but an identical predicate: `STATUSCD == 1`.
    AllLive,
    /// Live growing-stock trees at or above the softwood/hardwood sawtimber
    /// diameter threshold (9.0in softwood, 11.0in hardwood).
    Sawtimber,
    All,
}

/// FIA's two-way softwood/hardwood split by species code range (SPCD < 300
/// is softwood). A `REF_SPECIES.SFTWD_HRDWD` join would be more precise but
/// this range is the standard shortcut used throughout the estimation code
/// when only SPCD is on hand.
fn is_softwood(spcd: i64) -> bool {
    spcd < 300
}

/// Build a `DOMAIN_IND` column (1.0 in-domain, 0.0 out-of-domain) for `cond`
/// under `land_type`. Never removes a row: the zero-extended indicator is
/// what lets downstream aggregation sum the full population without
/// recomputing stratum-level plot counts for each domain.
pub fn land_type_indicator(cond: &Frame, land_type: LandType) -> Column {
    let mut out = Vec::with_capacity(cond.num_rows());
    for row in 0..cond.num_rows() {
        let cond_status = cond.get(row, "COND_STATUS_CD").as_i64().unwrap_or(0);
        let site_class = cond.get(row, "SITECLCD").as_i64().unwrap_or(0);
        let reserved = cond.get(row, "RESERVCD").as_i64().unwrap_or(0);
        let in_domain = match land_type {
            LandType::All => true,
            LandType::Forest => cond_status == 1,
            LandType::Timberland => cond_status == 1 && site_class <= 6 && reserved == 0,
        };
        out.push(Some(if in_domain { 1.0 } else { 0.0 }));
    }
    Column::Float(out)
}

/// Build a `tDOMAIN_IND` column for `tree` under `tree_type`, independent of
/// (and multiplied against, by the caller) the condition-level land domain.
pub fn tree_type_indicator(tree: &Frame, tree_type: TreeType) -> Column {
    let mut out = Vec::with_capacity(tree.num_rows());
    for row in 0..tree.num_rows() {
        let statuscd = tree.get(row, "STATUSCD").as_i64().unwrap_or(0);
        let cclcd = tree.get(row, "CCLCD").as_i64();
        let treeclcd = tree.get(row, "TREECLCD").as_i64();
        let dia = tree.get(row, "DIA").as_f64();
        let spcd = tree.get(row, "SPCD").as_i64();
        let in_domain = match tree_type {
            TreeType::All => true,
            TreeType::Live | TreeType::AllLive => statuscd == 1,
            TreeType::Dead => statuscd == 2,
            TreeType::GrowingStock => {
                statuscd == 1 && treeclcd.map(|c| c == 2).unwrap_or(false) && cclcd.is_some()
            }
            TreeType::Sawtimber => {
                let threshold = spcd.map(|s| if is_softwood(s) { 9.0 } else { 11.0 }).unwrap_or(9.0);
                statuscd == 1
                    && treeclcd.map(|c| c == 2).unwrap_or(false)
                    && dia.map(|d| d >= threshold).unwrap_or(false)
            }
        };
        out.push(Some(if in_domain { 1.0 } else { 0.0 }));
    }
    Column::Float(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::value::ColumnType;
    use crate::frame::frame::Schema;

    #[test]
    fn land_type_indicator_never_changes_row_count() {
        let schema = Schema::new(vec![
            ("COND_STATUS_CD".into(), ColumnType::Int),
            ("SITECLCD".into(), ColumnType::Int),
            ("RESERVCD".into(), ColumnType::Int),
        ]);
        let frame = Frame::new(
            schema,
            vec![
                Column::Int(vec![Some(1), Some(2), Some(1)]),
                Column::Int(vec![Some(3), Some(3), Some(7)]),
                Column::Int(vec![Some(0), Some(0), Some(0)]),
            ],
        );
        let ind = land_type_indicator(&frame, LandType::Timberland);
        assert_eq!(ind.len(), 3);
        assert_eq!(ind.as_f64_vec(), vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn tree_type_indicator_live_matches_statuscd_one() {
        let schema = Schema::new(vec![
            ("STATUSCD".into(), ColumnType::Int),
            ("CCLCD".into(), ColumnType::Int),
            ("TREECLCD".into(), ColumnType::Int),
        ]);
        let frame = Frame::new(
            schema,
            vec![
                Column::Int(vec![Some(1), Some(2)]),
                Column::Int(vec![Some(2), Some(2)]),
                Column::Int(vec![Some(2), Some(2)]),
            ],
        );
        let ind = tree_type_indicator(&frame, TreeType::Live);
        assert_eq!(ind.as_f64_vec(), vec![1.0, 0.0]);
    }
}
