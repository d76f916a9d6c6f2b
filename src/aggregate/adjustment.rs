//! Adjustment-factor selection: the non-sampled portion of a plot design
//! (subplot, microplot, macroplot) is compensated for by picking the right
//! per-stratum `ADJ_FACTOR_*` column based on which basis a tree, condition,
//! or GRM record was measured under.

use crate::frame::frame::Frame;

fn factor_for_basis(frame: &Frame, row: usize, basis: &str) -> f64 {
    let col = match basis {
        "MICR" => "ADJ_FACTOR_MICR",
        "MACR" => "ADJ_FACTOR_MACR",
        _ => "ADJ_FACTOR_SUBP",
    };
    frame.get(row, col).as_f64().unwrap_or(0.0)
}

/// `TREE_BASIS` drives which adjustment factor a per-tree value is scaled
/// by; `frame` must already carry `TREE_BASIS` and the three `ADJ_FACTOR_*`
/// columns (broadcast from the stratification frame before this is called).
pub fn tree_adj_factor(frame: &Frame, row: usize) -> f64 {
    let basis = frame.get(row, "TREE_BASIS").as_str().unwrap_or("SUBP").to_string();
    factor_for_basis(frame, row, &basis)
}

/// `PROP_BASIS` is binary in practice (`MACR` or everything else resolves
/// to `SUBP`) — spec.md §4.6's adjustment table.
pub fn cond_adj_factor(frame: &Frame, row: usize) -> f64 {
    let basis = frame.get(row, "PROP_BASIS").as_str().unwrap_or("SUBP");
    if basis == "MACR" {
        factor_for_basis(frame, row, "MACR")
    } else {
        factor_for_basis(frame, row, "SUBP")
    }
}

/// `SUBPTYP_GRM` is numeric (`0` = not sampled, `1`/`2`/`3` = SUBP/MICR/MACR)
/// rather than a basis string, since GRM component tables encode it that
/// way natively.
pub fn grm_adj_factor(frame: &Frame, row: usize, subptyp_col: &str) -> f64 {
    match frame.get(row, subptyp_col).as_i64().unwrap_or(0) {
        1 => factor_for_basis(frame, row, "SUBP"),
        2 => factor_for_basis(frame, row, "MICR"),
        3 => factor_for_basis(frame, row, "MACR"),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::value::ColumnType;
    use crate::frame::frame::{Column, Schema};

    fn frame() -> Frame {
        let schema = Schema::new(vec![
            ("TREE_BASIS".into(), ColumnType::Text),
            ("PROP_BASIS".into(), ColumnType::Text),
            ("SUBPTYP_GRM".into(), ColumnType::Int),
            ("ADJ_FACTOR_MICR".into(), ColumnType::Float),
            ("ADJ_FACTOR_SUBP".into(), ColumnType::Float),
            ("ADJ_FACTOR_MACR".into(), ColumnType::Float),
        ]);
        Frame::new(
            schema,
            vec![
                Column::Text(vec![Some("MACR".into())]),
                Column::Text(vec![Some("MACR".into())]),
                Column::Int(vec![Some(2)]),
                Column::Float(vec![Some(1.1)]),
                Column::Float(vec![Some(1.2)]),
                Column::Float(vec![Some(1.3)]),
            ],
        )
    }

    #[test]
    fn tree_adj_factor_selects_macr_column() {
        assert_eq!(tree_adj_factor(&frame(), 0), 1.3);
    }

    #[test]
    fn cond_adj_factor_falls_back_to_subp_when_not_macr() {
        let schema = Schema::new(vec![
            ("PROP_BASIS".into(), ColumnType::Text),
            ("ADJ_FACTOR_SUBP".into(), ColumnType::Float),
            ("ADJ_FACTOR_MACR".into(), ColumnType::Float),
        ]);
        let f = Frame::new(
            schema,
            vec![
                Column::Text(vec![Some("SUBP".into())]),
                Column::Float(vec![Some(1.2)]),
                Column::Float(vec![Some(1.3)]),
            ],
        );
        assert_eq!(cond_adj_factor(&f, 0), 1.2);
    }

    #[test]
    fn grm_adj_factor_zero_when_not_sampled() {
        let schema = Schema::new(vec![
            ("SUBPTYP_GRM".into(), ColumnType::Int),
            ("ADJ_FACTOR_SUBP".into(), ColumnType::Float),
            ("ADJ_FACTOR_MICR".into(), ColumnType::Float),
            ("ADJ_FACTOR_MACR".into(), ColumnType::Float),
        ]);
        let f = Frame::new(
            schema,
            vec![
                Column::Int(vec![Some(0)]),
                Column::Float(vec![Some(1.0)]),
                Column::Float(vec![Some(1.0)]),
                Column::Float(vec![Some(1.0)]),
            ],
        );
        assert_eq!(grm_adj_factor(&f, 0, "SUBPTYP_GRM"), 0.0);
    }
}
