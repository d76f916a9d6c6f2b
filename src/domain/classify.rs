use crate::db::value::ColumnValue;
use crate::frame::frame::Frame;

/// Diameter-class binning scheme for `assign_size_class`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeClassScheme {
    /// 5 classes: seedling/sapling/poletimber/sawtimber/large sawtimber.
    Standard,
    /// 2-inch-wide bins from 1.0" up, the finer diameter-distribution grid.
    Detailed,
    /// 3 classes: small/medium/large.
    Simple,
}

/// FIA tree basis: which plot design component a tree was tallied on.
/// `macro_breakpoint_dia` is the plot's own `MACRO_BREAKPOINT_DIA`; null or
/// 0 means the plot has no macroplot, so no tree on it can resolve to MACR
/// regardless of DIA.
pub fn assign_tree_basis(dia: f64, macro_breakpoint_dia: Option<f64>) -> &'static str {
    if dia < 5.0 {
        return "MICR";
    }
    match macro_breakpoint_dia {
        Some(bp) if bp > 0.0 && dia >= bp => "MACR",
        _ => "SUBP",
    }
}

/// Condition-proportion basis mirrors the tree basis breakpoint used for
/// macroplot-eligible conditions.
pub fn assign_prop_basis(macro_breakpoint_dia: Option<f64>) -> &'static str {
    match macro_breakpoint_dia {
        Some(dia) if dia > 0.0 => "MACR",
        _ => "SUBP",
    }
}

pub fn assign_size_class(dia: f64, scheme: SizeClassScheme) -> &'static str {
    match scheme {
        SizeClassScheme::Standard => {
            if dia < 1.0 {
                "Seedling"
            } else if dia < 5.0 {
                "Sapling"
            } else if dia < 9.0 {
                "Poletimber"
            } else if dia < 21.0 {
                "Sawtimber"
            } else {
                "Large sawtimber"
            }
        }
        SizeClassScheme::Detailed => {
            if dia < 1.0 {
                "0.0-0.9"
            } else if dia < 3.0 {
                "1.0-2.9"
            } else if dia < 5.0 {
                "3.0-4.9"
            } else if dia < 7.0 {
                "5.0-6.9"
            } else if dia < 9.0 {
                "7.0-8.9"
            } else if dia < 11.0 {
                "9.0-10.9"
            } else if dia < 13.0 {
                "11.0-12.9"
            } else if dia < 15.0 {
                "13.0-14.9"
            } else if dia < 17.0 {
                "15.0-16.9"
            } else if dia < 19.0 {
                "17.0-18.9"
            } else if dia < 21.0 {
                "19.0-20.9"
            } else if dia < 29.0 {
                "21.0-28.9"
            } else {
                "29.0+"
            }
        }
        SizeClassScheme::Simple => {
            if dia < 5.0 {
                "Small"
            } else if dia < 15.0 {
                "Medium"
            } else {
                "Large"
            }
        }
    }
}

/// Coarse land-use bucket from `COND_STATUS_CD` (1 forest, 2 nonforest water,
/// 3 noncensus water, 4+ other).
pub fn assign_land_use_class(cond_status_cd: i64) -> &'static str {
    match cond_status_cd {
        1 => "Forest",
        2 => "Nonforest",
        3 => "Water",
        _ => "Other",
    }
}

/// Collapse a 3-digit `FORTYPCD` to its hundred's-place forest type group,
/// the standard FIA grouping (e.g. 121 Loblolly/shortleaf pine -> 120).
pub fn assign_forest_type_group(fortypcd: i64) -> i64 {
    (fortypcd / 10) * 10
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeciesGroupLevel {
    MajorSpeciesGroup,
    Genus,
    Family,
}

/// Look up `spcd` in a `REF_SPECIES` frame (columns `SPCD`, `SPGRPCD`,
/// `GENUS`, `FAMILY`) and return the requested grouping level. A species not
/// present in the reference table resolves to `None`, left to the caller to
/// treat as "Unknown" — this function never invents a value.
pub fn assign_species_group(ref_species: &Frame, spcd: i64, level: SpeciesGroupLevel) -> Option<String> {
    let col = match level {
        SpeciesGroupLevel::MajorSpeciesGroup => "SPGRPCD",
        SpeciesGroupLevel::Genus => "GENUS",
        SpeciesGroupLevel::Family => "FAMILY",
    };
    for row in 0..ref_species.num_rows() {
        if ref_species.get(row, "SPCD").as_i64() == Some(spcd) {
            return match ref_species.get(row, col) {
                ColumnValue::Null => None,
                v => Some(v.to_string()),
            };
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::value::ColumnType;
    use crate::frame::frame::{Column, Schema};

    #[test]
    fn tree_basis_breaks_at_five_inches_and_the_plot_breakpoint() {
        assert_eq!(assign_tree_basis(4.9, Some(24.0)), "MICR");
        assert_eq!(assign_tree_basis(5.0, Some(24.0)), "SUBP");
        assert_eq!(assign_tree_basis(23.9, Some(24.0)), "SUBP");
        assert_eq!(assign_tree_basis(24.0, Some(24.0)), "MACR");
    }

    #[test]
    fn tree_basis_never_macr_when_breakpoint_null_or_zero() {
        assert_eq!(assign_tree_basis(40.0, None), "SUBP");
        assert_eq!(assign_tree_basis(40.0, Some(0.0)), "SUBP");
    }

    #[test]
    fn size_class_standard_scheme_has_five_bins() {
        assert_eq!(assign_size_class(0.5, SizeClassScheme::Standard), "Seedling");
        assert_eq!(assign_size_class(25.0, SizeClassScheme::Standard), "Large sawtimber");
    }

    #[test]
    fn forest_type_group_collapses_to_tens() {
        assert_eq!(assign_forest_type_group(121), 120);
        assert_eq!(assign_forest_type_group(128), 120);
    }

    #[test]
    fn species_group_lookup_returns_none_for_unknown_species() {
        let schema = Schema::new(vec![
            ("SPCD".into(), ColumnType::Int),
            ("SPGRPCD".into(), ColumnType::Int),
            ("GENUS".into(), ColumnType::Text),
            ("FAMILY".into(), ColumnType::Text),
        ]);
        let frame = Frame::new(
            schema,
            vec![
                Column::Int(vec![Some(131)]),
                Column::Int(vec![Some(6)]),
                Column::Text(vec![Some("Pinus".into())]),
                Column::Text(vec![Some("Pinaceae".into())]),
            ],
        );
        assert_eq!(
            assign_species_group(&frame, 131, SpeciesGroupLevel::Genus),
            Some("Pinus".to_string())
        );
        assert_eq!(assign_species_group(&frame, 999, SpeciesGroupLevel::Genus), None);
    }
}
