pub mod classify;
pub mod filter;
pub mod parser;

pub use classify::{
    assign_forest_type_group, assign_land_use_class, assign_prop_basis, assign_size_class,
    assign_species_group, assign_tree_basis, SizeClassScheme, SpeciesGroupLevel,
};
pub use filter::{land_type_indicator, tree_type_indicator, LandType, TreeType};
pub use parser::parse;
