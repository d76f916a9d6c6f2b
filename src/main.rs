use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;

use fia_estimate::config::{EstimatorConfig, LandTypeOption, MethodOption, TreeTypeOption, VarianceMethodOption};
use fia_estimate::db::Backend;
use fia_estimate::estimators::{
    AreaConfig, BiomassComponent, BiomassConfig, CarbonConfig, CarbonFluxConfig, GrowthConfig, GrowthMeasure,
    MortalityConfig, MortalityType, RemovalsConfig, RemovalsMeasure, TpaConfig, VolType, VolumeConfig,
};
use fia_estimate::output::render::print;
use fia_estimate::session::Session;

#[derive(Parser)]
#[command(name = "fia-cli", about = "Stratified population estimates over FIA data", version, author)]
struct Cli {
    /// Path to the database file (.db/.sqlite opens the SQLite backend,
    /// .duckdb the DuckDB backend)
    #[arg(long, global = true)]
    db: PathBuf,

    /// EVALIDs to restrict the query to; defaults to the most recent
    /// EXPVOL (or estimator-specific) evaluation for every state present
    #[arg(long, global = true, value_delimiter = ',')]
    evalid: Vec<i64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct CommonArgs {
    /// Grouping columns, e.g. --group-by SPCD,OWNGRPCD
    #[arg(long, value_delimiter = ',')]
    group_by: Vec<String>,

    /// Break the grouping out by species
    #[arg(long)]
    by_species: bool,

    /// Break the grouping out by diameter size class
    #[arg(long)]
    by_size_class: bool,

    #[arg(long, value_enum, default_value = "forest")]
    land_type: LandTypeArg,

    #[arg(long, value_enum, default_value = "live")]
    tree_type: TreeTypeArg,

    /// Tree-level domain filter expression, e.g. "DIA >= 5.0"
    #[arg(long)]
    tree_domain: Option<String>,

    /// Condition-level domain filter expression
    #[arg(long)]
    area_domain: Option<String>,

    /// Plot-level domain filter expression
    #[arg(long)]
    plot_domain: Option<String>,

    #[arg(long, value_enum, default_value = "ti")]
    method: MethodArg,

    /// Smoothing factor for --method ema, in [0, 1]
    #[arg(long)]
    lambda: Option<f64>,

    /// Include population totals alongside per-acre estimates
    #[arg(long)]
    totals: bool,

    /// Include standard error / variance columns
    #[arg(long)]
    variance: bool,

    #[arg(long, value_enum, default_value = "hybrid")]
    variance_method: VarianceMethodArg,

    /// Clip to each state's single most recent evaluation before estimating
    #[arg(long)]
    most_recent: bool,

    /// Return one row per plot instead of the aggregated population estimate
    #[arg(long)]
    by_plot: bool,
}

#[derive(clap::ValueEnum, Clone, Copy)]
enum LandTypeArg {
    Forest,
    Timber,
    All,
}

#[derive(clap::ValueEnum, Clone, Copy)]
enum TreeTypeArg {
    Live,
    Dead,
    Gs,
    Al,
    Sawtimber,
    All,
}

#[derive(clap::ValueEnum, Clone, Copy)]
enum MethodArg {
    Ti,
    Annual,
    Sma,
    Lma,
    Ema,
}

#[derive(clap::ValueEnum, Clone, Copy)]
enum VarianceMethodArg {
    Standard,
    Ratio,
    Hybrid,
}

impl CommonArgs {
    fn into_base(self) -> EstimatorConfig {
        EstimatorConfig {
            grp_by: self.group_by,
            by_species: self.by_species,
            by_size_class: self.by_size_class,
            land_type: match self.land_type {
                LandTypeArg::Forest => LandTypeOption::Forest,
                LandTypeArg::Timber => LandTypeOption::Timber,
                LandTypeArg::All => LandTypeOption::All,
            },
            tree_type: match self.tree_type {
                TreeTypeArg::Live => TreeTypeOption::Live,
                TreeTypeArg::Dead => TreeTypeOption::Dead,
                TreeTypeArg::Gs => TreeTypeOption::Gs,
                TreeTypeArg::Al => TreeTypeOption::Al,
                TreeTypeArg::Sawtimber => TreeTypeOption::Sawtimber,
                TreeTypeArg::All => TreeTypeOption::All,
            },
            tree_domain: self.tree_domain,
            area_domain: self.area_domain,
            plot_domain: self.plot_domain,
            method: match self.method {
                MethodArg::Ti => MethodOption::Ti,
                MethodArg::Annual => MethodOption::Annual,
                MethodArg::Sma => MethodOption::Sma,
                MethodArg::Lma => MethodOption::Lma,
                MethodArg::Ema => MethodOption::Ema,
            },
            lambda: self.lambda,
            totals: self.totals,
            variance: self.variance,
            variance_method: match self.variance_method {
                VarianceMethodArg::Standard => VarianceMethodOption::Standard,
                VarianceMethodArg::Ratio => VarianceMethodOption::Ratio,
                VarianceMethodArg::Hybrid => VarianceMethodOption::Hybrid,
            },
            by_plot: self.by_plot,
            most_recent: self.most_recent,
            ..Default::default()
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Forested (or timberland) area estimates
    Area {
        #[command(flatten)]
        common: CommonArgs,
        /// Add a LAND_TYPE breakdown to the grouping key
        #[arg(long)]
        by_land_type: bool,
    },
    /// Trees per acre
    Tpa {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Basal area per acre
    Baa {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Net/gross/sawlog volume per acre
    Volume {
        #[command(flatten)]
        common: CommonArgs,
        #[arg(long, value_enum, default_value = "net")]
        vol_type: VolTypeArg,
    },
    /// Above/below-ground dry biomass per acre
    Biomass {
        #[command(flatten)]
        common: CommonArgs,
        #[arg(long, value_enum, default_value = "ag")]
        component: ComponentArg,
        #[arg(long)]
        include_foliage: bool,
    },
    /// Carbon per acre (biomass scaled by a carbon fraction)
    Carbon {
        #[command(flatten)]
        common: CommonArgs,
        #[arg(long, value_enum, default_value = "total")]
        component: ComponentArg,
        #[arg(long, default_value = "0.47")]
        carbon_fraction: f64,
    },
    /// Annualized net growth
    Growth {
        #[command(flatten)]
        common: CommonArgs,
        #[arg(long, value_enum, default_value = "volume")]
        measure: GrowthMeasureArg,
    },
    /// Annualized mortality
    Mortality {
        #[command(flatten)]
        common: CommonArgs,
        #[arg(long, value_enum, default_value = "tpa")]
        mortality_type: MortalityTypeArg,
    },
    /// Annualized harvest/diversion removals
    Removals {
        #[command(flatten)]
        common: CommonArgs,
        #[arg(long, value_enum, default_value = "volume")]
        measure: RemovalsMeasureArg,
    },
    /// Net carbon flux (growth - mortality - removals)
    CarbonFlux {
        #[command(flatten)]
        common: CommonArgs,
        #[arg(long, default_value = "0.47")]
        carbon_fraction: f64,
        #[arg(long)]
        include_components: bool,
    },
}

#[derive(clap::ValueEnum, Clone, Copy)]
enum VolTypeArg {
    Net,
    Gross,
    Sawlog,
}

#[derive(clap::ValueEnum, Clone, Copy)]
enum ComponentArg {
    Ag,
    Bg,
    Total,
}

#[derive(clap::ValueEnum, Clone, Copy)]
enum GrowthMeasureArg {
    Volume,
    Biomass,
    Count,
}

#[derive(clap::ValueEnum, Clone, Copy)]
enum MortalityTypeArg {
    Tpa,
    Volume,
    Biomass,
    BasalArea,
    Both,
}

#[derive(clap::ValueEnum, Clone, Copy)]
enum RemovalsMeasureArg {
    Volume,
    Biomass,
    Count,
}

fn open_session(db: &PathBuf, evalids: &[i64]) -> Result<Session> {
    let ext = db.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
    let path = db.to_str().context("database path is not valid UTF-8")?;

    let backend: Box<dyn Backend> = match ext.as_str() {
        #[cfg(feature = "duckdb-backend")]
        "duckdb" => Box::new(fia_estimate::db::DuckdbBackend::open(path)?),
        #[cfg(feature = "sqlite")]
        _ => Box::new(fia_estimate::db::SqliteBackend::open(path)?),
        #[cfg(not(feature = "sqlite"))]
        _ => anyhow::bail!("no database backend compiled in for extension '.{ext}'"),
    };

    let session = Session::new(backend);
    if !evalids.is_empty() {
        session.clip_by_evalid(evalids.to_vec());
    }
    Ok(session)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let session = open_session(&cli.db, &cli.evalid)?;

    match cli.command {
        Commands::Area { common, by_land_type } => {
            let config = AreaConfig { base: common.into_base(), by_land_type };
            let out = fia_estimate::area(&session, &config)?;
            report(&out.warnings);
            print("Area", &out.value);
        }
        Commands::Tpa { common } => {
            let config = TpaConfig { base: common.into_base() };
            let out = fia_estimate::tpa(&session, &config)?;
            report(&out.warnings);
            print("Trees per Acre", &out.value);
        }
        Commands::Baa { common } => {
            let config = TpaConfig { base: common.into_base() };
            let out = fia_estimate::baa(&session, &config)?;
            report(&out.warnings);
            print("Basal Area per Acre", &out.value);
        }
        Commands::Volume { common, vol_type } => {
            let config = VolumeConfig {
                base: common.into_base(),
                vol_type: match vol_type {
                    VolTypeArg::Net => VolType::Net,
                    VolTypeArg::Gross => VolType::Gross,
                    VolTypeArg::Sawlog => VolType::Sawlog,
                },
            };
            let out = fia_estimate::volume(&session, &config)?;
            report(&out.warnings);
            print("Volume per Acre", &out.value);
        }
        Commands::Biomass { common, component, include_foliage } => {
            let config = BiomassConfig { base: common.into_base(), component: component.into(), include_foliage };
            let out = fia_estimate::biomass(&session, &config)?;
            report(&out.warnings);
            print("Biomass per Acre", &out.value);
        }
        Commands::Carbon { common, component, carbon_fraction } => {
            let config = CarbonConfig { base: common.into_base(), component: component.into(), carbon_fraction };
            let out = fia_estimate::carbon(&session, &config)?;
            report(&out.warnings);
            print("Carbon per Acre", &out.value);
        }
        Commands::Growth { common, measure } => {
            let config = GrowthConfig {
                base: common.into_base(),
                measure: match measure {
                    GrowthMeasureArg::Volume => GrowthMeasure::Volume,
                    GrowthMeasureArg::Biomass => GrowthMeasure::Biomass,
                    GrowthMeasureArg::Count => GrowthMeasure::Count,
                },
            };
            let out = fia_estimate::growth(&session, &config)?;
            report(&out.warnings);
            print("Annual Growth", &out.value);
        }
        Commands::Mortality { common, mortality_type } => {
            let config = MortalityConfig {
                base: common.into_base(),
                mortality_type: match mortality_type {
                    MortalityTypeArg::Tpa => MortalityType::Tpa,
                    MortalityTypeArg::Volume => MortalityType::Volume,
                    MortalityTypeArg::Biomass => MortalityType::Biomass,
                    MortalityTypeArg::BasalArea => MortalityType::BasalArea,
                    MortalityTypeArg::Both => MortalityType::Both,
                },
            };
            let out = fia_estimate::mortality(&session, &config)?;
            report(&out.warnings);
            print("Annual Mortality", &out.value);
        }
        Commands::Removals { common, measure } => {
            let config = RemovalsConfig {
                base: common.into_base(),
                measure: match measure {
                    RemovalsMeasureArg::Volume => RemovalsMeasure::Volume,
                    RemovalsMeasureArg::Biomass => RemovalsMeasure::Biomass,
                    RemovalsMeasureArg::Count => RemovalsMeasure::Count,
                },
            };
            let out = fia_estimate::removals(&session, &config)?;
            report(&out.warnings);
            print("Annual Removals", &out.value);
        }
        Commands::CarbonFlux { common, carbon_fraction, include_components } => {
            let config = CarbonFluxConfig { base: common.into_base(), carbon_fraction, include_components };
            let out = fia_estimate::carbon_flux(&session, &config)?;
            report(&out.warnings);
            print("Net Carbon Flux", &out.value);
        }
    }

    Ok(())
}

fn report(warnings: &[fia_estimate::Warning]) {
    for w in warnings {
        eprintln!("{} {w}", "warning:".yellow().bold());
    }
}

impl From<ComponentArg> for BiomassComponent {
    fn from(c: ComponentArg) -> Self {
        match c {
            ComponentArg::Ag => BiomassComponent::Ag,
            ComponentArg::Bg => BiomassComponent::Bg,
            ComponentArg::Total => BiomassComponent::Total,
        }
    }
}
