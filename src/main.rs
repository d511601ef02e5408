use anyhow::{bail, Context, Result};
use std::env;
use std::fs;
use std::path::Path;

use retail_analytics::{
    import_csv, logging, AnalyticsAggregator, AppConfig, Catalog, EntityType, ProductFilter, Store,
};

const USAGE: &str = "usage:
  retail-analytics import <categories|products|sales> <file.csv>
  retail-analytics analytics
  retail-analytics products [search]";

fn main() -> Result<()> {
    logging::init();

    let args: Vec<String> = env::args().collect();
    let config = AppConfig::from_env().context("invalid configuration")?;

    match args.get(1).map(String::as_str) {
        Some("import") => {
            let (Some(entity), Some(file)) = (args.get(2), args.get(3)) else {
                bail!("missing arguments\n{}", USAGE);
            };
            run_import(&config, entity, Path::new(file))
        }
        Some("analytics") => run_analytics(&config),
        Some("products") => run_products(&config, args.get(2).cloned()),
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }
}

fn open_store(config: &AppConfig) -> Result<Store> {
    Store::open(&config.database_path)
        .with_context(|| format!("failed to open database at {}", config.database_path.display()))
}

fn run_import(config: &AppConfig, entity: &str, file: &Path) -> Result<()> {
    let entity: EntityType = entity
        .parse()
        .map_err(|other| anyhow::anyhow!("unknown entity type '{}'\n{}", other, USAGE))?;

    let extension = file.extension().and_then(|e| e.to_str()).unwrap_or_default();
    if !extension.eq_ignore_ascii_case("csv") {
        bail!("{} is not a .csv file", file.display());
    }

    let bytes = fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let store = open_store(config)?;

    let summary = import_csv(&store, entity, &bytes, config.import)
        .with_context(|| format!("import of {} failed", file.display()))?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn run_analytics(config: &AppConfig) -> Result<()> {
    let store = open_store(config)?;
    let dashboard = AnalyticsAggregator::new(&store, config.top_products_limit).dashboard()?;

    println!("{}", serde_json::to_string_pretty(&dashboard)?);
    Ok(())
}

fn run_products(config: &AppConfig, search: Option<String>) -> Result<()> {
    let store = open_store(config)?;
    let filter = ProductFilter {
        search,
        ..Default::default()
    };
    let products = Catalog::new(&store, config.product_delete_policy).list_products(&filter)?;

    println!("{}", serde_json::to_string_pretty(&products)?);
    Ok(())
}
