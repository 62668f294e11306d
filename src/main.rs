use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::env;
use std::io;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use fmr_reconcile::{
    drill_down, metro_codes, read_cpi_matrix, read_metro_rents, read_source_dir,
    transform_cpi_data, within_metro, AnomalyScorer, CorpusAssembler, CpiSeries, DeduplicationEngine, LagCorrelator,
    MetroCodeMapper, PipelineConfig, PromptSelector, RentRecord, Selector, VERSION,
};

const USAGE: &str = "usage: fmr-reconcile <command> <config.toml> [entity] [zip]

commands:
  zip-trends     anomaly report for the zip codes of one metro area
                 (entity = HUD area code; zip = drill into one zip code)
  zip-join       joined zip corpus (metro.join_policy)
  metro-history  one metro area's rents aligned with CPI
  lag            CPI lag search for one metro area";

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("fmr-reconcile {}\n\n{}", VERSION, USAGE);
        std::process::exit(2);
    }

    let config = PipelineConfig::from_file(&args[2])
        .with_context(|| format!("Failed to load config {}", args[2]))?;
    let entity = args.get(3).map(String::as_str);

    match args[1].as_str() {
        "zip-trends" => run_zip_trends(&config, entity, args.get(4).map(String::as_str)),
        "zip-join" => run_zip_join(&config),
        "metro-history" => run_metro_history(&config, entity),
        "lag" => run_lag(&config, entity),
        other => bail!("Unknown command '{}'\n\n{}", other, USAGE),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_cpi(config: &PipelineConfig) -> Result<CpiSeries> {
    let matrix = read_cpi_matrix(&config.data.cpi_file)?;
    Ok(transform_cpi_data(&matrix)?)
}

/// Stack every yearly release, tag metro codes and score the zip codes of one
/// metro area. With a zip code, print its CPI-aligned history instead.
fn run_zip_trends(config: &PipelineConfig, metro: Option<&str>, zip: Option<&str>) -> Result<()> {
    let sources = read_source_dir(&config.data.fmr_directory)?;
    let assembler = CorpusAssembler::new(
        DeduplicationEngine::new(config.zip.rounding),
        config.zip.anchor_month,
    );
    let records = assembler.stack(&sources)?;
    let records = MetroCodeMapper::from_sources(&sources).apply(&records);
    info!(rows = records.len(), "zip corpus assembled");

    let Some(code) = choose(&metro_codes(&records), metro) else {
        info!("no metro area selected");
        return Ok(());
    };
    let records = within_metro(&records, &code);
    if records.is_empty() {
        bail!("No zip codes mapped to metro area {}", code);
    }

    if let Some(zip) = zip {
        let cpi = load_cpi(config)?;
        let history = drill_down(&records, zip, &cpi, config.zip.anchor_month)?;
        return print_json(&history);
    }

    let report = AnomalyScorer::new(config.analysis.std_multiplier)
        .score(&records, config.field()?)?;
    print_json(&report)
}

fn run_zip_join(config: &PipelineConfig) -> Result<()> {
    let sources = read_source_dir(&config.data.fmr_directory)?;
    let assembler = CorpusAssembler::new(
        DeduplicationEngine::metro_level(),
        config.zip.anchor_month,
    );
    let corpus = assembler.join(&sources, config.join_policy()?);
    info!(
        entities = corpus.rows.len(),
        years = corpus.years.len(),
        "joined zip corpus"
    );
    print_json(&corpus)
}

fn load_metro_rents(config: &PipelineConfig) -> Result<Vec<RentRecord>> {
    let Some(path) = config.data.metro_rent_file.as_deref() else {
        bail!("data.metro_rent_file is not set");
    };
    read_metro_rents(path, config.metro.implementation_month)
}

/// Entity from the command line, or picked interactively from the listing
fn choose_entity(records: &[RentRecord], entity: Option<&str>) -> Option<String> {
    let options: Vec<String> = records
        .iter()
        .map(|r| r.entity_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    choose(&options, entity)
}

fn choose(options: &[String], given: Option<&str>) -> Option<String> {
    if let Some(given) = given {
        return Some(given.to_string());
    }

    let stdin = io::stdin();
    let mut selector = PromptSelector::new(
        stdin.lock(),
        io::stderr(),
        "Which metro area are you interested in? (index from the list above)",
    );
    selector.select(options).map(|i| options[i].clone())
}

fn run_metro_history(config: &PipelineConfig, entity: Option<&str>) -> Result<()> {
    let rents = load_metro_rents(config)?;
    let Some(code) = choose_entity(&rents, entity) else {
        info!("no metro area selected");
        return Ok(());
    };

    let cpi = load_cpi(config)?;
    let history = drill_down(&rents, &code, &cpi, config.metro.implementation_month)?;
    print_json(&history)
}

fn run_lag(config: &PipelineConfig, entity: Option<&str>) -> Result<()> {
    let rents = load_metro_rents(config)?;
    let Some(code) = choose_entity(&rents, entity) else {
        info!("no metro area selected");
        return Ok(());
    };

    let cpi = load_cpi(config)?;
    let aligned = drill_down(&rents, &code, &cpi, config.metro.implementation_month)?;
    let field = config.field()?;

    let correlator = LagCorrelator {
        candidate_lags: config.analysis.candidate_lags.clone(),
        significance_threshold: config.analysis.significance_threshold,
    };
    let outcome = correlator.search(&aligned, field);
    info!("{}", outcome.summary(field));
    print_json(&outcome)
}
