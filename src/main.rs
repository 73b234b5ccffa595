use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wpe::postprocess::translations_only;
use wpe::table::{records_from_json, records_to_json};
use wpe::{ClientConfig, LinkTable, SecondOrder, Translator, WikidataClient};

#[derive(Parser)]
#[command(name = "wpe", version, about = "Extraction multilingue des labels Wikidata", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Extrait les labels d'une propriété dans les langues demandées.
    Translate {
        #[arg(long)]
        property: String,
        #[arg(long = "language", required = true)]
        languages: Vec<String>,
        /// Fichier JSON contenant la liste des valeurs de propriété à
        /// extraire; sans lui, toutes les entités portant la propriété.
        #[arg(long)]
        ids: Option<PathBuf>,
        #[arg(long, default_value_t = 5_000)]
        limit: usize,
        #[arg(long, default_value_t = 200)]
        values_size: usize,
        #[arg(long, default_value = "https://query.wikidata.org/sparql")]
        endpoint: String,
        #[arg(long)]
        user_agent: String,
        #[arg(long, default_value_t = 60)]
        retry_pause_s: u64,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Extraction de second ordre via une table de liens vers des
    /// ontologies externes.
    SecondOrder {
        #[arg(long)]
        property: String,
        #[arg(long)]
        links: PathBuf,
        /// Propriété auxiliaire au format PXX=NomOntologie, répétable.
        #[arg(long = "auxiliary", required = true)]
        auxiliaries: Vec<String>,
        #[arg(long = "language", required = true)]
        languages: Vec<String>,
        /// Extraire toutes les entités de la propriété principale, pas
        /// seulement les valeurs de la table de liens.
        #[arg(long)]
        all_elem: bool,
        #[arg(long, default_value_t = 5_000)]
        limit: usize,
        #[arg(long, default_value_t = 100)]
        values_size: usize,
        #[arg(long, default_value = "https://query.wikidata.org/sparql")]
        endpoint: String,
        #[arg(long)]
        user_agent: String,
        #[arg(long, default_value_t = 60)]
        retry_pause_s: u64,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Agrège un résultat déjà extrait en traductions par valeur de
    /// propriété.
    Aggregate {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Commands::Translate {
            property,
            languages,
            ids,
            limit,
            values_size,
            endpoint,
            user_agent,
            retry_pause_s,
            output,
        } => {
            let client = build_client(user_agent, endpoint, retry_pause_s)?;
            let translator = Translator::new(Arc::new(client), &property, languages)
                .with_limit(limit)
                .with_values_batch_size(values_size);

            let table = match ids {
                Some(path) => {
                    let ids = load_id_list(&path)?;
                    translator.translate_ids(&ids)?
                }
                None => translator.translate()?,
            };

            info!(rows = table.len(), %property, "message" = "extraction terminée");
            write_output(&records_to_json(&table.to_records()), output)?;
        }
        Commands::SecondOrder {
            property,
            links,
            auxiliaries,
            languages,
            all_elem,
            limit,
            values_size,
            endpoint,
            user_agent,
            retry_pause_s,
            output,
        } => {
            let link_table = LinkTable::from_json(&load_json(&links)?)?;
            let auxiliaries = auxiliaries
                .iter()
                .map(|spec| parse_auxiliary(spec))
                .collect::<Result<Vec<_>>>()?;

            let client = build_client(user_agent, endpoint, retry_pause_s)?;
            let orchestrator = SecondOrder::new(
                Arc::new(client),
                &property,
                link_table,
                auxiliaries,
                languages,
            )
            .with_all_elem(all_elem)
            .with_limit(limit)
            .with_values_batch_size(values_size);

            let table = orchestrator.translate()?;
            info!(
                rows = table.rows().len(),
                %property,
                "message" = "extraction de second ordre terminée"
            );
            write_output(&records_to_json(&table.to_records()), output)?;
        }
        Commands::Aggregate { input, output } => {
            let records = records_from_json(&load_json(&input)?)?;
            let aggregated = translations_only(&records)?;
            info!(groups = aggregated.len(), "message" = "agrégation terminée");
            write_output(&records_to_json(&aggregated), output)?;
        }
    }

    Ok(())
}

fn build_client(
    user_agent: String,
    endpoint: String,
    retry_pause_s: u64,
) -> Result<WikidataClient> {
    let config = ClientConfig::new(user_agent)?
        .with_endpoint(endpoint)
        .with_retry_pause(Duration::from_secs(retry_pause_s));
    Ok(WikidataClient::new(config)?)
}

fn parse_auxiliary(spec: &str) -> Result<(String, String)> {
    match spec.split_once('=') {
        Some((property, name)) if !property.is_empty() && !name.is_empty() => {
            Ok((property.to_string(), name.to_string()))
        }
        _ => bail!("propriété auxiliaire invalide: {spec:?} (format attendu: PXX=NomOntologie)"),
    }
}

fn load_json(path: &PathBuf) -> Result<Value> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("impossible de lire le fichier {path:?}"))?;
    serde_json::from_str(&data).with_context(|| format!("JSON invalide dans {path:?}"))
}

fn load_id_list(path: &PathBuf) -> Result<Vec<String>> {
    let value = load_json(path)?;
    let entries = value
        .as_array()
        .with_context(|| format!("un tableau JSON d'identifiants est attendu dans {path:?}"))?;
    entries
        .iter()
        .map(|entry| match entry {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            other => bail!("identifiant non scalaire dans {path:?}: {other}"),
        })
        .collect()
}

fn write_output(value: &Value, output: Option<PathBuf>) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            fs::write(&path, rendered)
                .with_context(|| format!("impossible d'écrire le résultat dans {path:?}"))?;
            info!("sortie" = %path.display());
        }
        None => println!("{rendered}"),
    }
    Ok(())
}
