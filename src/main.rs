use std::sync::Arc;

use anyhow::{Context, Result};
use nutri_plan::cli::{parse_args, Command, EmbedderKind, IndexArgs};
use nutri_plan::config::EngineConfig;
use nutri_plan::followup::{analyze_progress, ControlData};
use nutri_plan::planner::{AlternativesRequest, NutritionPlanner};
use nutri_plan::profile::PatientProfile;
use nutri_plan::search::{
    load_recipe_corpus, Embedder, HashingEmbedder, HttpRecipeIndex, RecipeIndex,
    StaticModelEmbedder, VectorRecipeIndex,
};
use tokio::fs;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries the JSON result, so logs go to stderr.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn read_visit(path: &std::path::Path) -> Result<ControlData> {
    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read control visit file '{}'", path.display()))?;
    ControlData::from_json(&raw)
        .with_context(|| format!("Invalid control visit in '{}'", path.display()))
}

fn build_embedder(kind: EmbedderKind) -> Result<Arc<dyn Embedder>> {
    Ok(match kind {
        EmbedderKind::Model2vec => Arc::new(
            StaticModelEmbedder::new().context("Failed to load the static embedding model")?,
        ),
        EmbedderKind::Hashing => Arc::new(HashingEmbedder::default()),
    })
}

fn build_index(args: &IndexArgs, config: &EngineConfig) -> Result<Arc<dyn RecipeIndex>> {
    if let Some(url) = &args.index_url {
        info!(endpoint = %url, "using remote recipe index");
        let index = HttpRecipeIndex::from_env(Some(url.clone()), config.search.index_timeout())?;
        return Ok(Arc::new(index));
    }

    let embedder = build_embedder(args.embedder)?;
    if let Some(snapshot) = args.snapshot.as_deref().filter(|p| p.exists()) {
        let index = VectorRecipeIndex::from_snapshot(embedder, snapshot)
            .with_context(|| format!("Failed to load index snapshot '{}'", snapshot.display()))?;
        return Ok(Arc::new(index));
    }

    let corpus = args
        .corpus
        .as_deref()
        .context("A recipe corpus CSV is required when no snapshot exists")?;
    let recipes = load_recipe_corpus(corpus)?;
    let index = VectorRecipeIndex::build(embedder, recipes)?;
    if let Some(snapshot) = &args.snapshot {
        index
            .save_snapshot(snapshot)
            .with_context(|| format!("Failed to write index snapshot '{}'", snapshot.display()))?;
        info!(path = %snapshot.display(), "saved index snapshot");
    }
    Ok(Arc::new(index))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = parse_args();
    init_tracing(cli.json_logs);
    let config = EngineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Plan { index, profile } => {
            let raw = fs::read_to_string(&profile)
                .await
                .with_context(|| format!("Failed to read profile file '{}'", profile.display()))?;
            let patient = PatientProfile::from_json(&raw)
                .with_context(|| format!("Invalid profile in '{}'", profile.display()))?;

            let planner = NutritionPlanner::new(build_index(&index, &config)?, config)?;
            let response = planner.plan(&patient).await?;
            info!(stats = ?planner.cache_stats(), "search cache");
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Alternatives { index, request } => {
            let raw = fs::read_to_string(&request)
                .await
                .with_context(|| format!("Failed to read request file '{}'", request.display()))?;
            let parsed: AlternativesRequest = serde_json::from_str(&raw)
                .with_context(|| format!("Invalid alternatives request in '{}'", request.display()))?;

            let planner = NutritionPlanner::new(build_index(&index, &config)?, config)?;
            let alternatives = planner.find_alternatives(&parsed).await?;
            println!("{}", serde_json::to_string_pretty(&alternatives)?);
        }
        Command::Control { index, visit } => {
            let control = read_visit(&visit).await?;
            let planner = NutritionPlanner::new(build_index(&index, &config)?, config)?;
            let response = planner.follow_up(&control).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Progress { visit } => {
            let report = analyze_progress(&read_visit(&visit).await?)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
