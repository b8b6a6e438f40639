//! Ingestion CLI: chunk source documents, link relationships, and embed the
//! resulting datasets into Qdrant.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use studiorag::config::{get_config, init_config};
use studiorag::documents::chunker::DocumentChunker;
use studiorag::documents::project::ProjectChunker;
use studiorag::documents::relations::{DEFAULT_OVERLAP_THRESHOLD, RelationshipBuilder};
use studiorag::documents::types::{Dataset, QuestionSubject, ServiceEntry};
use studiorag::documents::utils::{load_json, save_json};
use studiorag::embedding::get_embedding_client;
use studiorag::logging::init_tracing;
use studiorag::qdrant::QdrantService;
use studiorag::store::{VectorStore, VectorStoreOptions};

#[derive(Parser)]
#[command(
    name = "ingest",
    about = "Chunk, link, and embed the studio knowledge base"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk documentation and project trees into datasets.
    Chunk {
        /// Directory of general documentation files.
        #[arg(long)]
        docs: PathBuf,
        /// Directory of per-project case study files.
        #[arg(long)]
        projects: PathBuf,
        /// Document config JSON (per-file priority, services, content type).
        #[arg(long)]
        doc_config: PathBuf,
        /// Project config JSON mapping documents to projects.
        #[arg(long)]
        project_config: PathBuf,
        /// Client config JSON.
        #[arg(long)]
        client_config: PathBuf,
        /// Directory the datasets are written to.
        #[arg(long, default_value = "datasets")]
        output: PathBuf,
    },
    /// Link evaluation questions and services to their supporting chunks.
    Prepare {
        /// Directory holding the chunked datasets.
        #[arg(long, default_value = "datasets")]
        datasets: PathBuf,
        /// Question subjects JSON, updated in place.
        #[arg(long)]
        questions: PathBuf,
        /// Services JSON, updated in place.
        #[arg(long)]
        services: PathBuf,
        /// Word-overlap ratio above which a chunk counts as related.
        #[arg(long, default_value_t = DEFAULT_OVERLAP_THRESHOLD)]
        overlap_threshold: f32,
    },
    /// Embed dataset chunks and upsert them into the vector collection.
    Embed {
        /// Directory holding the chunked datasets.
        #[arg(long, default_value = "datasets")]
        datasets: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_config();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Chunk {
            docs,
            projects,
            doc_config,
            project_config,
            client_config,
            output,
        } => chunk(docs, projects, doc_config, project_config, client_config, output),
        Command::Prepare {
            datasets,
            questions,
            services,
            overlap_threshold,
        } => prepare(datasets, questions, services, overlap_threshold),
        Command::Embed { datasets } => embed(datasets).await,
    }
}

const DOCUMENTS_DATASET: &str = "documents_dataset.json";
const PROJECTS_DATASET: &str = "projects_dataset.json";

fn chunk(
    docs: PathBuf,
    projects: PathBuf,
    doc_config: PathBuf,
    project_config: PathBuf,
    client_config: PathBuf,
    output: PathBuf,
) -> Result<()> {
    std::fs::create_dir_all(&output)
        .with_context(|| format!("creating output directory {}", output.display()))?;
    let config = get_config();
    let chunk_size = config.chunk_size.unwrap_or(600);
    let chunk_overlap = config.chunk_overlap.unwrap_or(40);

    let doc_chunker = DocumentChunker::new(chunk_size, chunk_overlap)
        .with_config_file(&doc_config)
        .context("loading document config")?;
    let doc_dataset = doc_chunker
        .process_directory(&docs)
        .with_context(|| format!("chunking {}", docs.display()))?;
    save_json(&doc_dataset, &output.join(DOCUMENTS_DATASET)).context("writing documents dataset")?;

    let project_chunker = ProjectChunker::from_config_files(&project_config, &client_config)
        .context("loading project configs")?
        .with_budgets(chunk_size, chunk_overlap);
    let project_dataset = project_chunker
        .process_directory(&projects)
        .with_context(|| format!("chunking {}", projects.display()))?;
    save_json(&project_dataset, &output.join(PROJECTS_DATASET))
        .context("writing projects dataset")?;

    let doc_metrics = doc_chunker.metrics().snapshot();
    let project_metrics = project_chunker.metrics().snapshot();
    println!(
        "documents: {} files, {} chunks ({} skipped)",
        doc_metrics.documents_processed, doc_metrics.chunks_processed, doc_metrics.files_skipped
    );
    println!(
        "projects: {} files, {} chunks ({} skipped)",
        project_metrics.documents_processed,
        project_metrics.chunks_processed,
        project_metrics.files_skipped
    );
    println!(
        "subjects: {}, services: {}, clients: {}",
        doc_dataset.metadata.subjects.len() + project_dataset.metadata.subjects.len(),
        doc_dataset.metadata.services.len() + project_dataset.metadata.services.len(),
        project_dataset.metadata.clients.len()
    );
    Ok(())
}

fn prepare(
    datasets: PathBuf,
    questions: PathBuf,
    services: PathBuf,
    overlap_threshold: f32,
) -> Result<()> {
    let doc_dataset: Dataset =
        load_json(&datasets.join(DOCUMENTS_DATASET)).context("loading documents dataset")?;
    let project_dataset: Dataset =
        load_json(&datasets.join(PROJECTS_DATASET)).context("loading projects dataset")?;
    let builder = RelationshipBuilder::new(&[&doc_dataset, &project_dataset], overlap_threshold);

    let mut question_subjects: Vec<QuestionSubject> =
        load_json(&questions).context("loading questions")?;
    builder.link_questions(&mut question_subjects);
    save_json(&question_subjects, &questions).context("writing questions")?;

    let mut service_entries: Vec<ServiceEntry> = load_json(&services).context("loading services")?;
    builder.link_services(&mut service_entries);
    save_json(&service_entries, &services).context("writing services")?;

    let linked_questions: usize = question_subjects
        .iter()
        .flat_map(|subject| &subject.tests)
        .filter(|entry| !entry.correct_chunks.is_empty())
        .count();
    let linked_services = service_entries
        .iter()
        .filter(|entry| !entry.correct_chunks.is_empty())
        .count();
    println!("linked {linked_questions} questions, {linked_services} services");
    Ok(())
}

async fn embed(datasets: PathBuf) -> Result<()> {
    let doc_dataset: Dataset =
        load_json(&datasets.join(DOCUMENTS_DATASET)).context("loading documents dataset")?;
    let project_dataset: Dataset =
        load_json(&datasets.join(PROJECTS_DATASET)).context("loading projects dataset")?;

    let chunks: Vec<_> = doc_dataset
        .documents
        .iter()
        .chain(project_dataset.documents.iter())
        .flat_map(|document| document.chunks.iter().cloned())
        .collect();
    if chunks.is_empty() {
        bail!("datasets contain no chunks");
    }

    let config = get_config();
    let store = VectorStore::new(
        QdrantService::new().context("building Qdrant client")?,
        Arc::from(get_embedding_client()),
        VectorStoreOptions::from_config(),
    );
    store
        .ensure_collection(config.embedding_dimension as u64)
        .await
        .context("preparing collection")?;

    let report = store
        .upsert_chunks(&chunks)
        .await
        .context("upserting chunks")?;
    println!(
        "upserted {} points in {} segments ({} failed)",
        report.points_upserted, report.segments_total, report.segments_failed
    );
    if report.segments_failed > 0 && report.points_upserted == 0 {
        bail!("every upsert segment failed");
    }
    Ok(())
}
