//! Catalog ingestion CLI
//!
//! Reads a JSONL catalog export (one song per line, outputs nested),
//! embeds the descriptive text in batches through the embedding
//! provider, and inserts songs and audio outputs. Already-present ids
//! are left untouched, so re-running an export is safe.
//!
//! Exit code 0 on success, non-zero on unrecoverable error; songs
//! whose embedding batch fails are skipped and reported.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use pgvector::Vector;
use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use setlist_inference_client::EmbeddingClient;
use setlist_shared_config::{DatabaseConfig, EmbeddingProviderConfig};

/// Ingest a JSONL catalog export into the Setlist database
#[derive(Debug, Parser)]
#[command(name = "setlist-ingest", version)]
struct Args {
    /// Path to the JSONL catalog file
    #[arg(long)]
    input: PathBuf,

    /// Songs embedded per provider call
    #[arg(long, default_value_t = 100)]
    batch_size: usize,

    /// Parse and embed without writing to the database
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

/// One audio output in the catalog export
#[derive(Debug, Clone, Deserialize)]
struct CatalogOutput {
    #[serde(default)]
    id: Option<Uuid>,
    output_number: i32,
    audio_url: String,
    #[serde(default)]
    sounds_description: Option<String>,
}

/// One song in the catalog export
#[derive(Debug, Clone, Deserialize)]
struct CatalogSong {
    #[serde(default)]
    id: Option<Uuid>,
    title: String,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    lyrics: Option<String>,
    #[serde(default)]
    acoustic_prompt_descriptive: Option<String>,
    #[serde(default)]
    bpm: Option<i32>,
    #[serde(default)]
    musical_key: Option<String>,
    #[serde(default)]
    primary_genre: Option<String>,
    #[serde(default)]
    primary_mood: Option<String>,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    primary_context: Option<String>,
    #[serde(default)]
    vocal_gender: Option<String>,
    #[serde(default)]
    extended_metadata: Option<serde_json::Value>,
    #[serde(default)]
    outputs: Vec<CatalogOutput>,
}

impl CatalogSong {
    /// Text used for the semantic embedding: the descriptive prompt
    /// when present, else the generation prompt, else the title
    fn embedding_text(&self) -> &str {
        self.acoustic_prompt_descriptive
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.prompt.as_deref().filter(|s| !s.trim().is_empty()))
            .unwrap_or(&self.title)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "setlist_ingest=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let args = Args::parse();

    let songs = read_catalog(&args.input)?;
    tracing::info!(count = songs.len(), "Parsed catalog");
    if songs.is_empty() {
        return Ok(());
    }

    let provider = EmbeddingProviderConfig::from_env().map_err(|e| anyhow::anyhow!("{}", e))?;
    let client = EmbeddingClient::new(&provider)?;

    let pool = if args.dry_run {
        None
    } else {
        let database = DatabaseConfig::from_env().map_err(|e| anyhow::anyhow!("{}", e))?;
        Some(
            PgPoolOptions::new()
                .max_connections(4)
                .connect(&database.url)
                .await
                .context("Failed to connect to database")?,
        )
    };

    let mut inserted = 0_usize;
    let mut skipped = 0_usize;

    for chunk in songs.chunks(args.batch_size.max(1)) {
        let texts: Vec<String> = chunk
            .iter()
            .map(|song| song.embedding_text().to_string())
            .collect();

        let embeddings = match client.embed_batch(&texts).await {
            Ok(embeddings) => embeddings,
            Err(e) => {
                tracing::error!(error = %e, count = chunk.len(), "Embedding batch failed, skipping");
                skipped += chunk.len();
                continue;
            }
        };

        for (song, embedding) in chunk.iter().zip(embeddings) {
            match &pool {
                Some(pool) => match insert_song(pool, song, embedding).await {
                    Ok(()) => inserted += 1,
                    Err(e) => {
                        tracing::error!(title = %song.title, error = %e, "Insert failed, skipping");
                        skipped += 1;
                    }
                },
                None => inserted += 1,
            }
        }
    }

    tracing::info!(inserted, skipped, dry_run = args.dry_run, "Ingestion complete");

    if inserted == 0 && skipped > 0 {
        anyhow::bail!("all {} songs failed to ingest", skipped);
    }
    Ok(())
}

/// Parse the JSONL catalog; blank lines are ignored, a malformed line
/// is a hard error with its line number
fn read_catalog(path: &PathBuf) -> Result<Vec<CatalogSong>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut songs = Vec::new();
    for (line_number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let song: CatalogSong = serde_json::from_str(&line)
            .with_context(|| format!("Malformed catalog entry at line {}", line_number + 1))?;
        songs.push(song);
    }
    Ok(songs)
}

/// Insert one song and its outputs in a single transaction
async fn insert_song(pool: &PgPool, song: &CatalogSong, embedding: Vec<f32>) -> Result<()> {
    let song_id = song.id.unwrap_or_else(Uuid::new_v4);
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO songs
            (id, title, prompt, lyrics, acoustic_prompt_descriptive, embedding,
             bpm, musical_key, primary_genre, primary_mood, format,
             primary_context, vocal_gender, extended_metadata)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(song_id)
    .bind(&song.title)
    .bind(&song.prompt)
    .bind(&song.lyrics)
    .bind(&song.acoustic_prompt_descriptive)
    .bind(Vector::from(embedding))
    .bind(song.bpm)
    .bind(&song.musical_key)
    .bind(&song.primary_genre)
    .bind(&song.primary_mood)
    .bind(&song.format)
    .bind(&song.primary_context)
    .bind(&song.vocal_gender)
    .bind(
        song.extended_metadata
            .clone()
            .unwrap_or_else(|| serde_json::json!({})),
    )
    .execute(&mut *tx)
    .await?;

    for output in &song.outputs {
        sqlx::query(
            r#"
            INSERT INTO audio_outputs (id, song_id, output_number, audio_url, sounds_description)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(output.id.unwrap_or_else(Uuid::new_v4))
        .bind(song_id)
        .bind(output.output_number)
        .bind(&output.audio_url)
        .bind(&output.sounds_description)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}
