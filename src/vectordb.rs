//! Bookmark storage in PostgreSQL with the pgvector extension.  Text is embedded locally before
//! it is written or searched.

use crate::log_internal;
use anyhow::{anyhow, Result};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use pgvector::Vector;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::sync::{Arc, Mutex};

/// Database connection parameters
#[derive(Clone, clap::Args)]
pub struct DbConnect {
    /// Database host
    #[arg(long = "db-host", env = "DB_HOST", default_value = "localhost")]
    pub host: String,
    /// Database port
    #[arg(long = "db-port", env = "DB_PORT", default_value_t = 5432)]
    pub port: u16,
    /// Database user
    #[arg(long = "db-user", env = "DB_USER", default_value = "oori")]
    pub user: String,
    /// Database password
    #[arg(
        long = "db-password",
        env = "DB_PASSWORD",
        default_value = "example",
        hide_env_values = true
    )]
    pub password: String,
    /// Database name
    #[arg(long = "db-name", env = "DB_NAME", default_value = "PGv")]
    pub name: String,
}

/// A stored row close to a search query
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub content: String,
    pub tags: Vec<String>,
    /// Cosine similarity to the query; higher is closer.
    pub similarity: f64,
}

/// Vector store holding embedded bookmark text
#[serenity::async_trait]
pub trait VectorStore: Send + Sync {
    /// Embed `content` and persist it alongside `tags`.
    async fn insert(&self, content: &str, tags: &[String]) -> Result<()>;
    /// Embed `query` and return up to `limit` rows, most similar first.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Neighbor>>;
}

/// Text to vector conversion
pub trait Embedder: Send + Sync {
    /// Length of every vector returned by `embed`.
    fn dimension(&self) -> usize;
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Map a sentence-transformers style model name onto a locally runnable model and its dimension.
fn resolve_model(name: &str) -> Result<(EmbeddingModel, usize)> {
    let short = name.strip_prefix("sentence-transformers/").unwrap_or(name);
    match short {
        "all-MiniLM-L6-v2" => Ok((EmbeddingModel::AllMiniLML6V2, 384)),
        "all-MiniLM-L12-v2" => Ok((EmbeddingModel::AllMiniLML12V2, 384)),
        "BAAI/bge-small-en-v1.5" => Ok((EmbeddingModel::BGESmallENV15, 384)),
        "BAAI/bge-base-en-v1.5" => Ok((EmbeddingModel::BGEBaseENV15, 768)),
        _ => Err(anyhow!("Unsupported embedding model `{}`", name)),
    }
}

/// Local ONNX sentence embeddings
pub struct FastEmbedder {
    // Embedding needs exclusive access to the model session.
    model: Mutex<TextEmbedding>,
    dimension: usize,
}

impl FastEmbedder {
    /// Load (downloading on first use) the named model.  Blocks; call off the async runtime.
    pub fn load(name: &str) -> Result<Self> {
        let (model, dimension) = resolve_model(name)?;

        log_internal!("Loading embedding model {}... ", name);
        let model = TextEmbedding::try_new(
            InitOptions::new(model).with_show_download_progress(false),
        )
        .map_err(|e| anyhow!("Could not load embedding model `{}`: {}", name, e))?;
        log_internal!("Loading embedding model {}... done", name);

        Ok(Self {
            model: Mutex::new(model),
            dimension,
        })
    }
}

impl Embedder for FastEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut model = self
            .model
            .lock()
            .map_err(|_| anyhow!("Embedding model lock poisoned"))?;
        model
            .embed(vec![text.to_owned()], None)
            .map_err(|e| anyhow!("Could not embed text: {}", e))?
            .into_iter()
            .next()
            .ok_or(anyhow!("Embedding model returned no vector"))
    }
}

/// Run the CPU-bound embedding on the blocking pool so the gateway keeps being serviced.
async fn embed_blocking(embedder: &Arc<dyn Embedder>, text: &str) -> Result<Vec<f32>> {
    let embedder = Arc::clone(embedder);
    let text = text.to_owned();
    tokio::task::spawn_blocking(move || embedder.embed(&text)).await?
}

/// Bookmark table in PostgreSQL, searched by cosine distance
pub struct PgVectorStore {
    pool: PgPool,
    table: String,
    embedder: Arc<dyn Embedder>,
}

impl PgVectorStore {
    /// `table` must already be validated as a plain SQL identifier.
    pub async fn connect(db: &DbConnect, table: &str, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let options = PgConnectOptions::new()
            .host(&db.host)
            .port(db.port)
            .username(&db.user)
            .password(&db.password)
            .database(&db.name);

        log_internal!("Connecting to database {} at {}:{}... ", db.name, db.host, db.port);
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| {
                anyhow!(
                    "Could not connect to database `{}` at {}:{}: {}",
                    db.name,
                    db.host,
                    db.port,
                    e
                )
            })?;
        log_internal!("Connecting to database {} at {}:{}... done", db.name, db.host, db.port);

        Ok(Self {
            pool,
            table: table.to_owned(),
            embedder,
        })
    }

    /// Create the pgvector extension and the bookmark table if they do not exist yet.
    pub async fn create_table(&self) -> Result<()> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await?;

        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             id BIGSERIAL PRIMARY KEY, \
             embedding VECTOR({}), \
             content TEXT NOT NULL, \
             tags TEXT[])",
            self.table,
            self.embedder.dimension()
        );
        sqlx::query(&sql).execute(&self.pool).await.map_err(|e| {
            anyhow!("Could not create table `{}`: {}", self.table, e)
        })?;

        Ok(())
    }
}

#[serenity::async_trait]
impl VectorStore for PgVectorStore {
    async fn insert(&self, content: &str, tags: &[String]) -> Result<()> {
        let embedding = embed_blocking(&self.embedder, content).await?;

        let sql = format!(
            "INSERT INTO {} (embedding, content, tags) VALUES ($1, $2, $3)",
            self.table
        );
        sqlx::query(&sql)
            .bind(Vector::from(embedding))
            .bind(content)
            .bind(tags.to_vec())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Neighbor>> {
        let embedding = embed_blocking(&self.embedder, query).await?;

        let sql = format!(
            "SELECT content, tags, 1 - (embedding <=> $1) AS similarity \
             FROM {} ORDER BY embedding <=> $1 LIMIT $2",
            self.table
        );
        let rows: Vec<(String, Option<Vec<String>>, f64)> = sqlx::query_as(&sql)
            .bind(Vector::from(embedding))
            .bind(i64::try_from(limit)?)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(content, tags, similarity)| Neighbor {
                content,
                tags: tags.unwrap_or_default(),
                similarity,
            })
            .collect())
    }
}
