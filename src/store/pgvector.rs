//! Postgres/pgvector-backed store.

use async_trait::async_trait;
use pgvector::Vector;
use tokio::sync::Mutex;
use tokio_postgres::types::Json;
use tokio_postgres::{Client, NoTls, Row};

use super::{ensure_uniform_dimensions, EmbeddingRecord, ScoredRecord, StoreError, VectorStore};
use crate::normalizer::SectionHeading;
use crate::program::{ChunkKind, CurriculumChunk, ProgramId};

/// Fully-qualified Postgres table name (schema + table).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    schema: String,
    table: String,
}

impl TableName {
    /// Builds a new table identifier.
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Result<Self, StoreError> {
        let schema = schema.into();
        let table = table.into();
        if schema.trim().is_empty() {
            return Err(StoreError::Config("schema name is required".into()));
        }
        if table.trim().is_empty() {
            return Err(StoreError::Config("table name is required".into()));
        }
        Ok(Self { schema, table })
    }

    /// Fully-qualified table reference with quoted identifiers.
    pub fn qualified(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }
}

/// Quotes Postgres identifiers, escaping embedded quotes.
pub fn quote_ident(input: &str) -> String {
    format!("\"{}\"", input.replace('"', "\"\""))
}

/// [`VectorStore`] over a pgvector table, searched by cosine distance.
pub struct PgVectorStore {
    client: Mutex<Client>,
    table: TableName,
}

impl PgVectorStore {
    /// Connects to Postgres and drives the connection on a background task.
    pub async fn connect(database_url: &str, table: TableName) -> Result<Self, StoreError> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls).await?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::error!(error = %err, "postgres connection error");
            }
        });
        Ok(Self {
            client: Mutex::new(client),
            table,
        })
    }

    async fn table_exists(&self, client: &Client) -> Result<bool, StoreError> {
        let row = client
            .query_one(
                "SELECT to_regclass($1::TEXT) IS NOT NULL",
                &[&self.table.qualified()],
            )
            .await?;
        Ok(row.get(0))
    }
}

fn create_table_sql(table: &TableName, dims: usize) -> String {
    format!(
        "CREATE TABLE {} (
            program TEXT NOT NULL,
            source_url TEXT NOT NULL,
            ordinal BIGINT NOT NULL,
            kind TEXT NOT NULL,
            course TEXT,
            section_path JSONB NOT NULL,
            text TEXT NOT NULL,
            token_estimate BIGINT NOT NULL,
            embedding VECTOR({dims}) NOT NULL,
            PRIMARY KEY (program, ordinal)
        )",
        table.qualified()
    )
}

/// Statements that rebuild the table for `dims`-wide vectors. Dropping first
/// lets a reindex switch embedding models.
fn rebuild_table_sql(table: &TableName, dims: usize) -> [String; 2] {
    [
        format!("DROP TABLE IF EXISTS {}", table.qualified()),
        create_table_sql(table, dims),
    ]
}

fn insert_sql(table: &TableName) -> String {
    format!(
        "INSERT INTO {} \
            (program, source_url, ordinal, kind, course, section_path, text, token_estimate, embedding) \
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        table.qualified()
    )
}

fn select_sql(table: &TableName) -> String {
    format!(
        "SELECT \
            program, \
            source_url, \
            ordinal, \
            kind, \
            course, \
            section_path, \
            text, \
            token_estimate, \
            embedding <=> $1 AS distance \
        FROM {} \
        WHERE $3::TEXT IS NULL OR program = $3 \
        ORDER BY embedding <=> $1 ASC, program ASC, ordinal ASC \
        LIMIT $2",
        table.qualified()
    )
}

fn as_i64(value: usize, field: &str) -> Result<i64, StoreError> {
    i64::try_from(value)
        .map_err(|_| StoreError::Invalid(format!("{field} value {value} exceeds i64 range")))
}

fn chunk_from_row(row: &Row) -> Result<CurriculumChunk, StoreError> {
    let program: String = row.try_get("program")?;
    let program: ProgramId = program
        .parse()
        .map_err(|err: crate::program::UnknownProgram| StoreError::Invalid(err.to_string()))?;
    let kind: String = row.try_get("kind")?;
    let kind = ChunkKind::parse(&kind)
        .ok_or_else(|| StoreError::Invalid(format!("unknown chunk kind '{kind}'")))?;
    let Json(section): Json<Vec<SectionHeading>> = row.try_get("section_path")?;
    let ordinal: i64 = row.try_get("ordinal")?;
    let token_estimate: i64 = row.try_get("token_estimate")?;

    Ok(CurriculumChunk {
        program,
        source_url: row.try_get("source_url")?,
        section,
        kind,
        ordinal: ordinal.max(0) as usize,
        course: row.try_get("course")?,
        text: row.try_get("text")?,
        token_estimate: token_estimate.max(0) as usize,
    })
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn replace_all(&self, records: Vec<EmbeddingRecord>) -> Result<(), StoreError> {
        let dims = ensure_uniform_dimensions(&records)?;
        let mut client = self.client.lock().await;

        let Some(dims) = dims else {
            if self.table_exists(&client).await? {
                client
                    .execute(&format!("TRUNCATE {}", self.table.qualified()), &[])
                    .await?;
            }
            return Ok(());
        };

        client
            .execute("CREATE EXTENSION IF NOT EXISTS vector", &[])
            .await?;

        let transaction = client.transaction().await?;
        for statement in rebuild_table_sql(&self.table, dims) {
            transaction.execute(statement.as_str(), &[]).await?;
        }
        let statement = transaction.prepare(&insert_sql(&self.table)).await?;
        for record in &records {
            let chunk = &record.chunk;
            let ordinal = as_i64(chunk.ordinal, "ordinal")?;
            let token_estimate = as_i64(chunk.token_estimate, "token_estimate")?;
            let vector = Vector::from(record.embedding.clone());
            transaction
                .execute(
                    &statement,
                    &[
                        &chunk.program.slug(),
                        &chunk.source_url,
                        &ordinal,
                        &chunk.kind.as_str(),
                        &chunk.course,
                        &Json(&chunk.section),
                        &chunk.text,
                        &token_estimate,
                        &vector,
                    ],
                )
                .await?;
        }
        transaction.commit().await?;
        tracing::info!(
            table = %self.table.qualified(),
            records = records.len(),
            "replaced pgvector table"
        );
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        k: usize,
        program: Option<ProgramId>,
    ) -> Result<Vec<ScoredRecord>, StoreError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let limit = as_i64(k, "k")?;
        let vector = Vector::from(query.to_vec());
        let program = program.map(ProgramId::slug);
        let client = self.client.lock().await;
        let rows = client
            .query(
                select_sql(&self.table).as_str(),
                &[&vector, &limit, &program],
            )
            .await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in rows.iter().take(k) {
            let distance: f64 = row.try_get("distance")?;
            hits.push(ScoredRecord {
                chunk: chunk_from_row(row)?,
                score: (1.0 - distance) as f32,
            });
        }
        Ok(hits)
    }

    async fn len(&self) -> Result<usize, StoreError> {
        let client = self.client.lock().await;
        if !self.table_exists(&client).await? {
            return Ok(0);
        }
        let row = client
            .query_one(
                &format!("SELECT COUNT(*) FROM {}", self.table.qualified()),
                &[],
            )
            .await?;
        let count: i64 = row.try_get(0)?;
        Ok(count.max(0) as usize)
    }
}
