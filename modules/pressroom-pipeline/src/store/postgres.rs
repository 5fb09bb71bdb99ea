use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use pressroom_common::{
    Classification, ContentVariant, Document, Language, Ministry, NewDocument, NewVariant,
    PressroomError, VariantKind,
};

use crate::traits::{DocumentRegistry, JobLedger, JobProgress};

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const DOCUMENT_COLUMNS: &str = "id, source_url, title, original_text, ministry_id, published_at, \
     origin_office, audiences, categories, is_ready, created_at";

const VARIANT_COLUMNS: &str = "id, document_id, language, kind, body, title, created_at";

#[derive(sqlx::FromRow)]
struct MinistryRow {
    id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
}

impl From<MinistryRow> for Ministry {
    fn from(row: MinistryRow) -> Self {
        Ministry {
            id: row.id,
            name: row.name,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: Uuid,
    source_url: String,
    title: String,
    original_text: String,
    ministry_id: Uuid,
    published_at: DateTime<Utc>,
    origin_office: Option<String>,
    audiences: Vec<String>,
    categories: Vec<String>,
    is_ready: bool,
    created_at: DateTime<Utc>,
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        Document {
            id: row.id,
            source_url: row.source_url,
            title: row.title,
            original_text: row.original_text,
            ministry_id: row.ministry_id,
            published_at: row.published_at,
            origin_office: row.origin_office,
            classification: Classification {
                audiences: row.audiences,
                categories: row.categories,
            },
            is_ready: row.is_ready,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct VariantRow {
    id: Uuid,
    document_id: Uuid,
    language: String,
    kind: String,
    body: String,
    title: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<VariantRow> for ContentVariant {
    type Error = PressroomError;

    fn try_from(row: VariantRow) -> Result<Self, Self::Error> {
        Ok(ContentVariant {
            id: row.id,
            document_id: row.document_id,
            language: row.language.parse().map_err(PressroomError::Database)?,
            kind: row.kind.parse().map_err(PressroomError::Database)?,
            body: row.body,
            title: row.title,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    document_id: Uuid,
    fan_out: i32,
    completed: i32,
}

impl From<JobRow> for JobProgress {
    fn from(row: JobRow) -> Self {
        JobProgress {
            document_id: row.document_id,
            fan_out: row.fan_out.max(0) as u32,
            completed: row.completed.max(0) as u32,
        }
    }
}

/// Registry and job ledger backed by Postgres.
#[derive(Clone)]
pub struct PgRegistry {
    pool: PgPool,
}

impl PgRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| PressroomError::Database(format!("connect failed: {e}")))?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_document_where(&self, clause: &str, bind: impl ToString) -> Result<Option<Document>> {
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE {clause}");
        let row = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(bind.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }
}

fn into_variants(rows: Vec<VariantRow>) -> Result<Vec<ContentVariant>> {
    rows.into_iter()
        .map(|r| ContentVariant::try_from(r).map_err(Into::into))
        .collect()
}

#[async_trait]
impl DocumentRegistry for PgRegistry {
    async fn document_exists(&self, source_url: &str) -> Result<bool> {
        let (exists,) = sqlx::query_as::<_, (bool,)>(
            "SELECT EXISTS (SELECT 1 FROM documents WHERE source_url = $1)",
        )
        .bind(source_url)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn find_document(&self, source_url: &str) -> Result<Option<Document>> {
        self.fetch_document_where("source_url = $1", source_url).await
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1");
        let row = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents ORDER BY created_at");
        let rows = sqlx::query_as::<_, DocumentRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn ready_documents(&self) -> Result<Vec<Document>> {
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE is_ready ORDER BY published_at DESC"
        );
        let rows = sqlx::query_as::<_, DocumentRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn unready_documents(&self, created_before: DateTime<Utc>) -> Result<Vec<Document>> {
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE NOT is_ready AND created_at < $1 ORDER BY created_at"
        );
        let rows = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(created_before)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_or_create_ministry(&self, name: &str) -> Result<Ministry> {
        let name = name.trim();
        let inserted = sqlx::query_as::<_, MinistryRow>(
            r#"
            INSERT INTO ministries (id, name)
            VALUES ($1, $2)
            ON CONFLICT (name) DO NOTHING
            RETURNING id, name, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok(row.into());
        }

        let row = sqlx::query_as::<_, MinistryRow>(
            "SELECT id, name, created_at FROM ministries WHERE name = $1",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn get_ministry(&self, id: Uuid) -> Result<Option<Ministry>> {
        let row = sqlx::query_as::<_, MinistryRow>(
            "SELECT id, name, created_at FROM ministries WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn create_document_if_absent(&self, new: NewDocument) -> Result<(Document, bool)> {
        let sql = format!(
            r#"
            INSERT INTO documents (id, source_url, title, original_text, ministry_id,
                                   published_at, origin_office, audiences, categories)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (source_url) DO NOTHING
            RETURNING {DOCUMENT_COLUMNS}
            "#
        );
        let inserted = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&new.source_url)
            .bind(&new.title)
            .bind(&new.original_text)
            .bind(new.ministry_id)
            .bind(new.published_at)
            .bind(&new.origin_office)
            .bind(&new.classification.audiences)
            .bind(&new.classification.categories)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = inserted {
            return Ok((row.into(), true));
        }

        // Lost the race (or a replay): read the winner.
        let existing = self
            .find_document(&new.source_url)
            .await?
            .ok_or_else(|| PressroomError::Database(format!("document {} vanished", new.source_url)))?;
        Ok((existing, false))
    }

    async fn set_classification(&self, id: Uuid, classification: &Classification) -> Result<()> {
        let result = sqlx::query("UPDATE documents SET audiences = $2, categories = $3 WHERE id = $1")
            .bind(id)
            .bind(&classification.audiences)
            .bind(&classification.categories)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(PressroomError::DocumentNotFound(id).into());
        }
        Ok(())
    }

    async fn mark_ready(&self, id: Uuid) -> Result<bool> {
        let flipped = sqlx::query_as::<_, (Uuid,)>(
            "UPDATE documents SET is_ready = TRUE WHERE id = $1 AND NOT is_ready RETURNING id",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        if flipped.is_some() {
            return Ok(true);
        }
        if self.get_document(id).await?.is_none() {
            return Err(PressroomError::DocumentNotFound(id).into());
        }
        Ok(false)
    }

    async fn variant_exists(
        &self,
        document_id: Uuid,
        kind: VariantKind,
        language: Language,
    ) -> Result<bool> {
        let (exists,) = sqlx::query_as::<_, (bool,)>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM content_variants
                WHERE document_id = $1 AND kind = $2 AND language = $3
            )
            "#,
        )
        .bind(document_id)
        .bind(kind.as_str())
        .bind(language.code())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn save_variant(&self, new: NewVariant) -> Result<ContentVariant> {
        let sql = format!(
            r#"
            INSERT INTO content_variants (id, document_id, language, kind, body, title)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT DO NOTHING
            RETURNING {VARIANT_COLUMNS}
            "#
        );
        let inserted = sqlx::query_as::<_, VariantRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(new.document_id)
            .bind(new.language.code())
            .bind(new.kind.as_str())
            .bind(&new.body)
            .bind(&new.title)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = inserted {
            return Ok(row.try_into()?);
        }

        // Only the one-original-per-document index can reject an insert.
        let sql = format!(
            "SELECT {VARIANT_COLUMNS} FROM content_variants WHERE document_id = $1 AND kind = 'original'"
        );
        let row = sqlx::query_as::<_, VariantRow>(&sql)
            .bind(new.document_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_into()?)
    }

    async fn variants(
        &self,
        document_id: Uuid,
        kind: VariantKind,
        language: Language,
    ) -> Result<Vec<ContentVariant>> {
        let sql = format!(
            r#"
            SELECT {VARIANT_COLUMNS} FROM content_variants
            WHERE document_id = $1 AND kind = $2 AND language = $3
            ORDER BY created_at, id
            "#
        );
        let rows = sqlx::query_as::<_, VariantRow>(&sql)
            .bind(document_id)
            .bind(kind.as_str())
            .bind(language.code())
            .fetch_all(&self.pool)
            .await?;
        into_variants(rows)
    }

    async fn all_variants(&self, document_id: Uuid) -> Result<Vec<ContentVariant>> {
        let sql = format!(
            "SELECT {VARIANT_COLUMNS} FROM content_variants WHERE document_id = $1 ORDER BY created_at, id"
        );
        let rows = sqlx::query_as::<_, VariantRow>(&sql)
            .bind(document_id)
            .fetch_all(&self.pool)
            .await?;
        into_variants(rows)
    }

    async fn available_languages(&self, document_id: Uuid) -> Result<Vec<Language>> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT DISTINCT language FROM content_variants WHERE document_id = $1",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        let mut languages = rows
            .into_iter()
            .map(|(code,)| code.parse::<Language>().map_err(PressroomError::Database))
            .collect::<Result<Vec<_>, _>>()?;
        languages.sort();
        Ok(languages)
    }
}

#[async_trait]
impl JobLedger for PgRegistry {
    async fn open_job(&self, document_id: Uuid, fan_out: u32) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO fanout_jobs (id, document_id, fan_out) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(document_id)
            .bind(fan_out as i32)
            .execute(&self.pool)
            .await?;
        Ok(id)
    }

    async fn record_leaf(&self, job_id: Uuid) -> Result<JobProgress> {
        // Single-statement increment: each caller sees a distinct `completed`.
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE fanout_jobs SET completed = completed + 1
            WHERE id = $1
            RETURNING document_id, fan_out, completed
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| anyhow::anyhow!("unknown fan-out job {job_id}"))?;
        Ok(row.into())
    }
}
