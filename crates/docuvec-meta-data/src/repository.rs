//! `PostgreSQL` implementation of the document repository

use async_trait::async_trait;
use docuvec_common::CorrelationId;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::error::{DatabaseError, DatabaseResult, SqlxResultExt};
use crate::models::{Chunk, Document, DocumentStatus, NewChunk};
use crate::traits::DocumentRepository;

#[derive(Clone)]
pub struct PgDocumentRepository {
    pool: PgPool,
}

impl PgDocumentRepository {
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn document_from_row(row: &PgRow) -> Result<Document, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(Document {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        status: DocumentStatus::from(status),
        source_key: row.try_get("source_key")?,
        canonical_key: row.try_get("canonical_key")?,
        tags: row.try_get("tags")?,
        error: row.try_get("error")?,
        generation: row.try_get("generation")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn chunk_from_row(row: &PgRow) -> Result<Chunk, sqlx::Error> {
    Ok(Chunk {
        id: row.try_get("id")?,
        document_id: row.try_get("document_id")?,
        chunk_idx: row.try_get("chunk_idx")?,
        text: row.try_get("text")?,
        is_header: row.try_get("is_header")?,
        is_table: row.try_get("is_table")?,
        parent_section: row.try_get("parent_section")?,
        embedding_model: row.try_get("embedding_model")?,
        embedding_version: row.try_get("embedding_version")?,
        vector_point_id: row.try_get("vector_point_id")?,
        generation: row.try_get("generation")?,
        created_at: row.try_get("created_at")?,
    })
}

const CHUNK_COLUMNS: &str = "id, document_id, chunk_idx, text, is_header, is_table, \
     parent_section, embedding_model, embedding_version, vector_point_id, generation, created_at";

#[async_trait]
impl DocumentRepository for PgDocumentRepository {
    #[tracing::instrument(skip(self, document), fields(document_id = %document.id))]
    async fn create_document(&self, document: &Document) -> DatabaseResult<()> {
        sqlx::query(
            r"
            INSERT INTO documents
                (id, tenant_id, status, source_key, canonical_key, tags, error,
                 generation, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ",
        )
        .bind(document.id)
        .bind(document.tenant_id)
        .bind(document.status.to_string())
        .bind(&document.source_key)
        .bind(&document.canonical_key)
        .bind(&document.tags)
        .bind(&document.error)
        .bind(document.generation)
        .bind(document.created_at)
        .bind(document.updated_at)
        .execute(&self.pool)
        .await
        .map_db_err("create_document")?;
        Ok(())
    }

    async fn get_document(&self, id: Uuid) -> DatabaseResult<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_db_err("get_document")?;
        row.as_ref()
            .map(document_from_row)
            .transpose()
            .map_db_err("get_document_row")
    }

    #[tracing::instrument(skip(self), fields(%from, %to))]
    async fn transition_status(
        &self,
        id: Uuid,
        from: DocumentStatus,
        to: DocumentStatus,
        correlation_id: &CorrelationId,
    ) -> DatabaseResult<bool> {
        if !from.can_transition(to) {
            return Err(DatabaseError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        // WHERE status = from makes the transition atomic: a duplicate or
        // out-of-order task sees zero rows updated
        let result = sqlx::query(
            r"
            UPDATE documents
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            ",
        )
        .bind(id)
        .bind(from.to_string())
        .bind(to.to_string())
        .execute(&self.pool)
        .await
        .map_db_err("transition_status")?;

        let transitioned = result.rows_affected() == 1;
        tracing::info!(
            correlation_id = %correlation_id,
            document_id = %id,
            from = %from,
            to = %to,
            transitioned,
            "Document status transition"
        );
        Ok(transitioned)
    }

    async fn set_canonical_key(&self, id: Uuid, canonical_key: &str) -> DatabaseResult<()> {
        sqlx::query(
            r"
            UPDATE documents
            SET canonical_key = $2, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(canonical_key)
        .execute(&self.pool)
        .await
        .map_db_err("set_canonical_key")?;
        Ok(())
    }

    #[tracing::instrument(skip(self, message))]
    async fn mark_error(&self, id: Uuid, message: &str) -> DatabaseResult<()> {
        sqlx::query(
            r"
            UPDATE documents
            SET status = 'error', error = $2, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(message)
        .execute(&self.pool)
        .await
        .map_db_err("mark_error")?;
        Ok(())
    }

    async fn reset_for_reanalyze(&self, id: Uuid) -> DatabaseResult<i64> {
        let row = sqlx::query(
            r"
            UPDATE documents
            SET status = 'uploaded',
                error = NULL,
                canonical_key = NULL,
                generation = generation + 1,
                updated_at = NOW()
            WHERE id = $1 AND status IN ('error', 'ready')
            RETURNING generation
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_db_err("reset_for_reanalyze")?
        .ok_or_else(|| DatabaseError::NotFound {
            entity: "document (in error/ready state)",
            id: id.to_string(),
        })?;
        row.try_get("generation").map_db_err("reset_row")
    }

    #[tracing::instrument(skip(self, chunks), fields(chunk_count = chunks.len()))]
    async fn replace_generation(
        &self,
        document_id: Uuid,
        generation: i64,
        chunks: &[NewChunk],
    ) -> DatabaseResult<Vec<Uuid>> {
        let mut tx = self.pool.begin().await.map_db_err("replace_generation_begin")?;

        // Collect stale point ids before deleting so the caller can purge
        // the vector index
        let superseded: Vec<Uuid> = sqlx::query(
            r"
            SELECT vector_point_id
            FROM chunks
            WHERE document_id = $1
              AND generation < $2
              AND vector_point_id IS NOT NULL
            ",
        )
        .bind(document_id)
        .bind(generation)
        .fetch_all(&mut *tx)
        .await
        .map_db_err("replace_generation_select")?
        .iter()
        .filter_map(|row| row.try_get("vector_point_id").ok())
        .collect();

        sqlx::query("DELETE FROM chunks WHERE document_id = $1 AND generation < $2")
            .bind(document_id)
            .bind(generation)
            .execute(&mut *tx)
            .await
            .map_db_err("replace_generation_delete")?;

        for chunk in chunks {
            sqlx::query(
                r"
                INSERT INTO chunks
                    (id, document_id, chunk_idx, text, is_header, is_table,
                     parent_section, generation, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
                ON CONFLICT (document_id, chunk_idx, generation) DO UPDATE
                SET text = EXCLUDED.text,
                    is_header = EXCLUDED.is_header,
                    is_table = EXCLUDED.is_table,
                    parent_section = EXCLUDED.parent_section
                ",
            )
            .bind(Uuid::new_v4())
            .bind(document_id)
            .bind(chunk.chunk_idx)
            .bind(&chunk.text)
            .bind(chunk.is_header)
            .bind(chunk.is_table)
            .bind(&chunk.parent_section)
            .bind(generation)
            .execute(&mut *tx)
            .await
            .map_db_err("replace_generation_insert")?;
        }

        tx.commit().await.map_db_err("replace_generation_commit")?;
        Ok(superseded)
    }

    async fn pending_chunks(&self, document_id: Uuid) -> DatabaseResult<Vec<Chunk>> {
        let rows = sqlx::query(&format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks \
             WHERE document_id = $1 AND vector_point_id IS NULL \
             ORDER BY chunk_idx"
        ))
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_db_err("pending_chunks")?;
        rows.iter()
            .map(chunk_from_row)
            .collect::<Result<_, _>>()
            .map_db_err("pending_chunks_row")
    }

    async fn set_chunk_embedding(
        &self,
        chunk_id: Uuid,
        model: &str,
        version: &str,
        point_id: Uuid,
    ) -> DatabaseResult<()> {
        sqlx::query(
            r"
            UPDATE chunks
            SET embedding_model = $2,
                embedding_version = $3,
                vector_point_id = $4
            WHERE id = $1
            ",
        )
        .bind(chunk_id)
        .bind(model)
        .bind(version)
        .bind(point_id)
        .execute(&self.pool)
        .await
        .map_db_err("set_chunk_embedding")?;
        Ok(())
    }

    async fn list_chunks(&self, document_id: Uuid) -> DatabaseResult<Vec<Chunk>> {
        let rows = sqlx::query(&format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks \
             WHERE document_id = $1 \
               AND generation = (SELECT generation FROM documents WHERE id = $1) \
             ORDER BY chunk_idx"
        ))
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_db_err("list_chunks")?;
        rows.iter()
            .map(chunk_from_row)
            .collect::<Result<_, _>>()
            .map_db_err("list_chunks_row")
    }

    #[tracing::instrument(skip(self))]
    async fn delete_document(
        &self,
        id: Uuid,
        correlation_id: &CorrelationId,
    ) -> DatabaseResult<Vec<Uuid>> {
        let mut tx = self.pool.begin().await.map_db_err("delete_document_begin")?;

        let point_ids: Vec<Uuid> = sqlx::query(
            r"
            SELECT vector_point_id
            FROM chunks
            WHERE document_id = $1 AND vector_point_id IS NOT NULL
            ",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await
        .map_db_err("delete_document_select")?
        .iter()
        .filter_map(|row| row.try_get("vector_point_id").ok())
        .collect();

        sqlx::query("DELETE FROM chunks WHERE document_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_db_err("delete_document_chunks")?;
        sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_db_err("delete_document_row")?;

        tx.commit().await.map_db_err("delete_document_commit")?;
        tracing::info!(
            correlation_id = %correlation_id,
            document_id = %id,
            cascaded_points = point_ids.len(),
            "Deleted document with chunk cascade"
        );
        Ok(point_ids)
    }
}
