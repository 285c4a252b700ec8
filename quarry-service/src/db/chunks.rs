//! Chunk storage.
//!
//! Chunks are the retrieval units derived from a document's content. They are
//! always replaced wholesale when a document's content changes.

use rusqlite::params;

use super::Session;
use crate::error::{DatabaseError, ServiceResult};

impl Session {
    /// Insert the chunks for a document, in order
    pub fn insert_chunks(&self, document_id: i64, chunks: &[String]) -> ServiceResult<()> {
        let mut stmt = self
            .conn
            .prepare(
                "INSERT INTO chunks (id, document_id, content, chunk_index) VALUES (?1, ?2, ?3, ?4)",
            )
            .map_err(DatabaseError::Query)?;

        for (index, content) in chunks.iter().enumerate() {
            stmt.execute(params![
                uuid::Uuid::new_v4().to_string(),
                document_id,
                content,
                index as i64,
            ])
            .map_err(DatabaseError::Query)?;
        }

        Ok(())
    }

    /// Remove every chunk of a document
    pub fn delete_chunks_for_document(&self, document_id: i64) -> ServiceResult<usize> {
        self.conn
            .execute(
                "DELETE FROM chunks WHERE document_id = ?1",
                params![document_id],
            )
            .map_err(DatabaseError::Query)
            .map_err(Into::into)
    }

    /// Get count of chunks for a document
    pub fn chunk_count(&self, document_id: i64) -> ServiceResult<usize> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM chunks WHERE document_id = ?1",
                params![document_id],
                |row| row.get(0),
            )
            .map_err(DatabaseError::Query)?;
        Ok(count as usize)
    }

    /// Chunk contents of a document in index order
    pub fn chunk_contents(&self, document_id: i64) -> ServiceResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT content FROM chunks WHERE document_id = ?1 ORDER BY chunk_index")
            .map_err(DatabaseError::Query)?;

        let rows = stmt
            .query_map(params![document_id], |row| row.get(0))
            .map_err(DatabaseError::Query)?;

        let mut contents = Vec::new();
        for row in rows {
            contents.push(row.map_err(DatabaseError::Query)?);
        }
        Ok(contents)
    }
}
