//! Document CRUD operations.
//!
//! Every read, update and delete that originates from a user request is scoped
//! through the owning search space, so documents in another user's space are
//! indistinguishable from documents that do not exist.

use chrono::Utc;
use rusqlite::{OptionalExtension, params};

use super::models::{Document, DocumentType};
use super::{Session, format_timestamp};
use crate::error::{DatabaseError, ServiceError, ServiceResult};

const DOCUMENT_COLUMNS: &str = "d.id, d.title, d.document_type, d.document_metadata, d.content, \
     d.content_hash, d.created_at, d.search_space_id";

/// A document produced by an ingestion routine, ready to insert
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub search_space_id: i64,
    pub title: String,
    pub document_type: DocumentType,
    pub document_metadata: serde_json::Value,
    pub content: String,
    pub content_hash: String,
}

/// Fields to change on an existing document; `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct DocumentChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    /// Must accompany `content`
    pub content_hash: Option<String>,
    pub document_type: Option<DocumentType>,
    pub document_metadata: Option<serde_json::Value>,
    pub search_space_id: Option<i64>,
}

impl DocumentChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.document_type.is_none()
            && self.document_metadata.is_none()
            && self.search_space_id.is_none()
    }
}

impl Session {
    /// Insert a new document, returning its id
    pub fn insert_document(&self, doc: &NewDocument) -> ServiceResult<i64> {
        let metadata_json =
            serde_json::to_string(&doc.document_metadata).map_err(DatabaseError::Serialization)?;

        self.conn
            .execute(
                r#"
                INSERT INTO documents (search_space_id, title, document_type, document_metadata, content, content_hash, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    doc.search_space_id,
                    doc.title,
                    doc.document_type.as_str(),
                    metadata_json,
                    doc.content,
                    doc.content_hash,
                    format_timestamp(Utc::now()),
                ],
            )
            .map_err(DatabaseError::Query)?;

        Ok(self.conn.last_insert_rowid())
    }

    /// Check if a document with the given content hash already exists in a search space.
    /// Returns the document ID if found.
    pub fn find_document_by_hash(
        &self,
        search_space_id: i64,
        content_hash: &str,
    ) -> ServiceResult<Option<i64>> {
        self.conn
            .query_row(
                "SELECT id FROM documents WHERE search_space_id = ?1 AND content_hash = ?2",
                params![search_space_id, content_hash],
                |row| row.get(0),
            )
            .optional()
            .map_err(DatabaseError::Query)
            .map_err(Into::into)
    }

    /// Get a document by ID if the user owns its search space
    pub fn get_owned_document(
        &self,
        document_id: i64,
        user_id: &str,
    ) -> ServiceResult<Option<Document>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {DOCUMENT_COLUMNS} FROM documents d \
                     JOIN search_spaces s ON s.id = d.search_space_id \
                     WHERE d.id = ?1 AND s.user_id = ?2"
                ),
                params![document_id, user_id],
                Document::from_row,
            )
            .optional()
            .map_err(DatabaseError::Query)
            .map_err(Into::into)
    }

    pub fn require_owned_document(&self, document_id: i64, user_id: &str) -> ServiceResult<Document> {
        self.get_owned_document(document_id, user_id)?
            .ok_or(ServiceError::DocumentNotFound { document_id })
    }

    /// List a user's documents, optionally restricted to one search space, ordered by id
    pub fn list_owned_documents(
        &self,
        user_id: &str,
        search_space_id: Option<i64>,
        skip: u32,
        limit: u32,
    ) -> ServiceResult<Vec<Document>> {
        let mut sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents d \
             JOIN search_spaces s ON s.id = d.search_space_id \
             WHERE s.user_id = ?1"
        );

        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(user_id.to_string())];
        if let Some(space_id) = search_space_id {
            params_vec.push(Box::new(space_id));
            sql.push_str(&format!(" AND d.search_space_id = ?{}", params_vec.len()));
        }
        sql.push_str(&format!(
            " ORDER BY d.id LIMIT ?{} OFFSET ?{}",
            params_vec.len() + 1,
            params_vec.len() + 2
        ));
        params_vec.push(Box::new(i64::from(limit)));
        params_vec.push(Box::new(i64::from(skip)));

        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql).map_err(DatabaseError::Query)?;
        let rows = stmt
            .query_map(params_refs.as_slice(), Document::from_row)
            .map_err(DatabaseError::Query)?;

        let mut docs = Vec::new();
        for row in rows {
            docs.push(row.map_err(DatabaseError::Query)?);
        }

        Ok(docs)
    }

    /// Apply a partial update. Ownership must already have been checked.
    pub fn update_document(&self, document_id: i64, changes: &DocumentChanges) -> ServiceResult<bool> {
        if changes.is_empty() {
            return Ok(true);
        }

        let mut assignments: Vec<String> = Vec::new();
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        let mut set = |column: &str, value: Box<dyn rusqlite::ToSql>| {
            params_vec.push(value);
            assignments.push(format!("{} = ?{}", column, params_vec.len()));
        };

        if let Some(title) = &changes.title {
            set("title", Box::new(title.clone()));
        }
        if let Some(content) = &changes.content {
            set("content", Box::new(content.clone()));
        }
        if let Some(content_hash) = &changes.content_hash {
            set("content_hash", Box::new(content_hash.clone()));
        }
        if let Some(document_type) = changes.document_type {
            set("document_type", Box::new(document_type.as_str()));
        }
        if let Some(metadata) = &changes.document_metadata {
            let metadata_json =
                serde_json::to_string(metadata).map_err(DatabaseError::Serialization)?;
            set("document_metadata", Box::new(metadata_json));
        }
        if let Some(search_space_id) = changes.search_space_id {
            set("search_space_id", Box::new(search_space_id));
        }

        params_vec.push(Box::new(document_id));
        let sql = format!(
            "UPDATE documents SET {} WHERE id = ?{}",
            assignments.join(", "),
            params_vec.len()
        );

        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let rows = self
            .conn
            .execute(&sql, params_refs.as_slice())
            .map_err(DatabaseError::Query)?;

        Ok(rows > 0)
    }

    /// Delete a document the user owns; its chunks cascade
    pub fn delete_owned_document(&self, document_id: i64, user_id: &str) -> ServiceResult<bool> {
        let rows = self
            .conn
            .execute(
                "DELETE FROM documents WHERE id = ?1 \
                 AND search_space_id IN (SELECT id FROM search_spaces WHERE user_id = ?2)",
                params![document_id, user_id],
            )
            .map_err(DatabaseError::Query)?;

        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::TestDatabase;

    fn new_doc(search_space_id: i64, title: &str, content: &str) -> NewDocument {
        NewDocument {
            search_space_id,
            title: title.to_string(),
            document_type: DocumentType::Extension,
            document_metadata: serde_json::json!({"k": "v"}),
            content: content.to_string(),
            content_hash: crate::ingestion::compute_content_hash(content.as_bytes()),
        }
    }

    #[test]
    fn test_other_users_documents_are_invisible() {
        let test_db = TestDatabase::new();
        let session = test_db.session();
        let alice = session.upsert_user("alice@example.com", "a").unwrap();
        let bob = session.upsert_user("bob@example.com", "b").unwrap();
        let space = session.insert_search_space(&alice.id, "A", None).unwrap();

        let id = session.insert_document(&new_doc(space.id, "Doc", "body")).unwrap();

        let doc = session.get_owned_document(id, &alice.id).unwrap().unwrap();
        assert_eq!(doc.title, "Doc");
        assert_eq!(doc.document_metadata["k"], "v");

        assert!(session.get_owned_document(id, &bob.id).unwrap().is_none());
        assert!(matches!(
            session.require_owned_document(id, &bob.id),
            Err(ServiceError::DocumentNotFound { document_id }) if document_id == id
        ));
        assert!(session.list_owned_documents(&bob.id, None, 0, 10).unwrap().is_empty());
        assert!(!session.delete_owned_document(id, &bob.id).unwrap());
        assert!(session.delete_owned_document(id, &alice.id).unwrap());
    }

    #[test]
    fn test_list_pagination_is_ordered_by_id() {
        let test_db = TestDatabase::new();
        let session = test_db.session();
        let user = session.upsert_user("a@example.com", "a").unwrap();
        let space = session.insert_search_space(&user.id, "A", None).unwrap();
        let other = session.insert_search_space(&user.id, "B", None).unwrap();

        let ids: Vec<i64> = (0..5)
            .map(|i| {
                session
                    .insert_document(&new_doc(space.id, &format!("d{i}"), &format!("c{i}")))
                    .unwrap()
            })
            .collect();
        session.insert_document(&new_doc(other.id, "elsewhere", "x")).unwrap();

        let first: Vec<i64> = session
            .list_owned_documents(&user.id, Some(space.id), 0, 2)
            .unwrap()
            .iter()
            .map(|d| d.id)
            .collect();
        let second: Vec<i64> = session
            .list_owned_documents(&user.id, Some(space.id), 2, 2)
            .unwrap()
            .iter()
            .map(|d| d.id)
            .collect();

        assert_eq!(first, ids[0..2]);
        assert_eq!(second, ids[2..4]);
        assert_eq!(session.list_owned_documents(&user.id, None, 0, 100).unwrap().len(), 6);
    }

    #[test]
    fn test_partial_update_touches_only_given_fields() {
        let test_db = TestDatabase::new();
        let session = test_db.session();
        let user = session.upsert_user("a@example.com", "a").unwrap();
        let space = session.insert_search_space(&user.id, "A", None).unwrap();
        let id = session.insert_document(&new_doc(space.id, "Old", "body")).unwrap();

        let changes = DocumentChanges {
            title: Some("New".to_string()),
            ..Default::default()
        };
        assert!(session.update_document(id, &changes).unwrap());

        let doc = session.require_owned_document(id, &user.id).unwrap();
        assert_eq!(doc.title, "New");
        assert_eq!(doc.content, "body");
        assert_eq!(doc.document_type, DocumentType::Extension);
    }

    #[test]
    fn test_hash_is_unique_per_search_space() {
        let test_db = TestDatabase::new();
        let session = test_db.session();
        let user = session.upsert_user("a@example.com", "a").unwrap();
        let first = session.insert_search_space(&user.id, "A", None).unwrap();
        let second = session.insert_search_space(&user.id, "B", None).unwrap();

        let doc = new_doc(first.id, "Doc", "same");
        let id = session.insert_document(&doc).unwrap();
        assert_eq!(
            session.find_document_by_hash(first.id, &doc.content_hash).unwrap(),
            Some(id)
        );
        assert!(session.insert_document(&doc).is_err());

        // The same content may live in another space
        session.insert_document(&new_doc(second.id, "Doc", "same")).unwrap();
    }
}
