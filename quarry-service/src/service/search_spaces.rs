//! Search space management.

use tracing::info;

use crate::db::{SearchSpace, User};
use crate::error::{ServiceError, ServiceResult};
use crate::service::DocumentService;
use crate::service::submission::remove_staged_file;

impl DocumentService {
    pub fn create_search_space(
        &self,
        user: &User,
        name: &str,
        description: Option<&str>,
    ) -> ServiceResult<SearchSpace> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::InvalidRequest {
                message: "Search space name must not be empty".to_string(),
            });
        }

        let space = self
            .open_session()?
            .insert_search_space(&user.id, name, description)?;

        info!(search_space_id = space.id, user_id = %user.id, "Search space created");
        Ok(space)
    }

    pub fn list_search_spaces(&self, user: &User) -> ServiceResult<Vec<SearchSpace>> {
        self.open_session()?.list_search_spaces(&user.id)
    }

    pub fn get_search_space(&self, user: &User, search_space_id: i64) -> ServiceResult<SearchSpace> {
        self.open_session()?
            .require_owned_search_space(search_space_id, &user.id)
    }

    /// Delete a search space with its documents and jobs.
    ///
    /// Uploads staged for jobs that never ran are removed too.
    pub fn delete_search_space(&self, user: &User, search_space_id: i64) -> ServiceResult<()> {
        let session = self.open_session()?;

        let staged = session.in_transaction(|tx| {
            tx.require_owned_search_space(search_space_id, &user.id)?;
            let staged = tx.staged_paths_for_search_space(search_space_id)?;
            tx.delete_search_space(search_space_id, &user.id)?;
            Ok(staged)
        })?;

        for path in &staged {
            remove_staged_file(path);
        }

        info!(
            search_space_id,
            user_id = %user.id,
            staged_removed = staged.len(),
            "Search space deleted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::JobStatus;
    use crate::service::UploadedFile;
    use crate::service::test_support::TestService;

    #[test]
    fn test_create_requires_name() {
        let test = TestService::new();
        let user = test.user("a@example.com");

        assert!(matches!(
            test.service.create_search_space(&user, "  ", None),
            Err(ServiceError::InvalidRequest { .. })
        ));

        let space = test
            .service
            .create_search_space(&user, " Research ", Some("papers"))
            .unwrap();
        assert_eq!(space.name, "Research");
        assert_eq!(test.service.list_search_spaces(&user).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_cascades_and_cleans_uploads() {
        let test = TestService::new();
        let user = test.user("a@example.com");
        let other = test.user("b@example.com");
        let space = test.search_space(&user);

        test.service
            .stage_uploads(
                &user,
                space,
                vec![UploadedFile {
                    filename: "a.txt".to_string(),
                    data: bytes::Bytes::from_static(b"hello"),
                }],
            )
            .unwrap();
        assert_eq!(test.upload_dir_entries(), 1);

        assert!(matches!(
            test.service.delete_search_space(&other, space),
            Err(ServiceError::SearchSpaceNotFound { .. })
        ));

        test.service.delete_search_space(&user, space).unwrap();
        assert_eq!(test.upload_dir_entries(), 0);
        assert_eq!(
            test.test_db.session().count_jobs(JobStatus::Pending).unwrap(),
            0
        );
        assert!(matches!(
            test.service.get_search_space(&user, space),
            Err(ServiceError::SearchSpaceNotFound { .. })
        ));
    }
}
