//! `USER -> AUTHOR` promotion
//!
//! Role update and author record creation happen in one store operation.
//! The call is not idempotent: a second promotion is a conflict.

use crate::audit::{audit_log, AuditEvent};
use crate::error::AppError;
use inkwell_core::{Author, AuthorStore, CredentialStore, InkwellError, Role};
use std::sync::Arc;

#[derive(Clone)]
pub struct PromotionService {
    users: Arc<dyn CredentialStore>,
    authors: Arc<dyn AuthorStore>,
}

impl PromotionService {
    pub fn new(users: Arc<dyn CredentialStore>, authors: Arc<dyn AuthorStore>) -> Self {
        Self { users, authors }
    }

    pub async fn promote(&self, subject_id: u64) -> Result<Author, AppError> {
        let user = self
            .users
            .find_by_id(subject_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User".to_string()))?;

        if user.role == Role::Author {
            return Err(AppError::Conflict("User is already an author".to_string()));
        }

        let author = self.authors.promote(subject_id).await.map_err(|e| match e {
            // lost a race, or an author record already exists
            InkwellError::Conflict(_) => {
                AppError::Conflict("User is already an author".to_string())
            }
            other => other.into(),
        })?;

        audit_log(&AuditEvent::Promotion {
            user_id: subject_id,
            author_id: author.id,
        });

        Ok(author)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkwell_core::{MemoryStore, NewUser};

    async fn setup() -> (PromotionService, Arc<MemoryStore>, u64) {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .create_user(NewUser {
                email: "a@b.com".to_string(),
                password_hash: "hash".to_string(),
            })
            .await
            .unwrap();
        (
            PromotionService::new(store.clone(), store.clone()),
            store,
            user.id,
        )
    }

    #[tokio::test]
    async fn test_promote_then_conflict() {
        let (service, store, user_id) = setup().await;

        let author = service.promote(user_id).await.unwrap();
        assert_eq!(author.user_id, user_id);
        assert_eq!(
            store.find_by_id(user_id).await.unwrap().unwrap().role,
            Role::Author
        );

        assert!(matches!(
            service.promote(user_id).await,
            Err(AppError::Conflict(_))
        ));
        assert_eq!(store.author_count(user_id).await, 1);
    }

    #[tokio::test]
    async fn test_promote_unknown_user() {
        let (service, _, _) = setup().await;
        assert!(matches!(
            service.promote(999).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_existing_author_record_is_conflict() {
        let (service, store, user_id) = setup().await;
        store.insert_author_record(user_id).await;

        assert!(matches!(
            service.promote(user_id).await,
            Err(AppError::Conflict(_))
        ));
        assert_eq!(
            store.find_by_id(user_id).await.unwrap().unwrap().role,
            Role::User
        );
    }
}
