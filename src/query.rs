use crate::errors::PermsError;
use crate::identity::IdentityResolver;
use crate::models::PermissionView;
use crate::storage;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};

/// Optional narrowing of a permission listing by internal ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionFilter {
    pub subject_id: Option<String>,
    pub resource_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionList {
    pub permissions: Vec<PermissionView>,
}

#[derive(Debug, Clone)]
pub struct QueryService {
    db: DatabaseConnection,
    identities: IdentityResolver,
}

impl QueryService {
    pub fn new(db: DatabaseConnection, identities: IdentityResolver) -> Self {
        Self { db, identities }
    }

    /// The full filtered result set; there is no pagination.
    pub async fn list(&self, filter: &PermissionFilter) -> Result<Vec<PermissionView>, PermsError> {
        match (&filter.subject_id, &filter.resource_id) {
            (Some(subject_id), Some(resource_id)) => {
                Ok(storage::get_permission_view(&self.db, subject_id, resource_id)
                    .await?
                    .into_iter()
                    .collect())
            }
            (Some(subject_id), None) => {
                storage::list_permissions_by_subject(&self.db, subject_id).await
            }
            (None, Some(resource_id)) => {
                storage::list_permissions_by_resource(&self.db, resource_id).await
            }
            (None, None) => storage::list_permissions(&self.db).await,
        }
    }

    /// Permissions held by a subject named by its external identity.
    pub async fn list_for_subject(
        &self,
        subject_type: &str,
        external_subject_id: &str,
    ) -> Result<Vec<PermissionView>, PermsError> {
        match self
            .identities
            .find_subject(&self.db, external_subject_id, subject_type)
            .await?
        {
            Some(subject) => storage::list_permissions_by_subject(&self.db, &subject.id).await,
            None => Ok(Vec::new()),
        }
    }

    /// Permissions on a resource named by type and name.
    pub async fn list_for_resource(
        &self,
        resource_type: &str,
        resource_name: &str,
    ) -> Result<Vec<PermissionView>, PermsError> {
        match self
            .identities
            .find_resource(&self.db, resource_name, resource_type)
            .await?
        {
            Some(resource) => storage::list_permissions_by_resource(&self.db, &resource.id).await,
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ResourceTypeCatalog;
    use crate::grant::GrantService;
    use crate::models::PermissionLevel;
    use crate::test_support::TestDb;

    async fn services(db: &DatabaseConnection) -> (GrantService, QueryService) {
        let catalog = ResourceTypeCatalog::default();
        catalog
            .seed(db, &["app".to_string(), "file".to_string()])
            .await
            .expect("seed resource types");
        let identities = IdentityResolver::new(vec!["user".to_string()], catalog);
        (
            GrantService::new(db.clone(), identities.clone()),
            QueryService::new(db.clone(), identities),
        )
    }

    #[tokio::test]
    async fn test_list_with_filters() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();
        let (grants, query) = services(db).await;

        let a = grants
            .grant("s1", "user", "r1", "app", PermissionLevel::Own)
            .await
            .unwrap();
        let b = grants
            .grant("s1", "user", "notes.txt", "file", PermissionLevel::Read)
            .await
            .unwrap();
        let c = grants
            .grant("s2", "user", "r1", "app", PermissionLevel::Write)
            .await
            .unwrap();

        let all = query.list(&PermissionFilter::default()).await.unwrap();
        assert_eq!(all, vec![b.clone(), a.clone(), c.clone()]);

        let by_subject = query
            .list(&PermissionFilter {
                subject_id: Some(a.subject.id.clone()),
                resource_id: None,
            })
            .await
            .unwrap();
        assert_eq!(by_subject, vec![b.clone(), a.clone()]);

        let by_resource = query
            .list(&PermissionFilter {
                subject_id: None,
                resource_id: Some(a.resource.id.clone()),
            })
            .await
            .unwrap();
        assert_eq!(by_resource, vec![a.clone(), c.clone()]);

        let by_pair = query
            .list(&PermissionFilter {
                subject_id: Some(c.subject.id.clone()),
                resource_id: Some(c.resource.id.clone()),
            })
            .await
            .unwrap();
        assert_eq!(by_pair, vec![c]);
    }

    #[tokio::test]
    async fn test_list_by_external_identity() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();
        let (grants, query) = services(db).await;

        let granted = grants
            .grant("s1", "user", "r1", "app", PermissionLevel::Own)
            .await
            .unwrap();

        assert_eq!(
            query.list_for_subject("user", "s1").await.unwrap(),
            vec![granted.clone()]
        );
        assert_eq!(
            query.list_for_resource("app", "r1").await.unwrap(),
            vec![granted]
        );
        assert!(query.list_for_subject("user", "nobody").await.unwrap().is_empty());
        assert!(query.list_for_resource("file", "r1").await.unwrap().is_empty());
        assert!(query
            .list_for_resource("dataset", "r1")
            .await
            .unwrap()
            .is_empty());
    }
}
