//! Group CRUD.

use cml_lab_core::GroupId;

use crate::client::Client;
use crate::error::{ClientError, Result};
use crate::model::{Group, GroupSpec};

impl Client {
    /// List all groups.
    ///
    /// # Errors
    ///
    /// Returns gate, transport or decode errors.
    pub async fn groups(&self) -> Result<Vec<Group>> {
        self.get_json("groups").await
    }

    /// Read one group.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if the group does not exist.
    pub async fn group(&self, id: &GroupId) -> Result<Group> {
        self.get_json(&format!("groups/{id}")).await
    }

    /// Find a group by name.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ElementNotFound` if no group has that name.
    pub async fn group_by_name(&self, name: &str) -> Result<Group> {
        self.groups()
            .await?
            .into_iter()
            .find(|g| g.name == name)
            .ok_or_else(|| ClientError::ElementNotFound {
                kind: "group",
                key: name.to_string(),
            })
    }

    /// Create a group.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidRequest` without a name, or any gate,
    /// transport, status or decode error.
    pub async fn group_create(&self, spec: &GroupSpec) -> Result<Group> {
        if spec.name.as_deref().unwrap_or_default().is_empty() {
            return Err(ClientError::InvalidRequest("group name is required".into()));
        }
        let group: Group = self.post_json("groups", spec).await?;
        tracing::info!(group_id = %group.id, name = %group.name, "Created group");
        Ok(group)
    }

    /// Update a group and return the fresh record.
    ///
    /// # Errors
    ///
    /// Returns gate, transport, status or decode errors.
    pub async fn group_update(&self, id: &GroupId, spec: &GroupSpec) -> Result<Group> {
        self.patch_json(&format!("groups/{id}"), spec).await?;
        self.group(id).await
    }

    /// Delete a group.
    ///
    /// # Errors
    ///
    /// Returns gate, transport or status errors.
    pub async fn group_destroy(&self, id: &GroupId) -> Result<()> {
        self.delete(&format!("groups/{id}")).await?;
        tracing::info!(group_id = %id, "Destroyed group");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::model::{GroupLab, Permission};
    use crate::testing::{FakeController, ADMIN_ID};
    use reqwest::Method;
    use std::sync::Arc;

    fn client(fake: &Arc<FakeController>) -> Client {
        Client::with_transport(ClientConfig::with_token("https://cml", "tok"), fake.clone())
            .unwrap()
    }

    #[tokio::test]
    async fn create_update_and_destroy() {
        let fake = Arc::new(FakeController::new());
        let lab_id = fake.seed_lab("shared", &[]);
        let client = client(&fake);

        let created = client
            .group_create(&GroupSpec {
                name: Some("ops".into()),
                description: Some("operators".into()),
                ..GroupSpec::default()
            })
            .await
            .unwrap();
        assert_eq!(created.name, "ops");
        assert!(created.members.is_empty());
        assert_eq!(client.group_by_name("ops").await.unwrap(), created);

        let updated = client
            .group_update(
                &created.id,
                &GroupSpec {
                    members: Some(vec![ADMIN_ID.parse().unwrap()]),
                    labs: Some(vec![GroupLab {
                        id: lab_id.parse().unwrap(),
                        permission: Permission::ReadWrite,
                    }]),
                    ..GroupSpec::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.description, "operators");
        assert_eq!(updated.members[0].as_str(), ADMIN_ID);
        assert_eq!(updated.labs[0].permission, Permission::ReadWrite);

        client.group_destroy(&created.id).await.unwrap();
        let err = client.group_by_name("ops").await.unwrap_err();
        assert_eq!(err.label(), "element-not-found");
        let err = client.group(&created.id).await.unwrap_err();
        assert_eq!(err.label(), "not-found");
    }

    #[tokio::test]
    async fn create_requires_name() {
        let fake = Arc::new(FakeController::new());
        let client = client(&fake);

        let err = client
            .group_create(&GroupSpec {
                description: Some("nameless".into()),
                ..GroupSpec::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.label(), "invalid-request");
        assert_eq!(fake.count(&Method::POST, "/groups"), 0);
    }

    #[tokio::test]
    async fn destroy_missing_group() {
        let fake = Arc::new(FakeController::new());
        let err = client(&fake)
            .group_destroy(&"g-9999".parse().unwrap())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
