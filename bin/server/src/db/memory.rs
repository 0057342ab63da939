//! In-process stores for development runs and tests.
//!
//! Sessions use [`MemorySessionStore`](pocketbook_access::MemorySessionStore)
//! from the access crate.

use async_trait::async_trait;
use pocketbook_access::{Role, RoleLoader, RoleSet, StoreError, User};
use pocketbook_core::UserId;
use rootcause::Report;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use super::{RoleStore, UserStore};

fn poisoned(what: &str) -> Report<StoreError> {
    StoreError::Unavailable {
        reason: format!("{what} lock poisoned"),
    }
    .into()
}

/// Users keyed by id.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<UserId, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create_user(&self, user: &User) -> Result<(), Report<StoreError>> {
        let mut users = self.users.write().map_err(|_| poisoned("user"))?;
        if users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict {
                reason: format!("email {} is taken", user.email),
            }
            .into());
        }
        users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn get_user(&self, id: &UserId) -> Result<User, Report<StoreError>> {
        let users = self.users.read().map_err(|_| poisoned("user"))?;
        users
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound.into())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, Report<StoreError>> {
        let users = self.users.read().map_err(|_| poisoned("user"))?;
        users
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or_else(|| StoreError::NotFound.into())
    }

    async fn list_users(&self) -> Result<Vec<User>, Report<StoreError>> {
        let users = self.users.read().map_err(|_| poisoned("user"))?;
        let mut list: Vec<User> = users.values().cloned().collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(list)
    }

    async fn update_password(
        &self,
        id: &UserId,
        password_hash: &str,
    ) -> Result<(), Report<StoreError>> {
        let mut users = self.users.write().map_err(|_| poisoned("user"))?;
        let user = users.get_mut(id).ok_or(StoreError::NotFound)?;
        user.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn delete_user(&self, id: &UserId) -> Result<bool, Report<StoreError>> {
        let mut users = self.users.write().map_err(|_| poisoned("user"))?;
        Ok(users.remove(id).is_some())
    }
}

/// Role grants keyed by user.
#[derive(Debug, Default)]
pub struct MemoryRoleStore {
    grants: RwLock<HashMap<UserId, HashSet<Role>>>,
}

impl MemoryRoleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoleLoader for MemoryRoleStore {
    async fn load_roles(&self, user_id: &UserId) -> Result<RoleSet, Report<StoreError>> {
        let grants = self.grants.read().map_err(|_| poisoned("role"))?;
        Ok(grants
            .get(user_id)
            .into_iter()
            .flatten()
            .copied()
            .collect())
    }
}

#[async_trait]
impl RoleStore for MemoryRoleStore {
    async fn grant_role(&self, user_id: &UserId, role: Role) -> Result<(), Report<StoreError>> {
        let mut grants = self.grants.write().map_err(|_| poisoned("role"))?;
        grants.entry(user_id.clone()).or_default().insert(role);
        Ok(())
    }

    async fn revoke_role(&self, user_id: &UserId, role: Role) -> Result<(), Report<StoreError>> {
        let mut grants = self.grants.write().map_err(|_| poisoned("role"))?;
        if let Some(roles) = grants.get_mut(user_id) {
            roles.remove(&role);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let store = MemoryUserStore::new();
        store
            .create_user(&User::new("a@example.com", "h1"))
            .await
            .expect("create");
        let err = store
            .create_user(&User::new("a@example.com", "h2"))
            .await
            .unwrap_err();
        assert!(matches!(err.current_context(), StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn update_password_of_missing_user_is_not_found() {
        let store = MemoryUserStore::new();
        let err = store
            .update_password(&UserId::from("usr_missing"), "h")
            .await
            .unwrap_err();
        assert_eq!(*err.current_context(), StoreError::NotFound);
    }

    #[tokio::test]
    async fn grant_and_revoke() {
        let store = MemoryRoleStore::new();
        let id = UserId::from("usr_1");
        assert!(store.load_roles(&id).await.expect("load").is_empty());

        store.grant_role(&id, Role::Admin).await.expect("grant");
        store.grant_role(&id, Role::Admin).await.expect("grant twice");
        assert_eq!(store.load_roles(&id).await.expect("load"), RoleSet::admin());

        store.revoke_role(&id, Role::Admin).await.expect("revoke");
        assert!(store.load_roles(&id).await.expect("load").is_empty());
    }
}
