//! Permission evaluation.
//!
//! A route declares a list of [`Requirement`]s. Access is granted when any
//! one of them is satisfied by the caller's principal and the route's path
//! parameters.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::RoleCache;
use crate::error::AuthorizationError;
use crate::principal::Principal;

/// Path parameter naming the user a route operates on.
pub const TARGET_USER_PARAM: &str = "userID";

/// A named access predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Requirement {
    /// Always satisfied. Public endpoints.
    Any,
    /// Any authenticated caller.
    Member,
    /// Authenticated caller whose id equals the `userID` path parameter.
    MemberIsTarget,
    /// Caller holds the admin role.
    Admin,
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Any => "any",
            Self::Member => "member",
            Self::MemberIsTarget => "member_is_target",
            Self::Admin => "admin",
        };
        f.write_str(name)
    }
}

/// Path parameters captured by the router for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    params: HashMap<String, String>,
}

impl PathParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.params.insert(name.into(), value.into());
    }

    /// The `userID` parameter, if present and non-empty.
    #[must_use]
    pub fn target_user(&self) -> Option<&str> {
        self.get(TARGET_USER_PARAM).filter(|v| !v.is_empty())
    }
}

impl<K, V> FromIterator<(K, V)> for PathParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            params: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Evaluates requirement lists against a principal.
#[derive(Clone)]
pub struct PermissionEngine {
    roles: Arc<RoleCache>,
}

impl PermissionEngine {
    #[must_use]
    pub fn new(roles: Arc<RoleCache>) -> Self {
        Self { roles }
    }

    #[must_use]
    pub fn roles(&self) -> &Arc<RoleCache> {
        &self.roles
    }

    /// Returns true if any requirement is satisfied.
    pub async fn check(
        &self,
        principal: &Principal,
        params: &PathParams,
        requirements: &[Requirement],
    ) -> bool {
        self.decide(principal, params, requirements).await.is_ok()
    }

    /// Returns the first satisfied requirement.
    ///
    /// `Any` wins wherever it appears in the list. Requirements are otherwise
    /// tried in order. A failed role lookup only fails its own `Admin` entry;
    /// it is reported as [`AuthorizationError::RoleLookupFailed`] when nothing
    /// else in the list was satisfied.
    ///
    /// # Errors
    ///
    /// [`AuthorizationError::PermissionDenied`] when no requirement holds,
    /// including for an empty list.
    pub async fn decide(
        &self,
        principal: &Principal,
        params: &PathParams,
        requirements: &[Requirement],
    ) -> Result<Requirement, AuthorizationError> {
        if requirements.contains(&Requirement::Any) {
            return Ok(Requirement::Any);
        }

        let mut lookup_failure = None;
        for &requirement in requirements {
            let satisfied = match requirement {
                Requirement::Any => true,
                Requirement::Member => !principal.is_anonymous(),
                Requirement::MemberIsTarget => is_target(principal, params),
                Requirement::Admin => match self.is_admin(principal).await {
                    Ok(admin) => admin,
                    Err(reason) => {
                        lookup_failure.get_or_insert(reason);
                        false
                    }
                },
            };
            if satisfied {
                debug!(%principal, %requirement, "permission granted");
                return Ok(requirement);
            }
        }

        match lookup_failure {
            Some(reason) => Err(AuthorizationError::RoleLookupFailed { reason }),
            None => {
                debug!(%principal, ?requirements, "permission denied");
                Err(AuthorizationError::PermissionDenied)
            }
        }
    }

    async fn is_admin(&self, principal: &Principal) -> Result<bool, String> {
        if principal.is_anonymous() {
            return Ok(false);
        }
        match self.roles.get_roles(principal.user_id()).await {
            Ok(roles) => Ok(roles.is_admin()),
            Err(report) => {
                warn!(%principal, error = %report, "role lookup failed, admin check fails closed");
                Err(report.current_context().to_string())
            }
        }
    }
}

fn is_target(principal: &Principal, params: &PathParams) -> bool {
    !principal.is_anonymous()
        && params
            .target_user()
            .is_some_and(|target| target == principal.user_id().as_str())
}
