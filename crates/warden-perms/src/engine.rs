//! The permission engine.
//!
//! Resolution order for a (caller, verb) pair:
//!
//! 1. An exact grant for the verb.
//! 2. A grant for a package whose table contains the verb.
//! 3. Otherwise, ask.
//!
//! Grants live in the store, so a write is visible to the next decision.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use warden_core::{Method, PublicKey};
use warden_store::{now_millis, GrantValue, PermissionGrant, Store};

use crate::error::{PermsError, Result};
use crate::package::Package;
use crate::verb::Verb;

/// Outcome of a permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Allow,
    Deny,
    /// No cached grant applies; a human must decide.
    Ask,
}

impl From<GrantValue> for Decision {
    fn from(value: GrantValue) -> Self {
        match value {
            GrantValue::Allow => Decision::Allow,
            GrantValue::Deny => Decision::Deny,
        }
    }
}

/// Decides requests from cached grants.
pub struct PermissionEngine<S: Store + ?Sized> {
    store: Arc<S>,
}

impl<S: Store + ?Sized> Clone for PermissionEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: Store + ?Sized> PermissionEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Decide a request.
    pub async fn decide(
        &self,
        caller: &PublicKey,
        method: &Method,
        params: &[String],
    ) -> Result<Decision> {
        let verb = Verb::for_request(method, params);
        self.decide_verb(caller, &verb).await
    }

    /// Decide an already-derived verb.
    pub async fn decide_verb(&self, caller: &PublicKey, verb: &Verb) -> Result<Decision> {
        let verb = verb.to_string();

        if let Some(grant) = self.store.get_permission(caller, &verb).await? {
            debug!(caller = %caller, verb = %verb, value = grant.value.as_str(), "exact grant");
            return Ok(grant.value.into());
        }

        for package in Package::ALL {
            if !package.contains(&verb) {
                continue;
            }
            if let Some(grant) = self.store.get_permission(caller, package.name()).await? {
                debug!(
                    caller = %caller,
                    verb = %verb,
                    package = package.name(),
                    value = grant.value.as_str(),
                    "package grant"
                );
                return Ok(grant.value.into());
            }
        }

        Ok(Decision::Ask)
    }

    /// Store a grant for a verb string (method, `method:kind`, or package name).
    pub async fn grant(
        &self,
        caller: &PublicKey,
        verb: &str,
        value: GrantValue,
    ) -> Result<PermissionGrant> {
        if verb.is_empty() {
            return Err(PermsError::InvalidVerb("empty verb".into()));
        }
        let grant = PermissionGrant {
            caller: *caller,
            verb: verb.to_string(),
            value,
            granted_at: now_millis(),
        };
        self.store.put_permission(&grant).await?;
        Ok(grant)
    }

    /// Grant a whole package.
    pub async fn grant_package(
        &self,
        caller: &PublicKey,
        package: Package,
    ) -> Result<PermissionGrant> {
        self.grant(caller, package.name(), GrantValue::Allow).await
    }

    /// Remove a grant. Returns whether one existed.
    pub async fn revoke(&self, caller: &PublicKey, verb: &str) -> Result<bool> {
        Ok(self.store.delete_permission(caller, verb).await?)
    }

    /// All grants held by a caller.
    pub async fn grants_for(&self, caller: &PublicKey) -> Result<Vec<PermissionGrant>> {
        Ok(self.store.list_permissions(caller).await?)
    }
}
