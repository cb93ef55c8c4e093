// SPDX-FileCopyrightText: 2026 The Tollgate Authors
// SPDX-License-Identifier: Apache-2.0

// src/application/limit_store.rs

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::domain::{EnforcementConfig, TenantLimits};

/// A tenant's stored record: limits plus enforcement gates.
#[derive(Debug, Clone, PartialEq)]
pub struct TenantEntry {
    pub limits: TenantLimits,
    pub enforcement: EnforcementConfig,
}

/// Result of a limit-store lookup: the effective record and whether the
/// tenant was actually known (false means the defaults were substituted).
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLimits {
    pub limits: TenantLimits,
    pub enforcement: EnforcementConfig,
    pub known: bool,
}

/// In-memory tenant → limits mapping.
///
/// Readers vastly outnumber writers: the hot path takes a read lock and
/// clones the two small value records; writes (controller reconciles, admin
/// upserts) take the write lock briefly. Unknown tenants resolve to a single
/// configurable default record.
pub struct LimitStore {
    tenants: RwLock<HashMap<String, TenantEntry>>,
    defaults: TenantEntry,
}

impl LimitStore {
    pub fn new(default_limits: TenantLimits, default_enforcement: EnforcementConfig) -> Self {
        Self {
            tenants: RwLock::new(HashMap::new()),
            defaults: TenantEntry {
                limits: default_limits,
                enforcement: default_enforcement,
            },
        }
    }

    /// Effective limits for a tenant; substitutes the defaults for unknown
    /// tenants and says so via `known`.
    pub fn get(&self, tenant: &str) -> ResolvedLimits {
        let tenants = self.tenants.read();
        match tenants.get(tenant) {
            Some(entry) => ResolvedLimits {
                limits: entry.limits.clone(),
                enforcement: entry.enforcement.clone(),
                known: true,
            },
            None => ResolvedLimits {
                limits: self.defaults.limits.clone(),
                enforcement: self.defaults.enforcement.clone(),
                known: false,
            },
        }
    }

    pub fn set(&self, tenant: &str, limits: TenantLimits, enforcement: EnforcementConfig) {
        self.tenants
            .write()
            .insert(tenant.to_string(), TenantEntry { limits, enforcement });
    }

    /// Upserts limits only, keeping existing enforcement gates (or the
    /// defaults for a brand-new tenant).
    pub fn set_limits(&self, tenant: &str, limits: TenantLimits) {
        let mut tenants = self.tenants.write();
        match tenants.get_mut(tenant) {
            Some(entry) => entry.limits = limits,
            None => {
                tenants.insert(
                    tenant.to_string(),
                    TenantEntry {
                        limits,
                        enforcement: self.defaults.enforcement.clone(),
                    },
                );
            }
        }
    }

    /// Upserts enforcement gates only, keeping existing limits (or the
    /// defaults for a brand-new tenant).
    pub fn set_enforcement(&self, tenant: &str, enforcement: EnforcementConfig) {
        let mut tenants = self.tenants.write();
        match tenants.get_mut(tenant) {
            Some(entry) => entry.enforcement = enforcement,
            None => {
                tenants.insert(
                    tenant.to_string(),
                    TenantEntry {
                        limits: self.defaults.limits.clone(),
                        enforcement,
                    },
                );
            }
        }
    }

    /// Removes a tenant. Returns false when it was unknown.
    pub fn delete(&self, tenant: &str) -> bool {
        self.tenants.write().remove(tenant).is_some()
    }

    pub fn contains(&self, tenant: &str) -> bool {
        self.tenants.read().contains_key(tenant)
    }

    /// Owned snapshot of every known tenant, stable during iteration.
    pub fn list(&self) -> Vec<(String, TenantEntry)> {
        let tenants = self.tenants.read();
        let mut entries: Vec<_> = tenants
            .iter()
            .map(|(name, entry)| (name.clone(), entry.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn len(&self) -> usize {
        self.tenants.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.read().is_empty()
    }

    pub fn defaults(&self) -> &TenantEntry {
        &self.defaults
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> LimitStore {
        LimitStore::new(TenantLimits::default(), EnforcementConfig::default())
    }

    #[test]
    fn test_unknown_tenant_gets_defaults() {
        let store = store();
        let resolved = store.get("nobody");
        assert!(!resolved.known);
        assert_eq!(resolved.limits, TenantLimits::default());
    }

    #[test]
    fn test_set_get_delete() {
        let store = store();
        let limits = TenantLimits {
            samples_per_second: 100.0,
            ..Default::default()
        };
        store.set("t1", limits.clone(), EnforcementConfig::default());

        let resolved = store.get("t1");
        assert!(resolved.known);
        assert_eq!(resolved.limits, limits);

        assert!(store.delete("t1"));
        assert!(!store.delete("t1"));
        assert!(!store.get("t1").known);
    }

    #[test]
    fn test_set_limits_preserves_enforcement() {
        let store = store();
        let mut enforcement = EnforcementConfig::default();
        enforcement.enabled = false;
        store.set("t1", TenantLimits::default(), enforcement.clone());

        store.set_limits(
            "t1",
            TenantLimits {
                max_body_bytes: 1024,
                ..Default::default()
            },
        );
        let resolved = store.get("t1");
        assert_eq!(resolved.enforcement, enforcement);
        assert_eq!(resolved.limits.max_body_bytes, 1024);
    }

    #[test]
    fn test_list_is_sorted_snapshot() {
        let store = store();
        store.set("zeta", TenantLimits::default(), EnforcementConfig::default());
        store.set("alpha", TenantLimits::default(), EnforcementConfig::default());
        let names: Vec<_> = store.list().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
