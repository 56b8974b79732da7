//! Tenant credential resolution: an open trait plus one concrete,
//! environment-backed implementation (SPEC_FULL §4.10).

use std::collections::BTreeSet;
use std::env;

use crate::types::TenantCredentials;

pub trait CredentialProvider: Send + Sync {
    fn list_tenant_names(&self) -> Vec<String>;
    fn get_credentials(&self, name: &str) -> Option<TenantCredentials>;
    fn default_tenant_name(&self) -> Option<String>;
}

const HOST_SUFFIX: &str = "_FM_HOST";

/// Scans `{PREFIX}_FM_HOST` environment variables for multi-tenant setups,
/// falling back to a single unprefixed `FM_*` tenant named `default`.
/// `FM_DEFAULT_TENANT` overrides which tenant `default_tenant_name` returns.
pub struct EnvCredentialProvider {
    vars: Vec<(String, String)>,
}

impl EnvCredentialProvider {
    pub fn from_env() -> Self {
        Self { vars: env::vars().collect() }
    }

    #[cfg(test)]
    fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self { vars: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect() }
    }

    fn var(&self, key: &str) -> Option<String> {
        self.vars.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    }

    fn prefixed(&self, prefix: &str, suffix: &str) -> Option<String> {
        self.var(&format!("{prefix}{suffix}"))
    }
}

impl CredentialProvider for EnvCredentialProvider {
    fn list_tenant_names(&self) -> Vec<String> {
        let mut names: BTreeSet<String> = self
            .vars
            .iter()
            .filter_map(|(k, _)| k.strip_suffix(HOST_SUFFIX).map(str::to_string))
            .filter(|p| !p.is_empty())
            .collect();

        if names.is_empty() && self.var("FM_HOST").is_some() {
            names.insert("default".to_string());
        }
        names.into_iter().collect()
    }

    fn get_credentials(&self, name: &str) -> Option<TenantCredentials> {
        let names = self.list_tenant_names();
        let prefix = if names.contains(&name.to_string()) && name != "default" {
            name.to_string()
        } else if name == "default" && self.var("FM_HOST").is_some() {
            String::new()
        } else {
            return None;
        };

        let host = self.prefixed(&prefix, "_FM_HOST").or_else(|| self.var("FM_HOST"))?;
        let database = self.prefixed(&prefix, "_FM_DATABASE").or_else(|| self.var("FM_DATABASE"))?;
        let username = self.prefixed(&prefix, "_FM_USERNAME").or_else(|| self.var("FM_USERNAME"))?;
        let password = self.prefixed(&prefix, "_FM_PASSWORD").or_else(|| self.var("FM_PASSWORD"))?;
        let verify_tls = self
            .prefixed(&prefix, "_FM_VERIFY_TLS")
            .or_else(|| self.var("FM_VERIFY_TLS"))
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);
        let timeout_secs = self
            .prefixed(&prefix, "_FM_TIMEOUT_SECS")
            .or_else(|| self.var("FM_TIMEOUT_SECS"))
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        Some(TenantCredentials { name: name.to_string(), host, database, username, password, verify_tls, timeout_secs })
    }

    fn default_tenant_name(&self) -> Option<String> {
        if let Some(name) = self.var("FM_DEFAULT_TENANT") {
            return Some(name);
        }
        let names = self.list_tenant_names();
        if names.len() == 1 { names.into_iter().next() } else { None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_tenant_fallback_uses_default_name() {
        let p = EnvCredentialProvider::from_pairs(&[
            ("FM_HOST", "fm.example.com"),
            ("FM_DATABASE", "db"),
            ("FM_USERNAME", "u"),
            ("FM_PASSWORD", "p"),
        ]);
        assert_eq!(p.list_tenant_names(), vec!["default".to_string()]);
        let creds = p.get_credentials("default").unwrap();
        assert_eq!(creds.host, "fm.example.com");
        assert_eq!(p.default_tenant_name(), Some("default".to_string()));
    }

    #[test]
    fn multi_tenant_prefix_scan() {
        let p = EnvCredentialProvider::from_pairs(&[
            ("ACME_FM_HOST", "acme.example.com"),
            ("ACME_FM_DATABASE", "acme_db"),
            ("ACME_FM_USERNAME", "u"),
            ("ACME_FM_PASSWORD", "p"),
            ("BETA_FM_HOST", "beta.example.com"),
            ("BETA_FM_DATABASE", "beta_db"),
            ("BETA_FM_USERNAME", "u2"),
            ("BETA_FM_PASSWORD", "p2"),
        ]);
        let mut names = p.list_tenant_names();
        names.sort();
        assert_eq!(names, vec!["ACME".to_string(), "BETA".to_string()]);
        assert_eq!(p.get_credentials("ACME").unwrap().host, "acme.example.com");
        assert!(p.default_tenant_name().is_none());
    }

    #[test]
    fn default_tenant_override_wins() {
        let p = EnvCredentialProvider::from_pairs(&[
            ("ACME_FM_HOST", "acme.example.com"),
            ("ACME_FM_DATABASE", "acme_db"),
            ("ACME_FM_USERNAME", "u"),
            ("ACME_FM_PASSWORD", "p"),
            ("FM_DEFAULT_TENANT", "ACME"),
        ]);
        assert_eq!(p.default_tenant_name(), Some("ACME".to_string()));
    }

    #[test]
    fn unknown_tenant_returns_none() {
        let p = EnvCredentialProvider::from_pairs(&[("FM_HOST", "h")]);
        assert!(p.get_credentials("ghost").is_none());
    }
}
