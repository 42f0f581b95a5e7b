//! Connect server backend
//!
//! Talks to the Connect REST API with a bearer token. Vaults and items may
//! be named by identifier or by title; anything shaped like an identifier is
//! fetched directly, everything else goes through a filtered list call.

use super::is_identifier;
use crate::error::{Error, Result};
use crate::security::{sanitize_error, SecureString};
use crate::types::FieldMap;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct VaultSummary {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ItemSummary {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(default)]
    fields: Vec<Field>,
    #[serde(default)]
    files: Vec<File>,
}

#[derive(Debug, Deserialize)]
struct Field {
    #[serde(default)]
    id: String,
    #[serde(default)]
    label: String,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct File {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    content_path: Option<String>,
}

/// Client for a Connect server
pub struct ConnectClient {
    http: reqwest::Client,
    base: Url,
    token: SecureString,
    /// Vault title → identifier
    vault_ids: RwLock<HashMap<String, String>>,
}

impl ConnectClient {
    pub fn new(host: &str, token: &str, timeout: Option<Duration>) -> Result<Self> {
        let base = Url::parse(host.trim()).map_err(|e| {
            Error::backend_unavailable(format!("invalid Connect host '{}': {}", host, e))
        })?;
        if base.cannot_be_a_base() {
            return Err(Error::backend_unavailable(format!(
                "invalid Connect host '{}'",
                host
            )));
        }

        let mut builder =
            reqwest::Client::builder().user_agent(concat!("brokkr/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| Error::backend_unavailable(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base,
            token: SecureString::from(token),
            vault_ids: RwLock::new(HashMap::new()),
        })
    }

    pub fn host(&self) -> &str {
        self.base.as_str()
    }

    /// All fields of an item, keyed by label
    pub async fn item_fields(&self, vault: &str, item: &str) -> Result<Option<FieldMap>> {
        let Some(item) = self.item(vault, item).await? else {
            return Ok(None);
        };

        Ok(Some(FieldMap::from_raw(item.fields.iter().filter_map(
            |field| {
                let key = if field.label.is_empty() {
                    &field.id
                } else {
                    &field.label
                };
                field.value.as_ref().map(|value| (key.clone(), value.as_str()))
            },
        ))))
    }

    /// Content of a file attached to an item; `file_name` picks one by name
    pub async fn document(
        &self,
        vault: &str,
        item_name: &str,
        file_name: Option<&str>,
    ) -> Result<Option<String>> {
        let target = format!("{}@{}", item_name, vault);
        let Some((vault_id, item_id)) = self.resolve(vault, item_name).await? else {
            return Ok(None);
        };
        let url = self.endpoint(&["v1", "vaults", &vault_id, "items", &item_id])?;
        let Some(item) = self.get_json::<Item>("document get", &target, url).await? else {
            return Ok(None);
        };

        let file = match file_name {
            Some(name) => item.files.iter().find(|f| f.name == name),
            None => item.files.first(),
        };
        let Some(file) = file else {
            debug!(item = item_name, vault, "Item has no matching file");
            return Ok(None);
        };

        let url = match &file.content_path {
            Some(path) => self.base.join(path).map_err(|e| {
                Error::backend("document get", &target, format!("bad content path: {}", e))
            })?,
            None => self.endpoint(&[
                "v1", "vaults", &vault_id, "items", &item_id, "files", &file.id, "content",
            ])?,
        };

        let Some(response) = self.get("document get", &target, url).await? else {
            return Ok(None);
        };
        let content = response
            .text()
            .await
            .map_err(|e| Error::backend("document get", &target, sanitize_error(&e.to_string())))?;
        Ok(Some(content))
    }

    async fn item(&self, vault: &str, item: &str) -> Result<Option<Item>> {
        let Some((vault_id, item_id)) = self.resolve(vault, item).await? else {
            return Ok(None);
        };
        let target = format!("{}@{}", item, vault);
        let url = self.endpoint(&["v1", "vaults", &vault_id, "items", &item_id])?;
        self.get_json("item get", &target, url).await
    }

    /// Vault and item identifiers for a (possibly titled) item
    async fn resolve(&self, vault: &str, item: &str) -> Result<Option<(String, String)>> {
        let Some(vault_id) = self.vault_id(vault).await? else {
            return Ok(None);
        };
        Ok(self
            .item_id(&vault_id, item)
            .await?
            .map(|item_id| (vault_id, item_id)))
    }

    /// Resolve a vault title to its identifier, caching the answer
    async fn vault_id(&self, vault: &str) -> Result<Option<String>> {
        if is_identifier(vault) {
            return Ok(Some(vault.to_string()));
        }
        if let Some(id) = self
            .vault_ids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(vault)
        {
            return Ok(Some(id.clone()));
        }

        let mut url = self.endpoint(&["v1", "vaults"])?;
        url.query_pairs_mut()
            .append_pair("filter", &eq_filter("name", vault));

        let vaults: Vec<VaultSummary> = self
            .get_json("vault list", vault, url)
            .await?
            .unwrap_or_default();
        let Some(found) = vaults.into_iter().next() else {
            return Ok(None);
        };

        self.vault_ids
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(vault.to_string(), found.id.clone());
        Ok(Some(found.id))
    }

    async fn item_id(&self, vault_id: &str, item: &str) -> Result<Option<String>> {
        if is_identifier(item) {
            return Ok(Some(item.to_string()));
        }

        let mut url = self.endpoint(&["v1", "vaults", vault_id, "items"])?;
        url.query_pairs_mut()
            .append_pair("filter", &eq_filter("title", item));

        let items: Vec<ItemSummary> = self
            .get_json("item list", item, url)
            .await?
            .unwrap_or_default();
        if items.len() > 1 {
            warn!(item, count = items.len(), "Several items share this title; using the first");
        }
        Ok(items.into_iter().next().map(|i| i.id))
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::backend_unavailable("Connect host cannot be a base URL"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        target: &str,
        url: Url,
    ) -> Result<Option<T>> {
        let Some(response) = self.get(operation, target, url).await? else {
            return Ok(None);
        };
        let body = response.json::<T>().await.map_err(|e| {
            Error::backend(operation, target, format!("unexpected response: {}", e))
        })?;
        Ok(Some(body))
    }

    /// GET with auth; 404 maps to `None`
    async fn get(
        &self,
        operation: &str,
        target: &str,
        url: Url,
    ) -> Result<Option<reqwest::Response>> {
        debug!(operation, path = url.path(), "Connect request");

        let response = self
            .http
            .get(url)
            .bearer_auth(self.token.as_str())
            .send()
            .await
            .map_err(|e| Error::backend(operation, target, sanitize_error(&e.to_string())))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response)),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::backend(
                    operation,
                    target,
                    format!("HTTP {}: {}", status, sanitize_error(&body)),
                ))
            }
        }
    }
}

/// `attr eq "value"` with `\` and `"` escaped inside the quoted value
fn eq_filter(attr: &str, value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    format!("{} eq \"{}\"", attr, quoted)
}

impl std::fmt::Debug for ConnectClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectClient")
            .field("base", &self.base.as_str())
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_host() {
        assert!(matches!(
            ConnectClient::new("not a url", "t", None),
            Err(Error::BackendUnavailable { .. })
        ));
    }

    #[test]
    fn test_endpoint_keeps_host_prefix() {
        let client = ConnectClient::new("http://connect.local:8080/proxy/", "t", None).unwrap();
        let url = client.endpoint(&["v1", "vaults"]).unwrap();
        assert_eq!(url.as_str(), "http://connect.local:8080/proxy/v1/vaults");

        let client = ConnectClient::new("http://connect.local:8080", "t", None).unwrap();
        let url = client.endpoint(&["v1", "vaults", "abc"]).unwrap();
        assert_eq!(url.as_str(), "http://connect.local:8080/v1/vaults/abc");
    }

    #[test]
    fn test_eq_filter_escapes_quotes() {
        assert_eq!(eq_filter("title", "postgres"), r#"title eq "postgres""#);
        assert_eq!(eq_filter("title", r#"say "hi""#), r#"title eq "say \"hi\"""#);
        assert_eq!(eq_filter("name", r"C:\vault"), r#"name eq "C:\\vault""#);
    }

    #[test]
    fn test_debug_hides_token() {
        let client = ConnectClient::new("http://connect.local", "super-secret", None).unwrap();
        assert!(!format!("{:?}", client).contains("super-secret"));
    }
}
