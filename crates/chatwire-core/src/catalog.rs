use serde::{Deserialize, Serialize};
use tracing::warn;

use chatwire_common::ProviderKind;
use chatwire_protocol::openai::list_models::{CatalogModel, ListModelsResponse};

use crate::error::RelayError;
use crate::upstream_client::{HttpMethod, UpstreamBody, UpstreamClient, UpstreamHttpRequest};

const DEFAULT_CONTEXT_LENGTH: u64 = 4096;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogQuery {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(rename = "apiKey", default)]
    pub api_key: Option<String>,
}

/// One search hit, shaped for the admin "add model" form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    pub description: String,
    pub supports_images: bool,
    pub context_length: u64,
    #[serde(default)]
    pub pricing: Option<serde_json::Value>,
}

impl From<CatalogModel> for CatalogEntry {
    fn from(model: CatalogModel) -> Self {
        let name = model
            .name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| model.id.clone());
        let description = model
            .description
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| format!("{name} - AI language model"));
        let supports_images = model
            .architecture
            .and_then(|arch| arch.modality)
            .is_some_and(|modality| modality.contains("image"));
        Self {
            id: model.id,
            name,
            description,
            supports_images,
            context_length: model
                .context_length
                .filter(|len| *len > 0)
                .unwrap_or(DEFAULT_CONTEXT_LENGTH),
            pricing: model.pricing,
        }
    }
}

/// Case-insensitive substring match over name, id and description.
/// A blank query keeps everything.
pub fn filter_catalog(models: Vec<CatalogModel>, query: Option<&str>) -> Vec<CatalogEntry> {
    let needle = query
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_lowercase);
    models
        .into_iter()
        .filter(|model| match &needle {
            None => true,
            Some(needle) => [
                model.name.as_deref(),
                Some(model.id.as_str()),
                model.description.as_deref(),
            ]
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(needle.as_str())),
        })
        .map(CatalogEntry::from)
        .collect()
}

pub async fn search_models(
    client: &dyn UpstreamClient,
    api_key: &str,
    query: Option<&str>,
) -> Result<Vec<CatalogEntry>, RelayError> {
    let api_key = api_key.trim();
    if api_key.is_empty() {
        return Err(RelayError::validation("API key required"));
    }
    let req = UpstreamHttpRequest {
        method: HttpMethod::Get,
        url: ProviderKind::OpenRouter.catalog_url(),
        headers: vec![
            ("authorization".to_string(), format!("Bearer {api_key}")),
            ("content-type".to_string(), "application/json".to_string()),
        ],
        body: None,
        is_stream: false,
    };
    let resp = client
        .send(req)
        .await
        .map_err(|failure| RelayError::UpstreamUnavailable {
            status: None,
            detail: failure.message,
        })?;
    let UpstreamBody::Bytes(body) = resp.body else {
        return Err(RelayError::EmptyResponse);
    };
    if !(200..300).contains(&resp.status) {
        warn!(status = resp.status, "model catalog request rejected");
        return Err(RelayError::from_upstream_status(
            resp.status,
            String::from_utf8_lossy(&body).into_owned(),
        ));
    }
    let listing: ListModelsResponse = serde_json::from_slice(&body).map_err(|err| {
        RelayError::UpstreamUnavailable {
            status: Some(resp.status),
            detail: err.to_string(),
        }
    })?;
    Ok(filter_catalog(listing.data, query))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatwire_protocol::openai::list_models::CatalogArchitecture;

    fn entry(id: &str, name: Option<&str>, description: Option<&str>) -> CatalogModel {
        CatalogModel {
            id: id.to_string(),
            name: name.map(str::to_string),
            description: description.map(str::to_string),
            ..CatalogModel::default()
        }
    }

    #[test]
    fn filters_on_any_text_field() {
        let models = vec![
            entry("openai/gpt-4o", Some("GPT-4o"), None),
            entry("anthropic/claude", Some("Claude"), Some("Fast and careful")),
            entry("meta/llama", None, None),
        ];
        let hits = filter_catalog(models.clone(), Some("CAREFUL"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "anthropic/claude");

        let hits = filter_catalog(models.clone(), Some("openai"));
        assert_eq!(hits[0].name, "GPT-4o");

        assert_eq!(filter_catalog(models, Some("  ")).len(), 3);
    }

    #[test]
    fn fills_defaults() {
        let mut model = entry("meta/llama", None, None);
        model.architecture = Some(CatalogArchitecture {
            modality: Some("text+image->text".into()),
        });
        let hit = CatalogEntry::from(model);
        assert_eq!(hit.name, "meta/llama");
        assert_eq!(hit.description, "meta/llama - AI language model");
        assert_eq!(hit.context_length, 4096);
        assert!(hit.supports_images);
    }
}
