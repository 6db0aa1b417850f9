use tracing::{debug, warn};

use crate::api::{ModelInfo, ModelsResponse};
use crate::core::model_catalog::{filter_openai_chat_models, known_models_with_prefix};
use crate::core::providers::{
    make_model_id, models_url, resolve_endpoint, Provider, ProviderKind, ProviderResolutionError,
};
use crate::utils::auth::add_auth_headers;
use crate::utils::url::RequestRouter;

const ANTHROPIC_FALLBACK_PREFIXES: &[&str] = &["claude-"];
const OPENAI_FALLBACK_PREFIXES: &[&str] = &["gpt-", "o1", "o3", "o4", "chatgpt-"];

pub async fn fetch_models(
    client: &reqwest::Client,
    router: &RequestRouter,
    provider: &Provider,
) -> Result<ModelsResponse, Box<dyn std::error::Error>> {
    let endpoint = resolve_endpoint(provider)
        .ok_or_else(|| ProviderResolutionError::missing_endpoint(&provider.name))?;
    let url = router.route(&models_url(provider, &endpoint))?;

    let request = client
        .get(url)
        .header("Content-Type", "application/json");
    let request = add_auth_headers(request, provider.kind, &provider.api_key);

    let response = request.send().await?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(format!("API request failed with status {status}: {error_text}").into());
    }

    let models_response = response.json::<ModelsResponse>().await?;
    Ok(models_response)
}

fn model_key(model: &ModelInfo) -> Option<String> {
    if !model.id.is_empty() {
        return Some(model.id.clone());
    }
    model.name.clone().filter(|name| !name.is_empty())
}

/// Bare model ids in display order for a provider kind.
pub fn order_models(kind: ProviderKind, mut models: Vec<ModelInfo>) -> Vec<String> {
    match kind {
        ProviderKind::Anthropic => {
            let mut ids: Vec<String> = models.iter().filter_map(model_key).collect();
            ids.sort();
            ids.reverse();
            ids
        }
        ProviderKind::OpenaiDirect => {
            filter_openai_chat_models(models.iter().filter_map(model_key).collect())
        }
        ProviderKind::Openrouter => {
            models.sort_by(|a, b| {
                let a_name = a.name.as_deref().unwrap_or(&a.id);
                let b_name = b.name.as_deref().unwrap_or(&b.id);
                a_name.cmp(b_name)
            });
            models.iter().filter_map(model_key).collect()
        }
        _ => models.iter().filter_map(model_key).collect(),
    }
}

/// Built-in model ids offered when a vendor's live listing is unavailable.
pub fn fallback_models(kind: ProviderKind) -> Vec<String> {
    let prefixes = match kind {
        ProviderKind::Anthropic => ANTHROPIC_FALLBACK_PREFIXES,
        ProviderKind::OpenaiDirect => OPENAI_FALLBACK_PREFIXES,
        _ => return Vec::new(),
    };
    known_models_with_prefix(prefixes)
        .into_iter()
        .map(|model| model.id.to_string())
        .collect()
}

/// Composite `providerId::modelId` list for one provider. An empty or failed
/// live listing falls back to the built-in table where one exists.
pub async fn list_models(
    client: &reqwest::Client,
    router: &RequestRouter,
    provider: &Provider,
) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let live = match fetch_models(client, router, provider).await {
        Ok(response) => order_models(provider.kind, response.into_models()),
        Err(err) => {
            let fallback = fallback_models(provider.kind);
            if fallback.is_empty() {
                return Err(err);
            }
            warn!(provider = %provider.name, error = %err, "Model listing failed; using built-in list");
            Vec::new()
        }
    };

    let ids = if live.is_empty() {
        fallback_models(provider.kind)
    } else {
        live
    };
    debug!(provider = %provider.name, count = ids.len(), "Models listed");
    Ok(ids
        .iter()
        .map(|id| make_model_id(&provider.id, id))
        .collect())
}
