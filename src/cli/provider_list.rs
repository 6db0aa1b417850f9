use std::error::Error;

use crate::core::app::App;
use crate::core::providers::{resolve_endpoint, split_model_id, Provider, ProviderKind};

/// Find a provider by id, id prefix or case-insensitive name.
pub fn find_provider<'a>(providers: &'a [Provider], needle: &str) -> Option<&'a Provider> {
    let needle = needle.trim();
    if needle.is_empty() {
        return None;
    }
    providers
        .iter()
        .find(|p| p.id == needle || p.name.eq_ignore_ascii_case(needle))
        .or_else(|| {
            let mut matches = providers.iter().filter(|p| p.id.starts_with(needle));
            let first = matches.next()?;
            matches.next().is_none().then_some(first)
        })
}

pub fn render_provider_table(providers: &[Provider], current_model: &str) -> String {
    let (current_provider, _) = split_model_id(current_model);
    let mut out = String::from("Configured providers:\n\n");
    for provider in providers {
        let marker = if current_provider == Some(provider.id.as_str()) {
            "*"
        } else {
            " "
        };
        let key_status = if provider.api_key.is_empty() {
            "❌"
        } else {
            "✅"
        };
        let endpoint = resolve_endpoint(provider).unwrap_or_else(|| "(no server URL)".to_string());
        out.push_str(&format!(
            "{marker} {key_status} {} [{}] {} ({})\n",
            provider.name,
            provider.kind.display_name(),
            endpoint,
            short_id(&provider.id)
        ));
    }
    out.push_str("\n* = provider of the selected model");
    out
}

pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

pub fn list_providers(app: &App) {
    let state = app.state();
    if state.providers.is_empty() {
        println!("No providers configured. Add one with `kiconnect provider add`.");
        return;
    }
    println!("{}", render_provider_table(&state.providers, &state.config.model));
}

pub fn add_provider(
    app: &mut App,
    kind: &str,
    name: Option<String>,
    url: Option<String>,
    key: String,
) -> Result<(), Box<dyn Error>> {
    let kind = ProviderKind::parse(kind).ok_or_else(|| {
        let known: Vec<&str> = ProviderKind::ALL.iter().map(|k| k.as_str()).collect();
        format!("Unknown provider type '{kind}'. Known types: {}", known.join(", "))
    })?;
    let name = name.unwrap_or_else(|| kind.display_name().to_string());
    let mut provider = Provider::new(name, kind).with_api_key(key);
    if let Some(url) = url {
        provider = provider.with_server_url(url);
    }
    let id = app.add_provider(provider)?;
    println!("✅ Added provider {}", short_id(&id));
    Ok(())
}

pub fn remove_provider(app: &mut App, needle: &str) -> Result<(), Box<dyn Error>> {
    let provider = find_provider(&app.state().providers, needle)
        .ok_or_else(|| format!("No provider matches '{needle}'"))?;
    let (id, name) = (provider.id.clone(), provider.name.clone());
    app.delete_provider(&id);
    println!("✅ Removed provider {name}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn providers() -> Vec<Provider> {
        let mut a = Provider::new("Work OpenAI", ProviderKind::OpenaiDirect).with_api_key("sk");
        a.id = "aaaa1111-x".into();
        let mut b = Provider::new("Local", ProviderKind::OpenaiCompat)
            .with_server_url("https://llm.example.com/v1");
        b.id = "aaaa2222-y".into();
        vec![a, b]
    }

    #[test]
    fn find_matches_name_id_and_unique_prefix() {
        let providers = providers();
        assert_eq!(find_provider(&providers, "local").unwrap().id, "aaaa2222-y");
        assert_eq!(find_provider(&providers, "aaaa1111-x").unwrap().name, "Work OpenAI");
        assert_eq!(find_provider(&providers, "aaaa2").unwrap().name, "Local");
        assert!(find_provider(&providers, "aaaa").is_none());
        assert!(find_provider(&providers, "").is_none());
    }

    #[test]
    fn table_marks_selected_provider_and_key_state() {
        let table = render_provider_table(&providers(), "aaaa1111-x::gpt-4o");
        assert!(table.contains("* ✅ Work OpenAI"));
        assert!(table.contains("  ❌ Local"));
        assert!(table.contains("https://llm.example.com/v1"));
    }
}
