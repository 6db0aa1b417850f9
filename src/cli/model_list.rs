use std::error::Error;

use crate::api::models::list_models;
use crate::cli::provider_list::{find_provider, short_id};
use crate::core::app::App;
use crate::core::providers::{make_model_id, split_model_id, Provider};

pub async fn list_available_models(
    app: &App,
    provider_filter: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    let providers: Vec<&Provider> = match provider_filter {
        Some(needle) => vec![find_provider(&app.state().providers, needle)
            .ok_or_else(|| format!("No provider matches '{needle}'"))?],
        None => app.state().providers.iter().collect(),
    };
    if providers.is_empty() {
        println!("No providers configured. Add one with `kiconnect provider add`.");
        return Ok(());
    }

    let current = app.state().config.model.as_str();
    for provider in providers {
        println!("{} ({}):", provider.name, short_id(&provider.id));
        match list_models(app.client(), app.router(), provider).await {
            Ok(ids) if ids.is_empty() => println!("  (no models reported)"),
            Ok(ids) => {
                for id in ids {
                    let marker = if id == current { "*" } else { " " };
                    let (_, bare) = split_model_id(&id);
                    println!("{marker} {bare}");
                }
            }
            Err(err) => println!("  ❌ {err}"),
        }
        println!();
    }
    Ok(())
}

/// Turn `provider::model` into the stored composite id. The provider part may
/// be a name or id prefix; without one the only configured provider is used.
pub fn qualify_model_id(providers: &[Provider], input: &str) -> Result<String, String> {
    let input = input.trim();
    let (provider_part, model) = split_model_id(input);
    if model.trim().is_empty() {
        return Err("Model name is required".to_string());
    }
    let provider = match provider_part {
        Some(needle) => find_provider(providers, needle)
            .ok_or_else(|| format!("No provider matches '{needle}'"))?,
        None => match providers {
            [only] => only,
            [] => return Err("No providers configured".to_string()),
            _ => {
                return Err(
                    "Several providers are configured; use <provider>::<model>".to_string(),
                )
            }
        },
    };
    Ok(make_model_id(&provider.id, model.trim()))
}

pub fn set_model(app: &mut App, input: &str) -> Result<(), Box<dyn Error>> {
    let full_id = qualify_model_id(&app.state().providers, input)?;
    app.set_model(&full_id);
    let (_, bare) = split_model_id(&full_id);
    println!("✅ Selected model {bare}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::providers::ProviderKind;

    fn provider(id: &str, name: &str) -> Provider {
        let mut provider = Provider::new(name, ProviderKind::Anthropic);
        provider.id = id.to_string();
        provider
    }

    #[test]
    fn qualifies_by_provider_name() {
        let providers = vec![provider("p1", "Claude"), provider("p2", "Other")];
        assert_eq!(
            qualify_model_id(&providers, "claude::claude-sonnet-4-5").unwrap(),
            "p1::claude-sonnet-4-5"
        );
    }

    #[test]
    fn bare_model_needs_a_single_provider() {
        let one = vec![provider("p1", "Claude")];
        assert_eq!(qualify_model_id(&one, "m").unwrap(), "p1::m");

        let two = vec![provider("p1", "Claude"), provider("p2", "Other")];
        assert!(qualify_model_id(&two, "m").is_err());
        assert!(qualify_model_id(&[], "m").is_err());
        assert!(qualify_model_id(&one, "Claude::").is_err());
    }
}
