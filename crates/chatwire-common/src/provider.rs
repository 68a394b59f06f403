use std::fmt;

use serde::{Deserialize, Serialize};

use crate::settings::SiteSettings;

/// Upstream vendors a model row can point at. All of them are reached through
/// the same OpenAI-compatible chat-completions shape; only the capability
/// table below differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenRouter,
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Gemini,
}

#[derive(Debug, Clone, Copy)]
pub struct ProviderCapabilities {
    /// Name shown in configuration errors.
    pub label: &'static str,
    /// Column of `site_settings` holding the fallback credential.
    pub credential_field: &'static str,
    /// Reads that column.
    pub site_credential: fn(&SiteSettings) -> Option<&str>,
    pub base_url: &'static str,
    /// Path appended to `base_url` for the model catalog.
    pub catalog_path: &'static str,
    /// Model ids are `vendor/model` rather than the vendor's bare id.
    pub namespaced_model_ids: bool,
}

const OPENROUTER: ProviderCapabilities = ProviderCapabilities {
    label: "OpenRouter",
    credential_field: "openrouter_api_key",
    site_credential: |settings| settings.openrouter_api_key.as_deref(),
    base_url: "https://openrouter.ai/api/v1",
    catalog_path: "/models",
    namespaced_model_ids: true,
};

const OPENAI: ProviderCapabilities = ProviderCapabilities {
    label: "OpenAI",
    credential_field: "openai_api_key",
    site_credential: |settings| settings.openai_api_key.as_deref(),
    base_url: "https://api.openai.com/v1",
    catalog_path: "/models",
    namespaced_model_ids: false,
};

const ANTHROPIC: ProviderCapabilities = ProviderCapabilities {
    label: "Anthropic",
    credential_field: "anthropic_api_key",
    site_credential: |settings| settings.anthropic_api_key.as_deref(),
    base_url: "https://api.anthropic.com/v1",
    catalog_path: "/models",
    namespaced_model_ids: false,
};

const GEMINI: ProviderCapabilities = ProviderCapabilities {
    label: "Gemini",
    credential_field: "gemini_api_key",
    site_credential: |settings| settings.gemini_api_key.as_deref(),
    base_url: "https://generativelanguage.googleapis.com/v1beta/openai",
    catalog_path: "/models",
    namespaced_model_ids: false,
};

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::OpenRouter,
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
        ProviderKind::Gemini,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenRouter => "openrouter",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Gemini => "gemini",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value))
    }

    pub fn capabilities(&self) -> &'static ProviderCapabilities {
        match self {
            ProviderKind::OpenRouter => &OPENROUTER,
            ProviderKind::OpenAi => &OPENAI,
            ProviderKind::Anthropic => &ANTHROPIC,
            ProviderKind::Gemini => &GEMINI,
        }
    }

    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.capabilities().base_url)
    }

    pub fn catalog_url(&self) -> String {
        let caps = self.capabilities();
        format!("{}{}", caps.base_url, caps.catalog_path)
    }

    /// Native id as sent upstream. Namespaced providers keep `vendor/model`;
    /// the others drop a stray namespace an admin may have pasted in.
    pub fn native_model_id<'a>(&self, model_id: &'a str) -> &'a str {
        let model_id = model_id.trim();
        if self.capabilities().namespaced_model_ids {
            return model_id;
        }
        match model_id.split_once('/') {
            Some((_, bare)) if !bare.is_empty() => bare,
            _ => model_id,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
