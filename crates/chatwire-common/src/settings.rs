use serde::{Deserialize, Serialize};

use crate::provider::ProviderKind;

/// Site-wide settings row, including provider credentials. Fields missing
/// from a JSON payload take their default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSettings {
    pub id: String,
    pub site_name: String,
    pub primary_color: String,
    pub secondary_color: String,
    pub background_color: String,
    pub text_color: String,
    pub accent_color: String,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub favicon_url: Option<String>,
    pub welcome_message: String,
    pub footer_text: String,
    pub font_family: String,
    pub enable_dark_mode: bool,
    pub max_message_length: u32,
    pub enable_guest_access: bool,
    #[serde(default)]
    pub openrouter_api_key: Option<String>,
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub anthropic_api_key: Option<String>,
    #[serde(default)]
    pub gemini_api_key: Option<String>,
    /// RFC 3339.
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// What `GET /api/settings` returns: everything but the credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicSiteSettings {
    pub id: String,
    pub site_name: String,
    pub primary_color: String,
    pub secondary_color: String,
    pub background_color: String,
    pub text_color: String,
    pub accent_color: String,
    pub logo_url: Option<String>,
    pub favicon_url: Option<String>,
    pub welcome_message: String,
    pub footer_text: String,
    pub font_family: String,
    pub enable_dark_mode: bool,
    pub max_message_length: u32,
    pub enable_guest_access: bool,
    pub updated_at: Option<String>,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            id: String::new(),
            site_name: "AI Assistant".to_string(),
            primary_color: "#7c3aed".to_string(),
            secondary_color: "#2563eb".to_string(),
            background_color: "#ffffff".to_string(),
            text_color: "#000000".to_string(),
            accent_color: "#10b981".to_string(),
            logo_url: None,
            favicon_url: None,
            welcome_message: "Welcome to our AI Assistant".to_string(),
            footer_text: "Powered by AI Technology".to_string(),
            font_family: "Inter".to_string(),
            enable_dark_mode: true,
            max_message_length: 4000,
            enable_guest_access: true,
            openrouter_api_key: None,
            openai_api_key: None,
            anthropic_api_key: None,
            gemini_api_key: None,
            updated_at: None,
        }
    }
}

impl SiteSettings {
    pub fn api_key_for(&self, kind: ProviderKind) -> Option<&str> {
        (kind.capabilities().site_credential)(self)
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    pub fn public(&self) -> PublicSiteSettings {
        PublicSiteSettings {
            id: self.id.clone(),
            site_name: self.site_name.clone(),
            primary_color: self.primary_color.clone(),
            secondary_color: self.secondary_color.clone(),
            background_color: self.background_color.clone(),
            text_color: self.text_color.clone(),
            accent_color: self.accent_color.clone(),
            logo_url: self.logo_url.clone(),
            favicon_url: self.favicon_url.clone(),
            welcome_message: self.welcome_message.clone(),
            footer_text: self.footer_text.clone(),
            font_family: self.font_family.clone(),
            enable_dark_mode: self.enable_dark_mode,
            max_message_length: self.max_message_length,
            enable_guest_access: self.enable_guest_access,
            updated_at: self.updated_at.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_keys_count_as_missing() {
        let settings = SiteSettings {
            openrouter_api_key: Some("  ".to_string()),
            openai_api_key: Some(" sk-1 ".to_string()),
            ..Default::default()
        };
        assert_eq!(settings.api_key_for(ProviderKind::OpenRouter), None);
        assert_eq!(settings.api_key_for(ProviderKind::OpenAi), Some("sk-1"));
        assert_eq!(settings.api_key_for(ProviderKind::Gemini), None);
    }

    #[test]
    fn public_projection_drops_credentials() {
        let settings = SiteSettings {
            openrouter_api_key: Some("secret".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&settings.public()).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("\"site_name\":\"AI Assistant\""));
    }
}
