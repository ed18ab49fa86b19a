use std::{path::PathBuf, str::FromStr, time::Duration};

/// Runtime settings, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub hf_api_key: String,
    pub hf_api_base: String,
    pub chat_model: String,
    pub chat_max_tokens: u32,
    pub image_model: String,
    pub image_retries: u32,
    pub image_retry_delay: Duration,
    pub image_timeout: Duration,
    pub image_output_path: PathBuf,
    pub spoonacular_api_key: String,
    pub spoonacular_api_base: String,
    pub imgur_client_id: String,
    pub imgur_api_base: String,
    pub instagram_access_token: String,
    pub instagram_account_id: String,
    pub graph_api_base: String,
    pub port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hf_api_key: String::new(),
            hf_api_base: "https://api-inference.huggingface.co".into(),
            chat_model: "mistralai/Mistral-7B-Instruct-v0.2".into(),
            chat_max_tokens: 500,
            image_model: "CompVis/stable-diffusion-v1-4".into(),
            image_retries: 3,
            image_retry_delay: Duration::from_secs(5),
            image_timeout: Duration::from_secs(60),
            image_output_path: PathBuf::from("generated_image.png"),
            spoonacular_api_key: String::new(),
            spoonacular_api_base: "https://api.spoonacular.com".into(),
            imgur_client_id: String::new(),
            imgur_api_base: "https://api.imgur.com".into(),
            instagram_access_token: String::new(),
            instagram_account_id: String::new(),
            graph_api_base: "https://graph.facebook.com/v14.0".into(),
            port: 8080,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from any key lookup. Missing or unparsable values keep
    /// the `Default` value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        let var_or = |key: &str, default: String| lookup(key).unwrap_or(default);
        let secs_or = |key: &str, default: Duration| Duration::from_secs(parsed_or(&lookup, key, default.as_secs()));
        Self {
            hf_api_key: var_or("HF_API_KEY", d.hf_api_key),
            hf_api_base: var_or("HF_API_BASE", d.hf_api_base),
            chat_model: var_or("HF_CHAT_MODEL", d.chat_model),
            chat_max_tokens: parsed_or(&lookup, "CHAT_MAX_TOKENS", d.chat_max_tokens),
            image_model: var_or("HF_IMAGE_MODEL", d.image_model),
            image_retries: parsed_or(&lookup, "IMAGE_RETRIES", d.image_retries),
            image_retry_delay: secs_or("IMAGE_RETRY_DELAY_SECS", d.image_retry_delay),
            image_timeout: secs_or("IMAGE_TIMEOUT_SECS", d.image_timeout),
            image_output_path: lookup("IMAGE_OUTPUT_PATH").map(PathBuf::from).unwrap_or(d.image_output_path),
            spoonacular_api_key: var_or("SPOONACULAR_API_KEY", d.spoonacular_api_key),
            spoonacular_api_base: var_or("SPOONACULAR_API_BASE", d.spoonacular_api_base),
            imgur_client_id: var_or("IMGUR_CLIENT_ID", d.imgur_client_id),
            imgur_api_base: var_or("IMGUR_API_BASE", d.imgur_api_base),
            instagram_access_token: var_or("INSTAGRAM_ACCESS_TOKEN", d.instagram_access_token),
            instagram_account_id: var_or("INSTAGRAM_ACCOUNT_ID", d.instagram_account_id),
            graph_api_base: var_or("GRAPH_API_BASE", d.graph_api_base),
            port: parsed_or(&lookup, "PORT", d.port),
        }
    }
}

fn parsed_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

/// Shows only the first few characters of a secret for log lines.
pub fn mask(secret: &str) -> String {
    if secret.is_empty() {
        return "<unset>".into();
    }
    let prefix: String = secret.chars().take(4).collect();
    format!("{prefix}***")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_hosted_services() {
        let s = Settings::default();
        assert_eq!(s.image_retries, 3);
        assert_eq!(s.image_retry_delay, Duration::from_secs(5));
        assert_eq!(s.chat_max_tokens, 500);
        assert_eq!(s.image_output_path, PathBuf::from("generated_image.png"));
    }

    #[test]
    fn unset_keys_fall_back_to_defaults() {
        let s = Settings::from_lookup(|_| None);
        let d = Settings::default();
        assert_eq!(s.image_retry_delay, d.image_retry_delay);
        assert_eq!(s.image_timeout, d.image_timeout);
        assert_eq!(s.image_retries, d.image_retries);
        assert_eq!(s.port, d.port);
        assert_eq!(s.hf_api_base, d.hf_api_base);
    }

    #[test]
    fn set_keys_override_and_bad_numbers_are_ignored() {
        let s = Settings::from_lookup(|key| match key {
            "IMAGE_TIMEOUT_SECS" => Some(" 9 ".into()),
            "IMAGE_RETRY_DELAY_SECS" => Some("soon".into()),
            "HF_IMAGE_MODEL" => Some("sd".into()),
            _ => None,
        });
        assert_eq!(s.image_timeout, Duration::from_secs(9));
        assert_eq!(s.image_retry_delay, Settings::default().image_retry_delay);
        assert_eq!(s.image_model, "sd");
    }

    #[test]
    fn mask_hides_everything_but_a_prefix() {
        assert_eq!(mask(""), "<unset>");
        assert_eq!(mask("hf_abcdefgh"), "hf_a***");
        assert_eq!(mask("ab"), "ab***");
    }
}
