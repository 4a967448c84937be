use secrecy::SecretString;

/// Wraps an API key with secrecy protection (zeroized on drop, redacted in Debug).
#[derive(Clone)]
pub struct ApiKey(pub SecretString);

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

/// Bearer token obtained out of band (for example `az account get-access-token`).
#[derive(Clone)]
pub struct BearerToken(pub SecretString);

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BearerToken([REDACTED])")
    }
}

/// How requests to the service are authenticated.
#[derive(Clone, Debug)]
pub enum Credential {
    ApiKey(ApiKey),
    Bearer(BearerToken),
}

impl Credential {
    pub fn api_key(key: impl Into<String>) -> Self {
        Self::ApiKey(ApiKey(SecretString::from(key.into())))
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer(BearerToken(SecretString::from(token.into())))
    }
}

/// Environment variable names read at startup.
pub mod env_vars {
    pub const PROJECT_ENDPOINT: &str = "AZURE_AI_PROJECT_ENDPOINT";
    pub const PROJECT_API_KEY: &str = "AZURE_AI_PROJECT_API_KEY";
    pub const PROJECT_TOKEN: &str = "AZURE_AI_PROJECT_TOKEN";
    pub const MODEL_DEPLOYMENT_NAME: &str = "MODEL_DEPLOYMENT_NAME";
    pub const BING_CONNECTION_NAME: &str = "BING_CONNECTION_NAME";
    pub const ORCHESTRATOR_AGENT_ID: &str = "ORCHESTRATOR_AGENT_ID";
    pub const OPENAI_ENDPOINT: &str = "AZURE_OPENAI_ENDPOINT";
    pub const OPENAI_KEY: &str = "AZURE_OPENAI_KEY";
}
