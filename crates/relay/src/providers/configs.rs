use std::fmt;

pub const BEDROCK_REGION: &str = "us-west-2";

#[derive(Clone, PartialEq)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl AwsCredentials {
    pub fn new<S: Into<String>, T: Into<String>>(access_key_id: S, secret_access_key: T) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    pub fn with_session_token<S: Into<String>>(mut self, session_token: S) -> Self {
        self.session_token = Some(session_token.into());
        self
    }
}

// Secrets stay out of logs
impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct BedrockProviderConfig {
    pub region: String,
    /// Overrides the regional runtime endpoint, e.g. for a VPC endpoint or a local stand-in
    pub endpoint: Option<String>,
    pub credentials: AwsCredentials,
}

impl BedrockProviderConfig {
    pub fn new<S: Into<String>>(region: S, credentials: AwsCredentials) -> Self {
        Self {
            region: region.into(),
            endpoint: None,
            credentials,
        }
    }

    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn endpoint(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://bedrock-runtime.{}.amazonaws.com", self.region),
        }
    }
}
