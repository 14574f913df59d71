use bytes::Bytes;

use crate::auth::{authenticate, AllowedClientKeys};
use crate::config::AppConfig;
use crate::error::ProxyError;
use crate::protocol::openai::{ModelEntry, ModelList};
use crate::transport::NotionTransport;

/// Shared application state accessible to all handlers.
pub struct AppState {
    pub config: AppConfig,
    pub transport: NotionTransport,
    models_response_body: Bytes,
    allowed_client_keys: AllowedClientKeys,
}

impl AppState {
    #[must_use]
    pub fn new(
        config: AppConfig,
        transport: NotionTransport,
        allowed_client_keys: AllowedClientKeys,
    ) -> Self {
        let models_response_body = build_models_response_body(&config);
        Self {
            config,
            transport,
            models_response_body,
            allowed_client_keys,
        }
    }

    /// Prebuilt `/v1/models` body. The catalog is fixed at startup, so it is
    /// serialized once and cloned per request (a cheap refcount bump).
    #[must_use]
    pub fn models_response_body(&self) -> Bytes {
        self.models_response_body.clone()
    }

    /// Authenticate an ingress request using the prebuilt key index.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Auth` when authentication is enabled and the key
    /// is missing or invalid.
    pub fn authenticate(&self, headers: &http::HeaderMap) -> Result<(), ProxyError> {
        authenticate(headers, &self.allowed_client_keys)
    }

    /// Fresh `chatcmpl-` response id for one streamed completion.
    #[must_use]
    pub fn next_response_id(&self) -> String {
        let uuid = uuid::Uuid::new_v4();
        let mut buf = uuid::Uuid::encode_buffer();
        let hex = uuid.simple().encode_lower(&mut buf);
        format!("chatcmpl-{}", &hex[..8])
    }
}

fn build_models_response_body(config: &AppConfig) -> Bytes {
    let created = chrono::Utc::now().timestamp().max(0) as u64;
    let data = config
        .models
        .aliases
        .iter()
        .map(|alias| ModelEntry {
            id: alias.id.clone(),
            object: "model",
            created,
            owned_by: "notion-ai",
        })
        .collect();
    let list = ModelList {
        object: "list",
        data,
    };
    serde_json::to_vec(&list).map(Bytes::from).unwrap_or_else(|_| {
        Bytes::from_static(br#"{"object":"list","data":[]}"#)
    })
}
