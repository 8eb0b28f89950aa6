use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::ApiError;
use crate::models::{Blockable, EventWithContext, Host, QueryPage, User};
use crate::resources::{self, ApiTransport, Params, ResourceBinding};

/// Which binding an entity page loads through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Blockables,
    BlockableQuery,
    Hosts,
    HostQuery,
    Events,
    EventQuery,
}

/// Typed calls against the Upvote web API.
pub struct UpvoteClient {
    transport: Arc<dyn ApiTransport>,
    blockables: ResourceBinding,
    blockable_query: ResourceBinding,
    hosts: ResourceBinding,
    host_query: ResourceBinding,
    host_service: ResourceBinding,
    exemptions: ResourceBinding,
    events: ResourceBinding,
    event_query: ResourceBinding,
    users: ResourceBinding,
    settings: ResourceBinding,
}

impl UpvoteClient {
    pub fn new(transport: Arc<dyn ApiTransport>, web_prefix: &str) -> Self {
        Self {
            transport,
            blockables: resources::blockable_resource(web_prefix),
            blockable_query: resources::blockable_query_resource(web_prefix),
            hosts: resources::host_resource(web_prefix),
            host_query: resources::host_query_resource(web_prefix),
            host_service: resources::host_service_resource(web_prefix),
            exemptions: resources::exemption_resource(web_prefix),
            events: resources::event_resource(web_prefix),
            event_query: resources::event_query_resource(web_prefix),
            users: resources::user_resource(web_prefix),
            settings: resources::settings_resource(web_prefix),
        }
    }

    pub fn binding(&self, binding: Binding) -> &ResourceBinding {
        match binding {
            Binding::Blockables => &self.blockables,
            Binding::BlockableQuery => &self.blockable_query,
            Binding::Hosts => &self.hosts,
            Binding::HostQuery => &self.host_query,
            Binding::Events => &self.events,
            Binding::EventQuery => &self.event_query,
        }
    }

    /// Runs one action of a binding and decodes the response.
    pub async fn invoke<T: DeserializeOwned>(
        &self,
        binding: &ResourceBinding,
        action: &str,
        params: &Params,
        payload: Option<&Value>,
    ) -> Result<T, ApiError> {
        let request = binding.build(action, params, payload)?;
        let path = request.path();
        debug!("invoking {action} on {path}");
        let value = self.transport.send(request).await?;
        serde_json::from_value(value).map_err(|err| ApiError::Decode {
            path,
            message: err.to_string(),
        })
    }

    pub async fn get_blockable(&self, id: &str) -> Result<Blockable, ApiError> {
        self.invoke(&self.blockables, "get", &id_param(id), None).await
    }

    pub async fn query_blockables(
        &self,
        platform: &str,
        blockable_type: &str,
        filter: &Params,
    ) -> Result<QueryPage<Blockable>, ApiError> {
        let mut params = filter.clone();
        params.insert("platform".to_string(), platform.to_string());
        params.insert("type".to_string(), blockable_type.to_string());
        self.invoke(&self.blockable_query, "query", &params, None).await
    }

    pub async fn save_blockable(&self, blockable: &Blockable) -> Result<Value, ApiError> {
        let payload = encode(blockable, &self.blockables.url)?;
        self.invoke(&self.blockables, "save", &Params::new(), Some(&payload)).await
    }

    pub async fn reset_blockable(&self, id: &str) -> Result<Value, ApiError> {
        let payload = serde_json::json!({ "id": id });
        self.invoke(&self.blockables, "reset", &Params::new(), Some(&payload)).await
    }

    /// Posts the compiler flag for a blockable.
    pub async fn update_blockable(&self, blockable: &Blockable) -> Result<Value, ApiError> {
        let payload = encode(blockable, &self.blockables.url)?;
        self.invoke(&self.blockables, "update", &Params::new(), Some(&payload)).await
    }

    pub async fn get_host(&self, id: &str) -> Result<Host, ApiError> {
        self.invoke(&self.hosts, "get", &id_param(id), None).await
    }

    pub async fn query_hosts(
        &self,
        platform: &str,
        filter: &Params,
    ) -> Result<QueryPage<Host>, ApiError> {
        let mut params = filter.clone();
        params.insert("platform".to_string(), platform.to_string());
        self.invoke(&self.host_query, "query", &params, None).await
    }

    pub async fn update_host(&self, host: &Host) -> Result<Value, ApiError> {
        self.update_host_with(host, &Params::new()).await
    }

    /// Host update with extra request params, for fields the backend only
    /// reads from params (the directory regexes).
    pub async fn update_host_with(
        &self,
        host: &Host,
        extra: &Params,
    ) -> Result<Value, ApiError> {
        let payload = encode(host, &self.hosts.url)?;
        self.invoke(&self.hosts, "update", extra, Some(&payload)).await
    }

    /// Hosts associated with the signed-in user.
    pub async fn associated_hosts(&self) -> Result<Vec<Host>, ApiError> {
        self.invoke(&self.host_service, "associated", &Params::new(), None).await
    }

    pub async fn set_host_hidden(&self, host_id: &str, hidden: bool) -> Result<Value, ApiError> {
        let mut params = id_param(host_id);
        params.insert("value".to_string(), hidden.to_string());
        self.invoke(&self.host_service, "setHidden", &params, None).await
    }

    pub async fn set_host_transitive(
        &self,
        host_id: &str,
        enabled: bool,
    ) -> Result<Value, ApiError> {
        let mut params = id_param(host_id);
        params.insert("value".to_string(), enabled.to_string());
        self.invoke(&self.host_service, "setTransitive", &params, None).await
    }

    pub async fn cancel_exemption(&self, host_id: &str) -> Result<Value, ApiError> {
        self.invoke(&self.exemptions, "cancel", &id_param(host_id), None).await
    }

    pub async fn get_event(&self, id: &str) -> Result<EventWithContext, ApiError> {
        let mut params = id_param(id);
        params.insert("withContext".to_string(), "true".to_string());
        self.invoke(&self.events, "get", &params, None).await
    }

    pub async fn query_events(
        &self,
        filter: &Params,
    ) -> Result<QueryPage<EventWithContext>, ApiError> {
        let mut params = filter.clone();
        params.insert("withContext".to_string(), "true".to_string());
        self.invoke(&self.event_query, "query", &params, None).await
    }

    pub async fn get_self(&self) -> Result<User, ApiError> {
        self.invoke(&self.users, "getSelf", &Params::new(), None).await
    }

    /// Reads one named setting. Non-string values come back as JSON text.
    pub async fn get_setting(&self, name: &str) -> Result<String, ApiError> {
        let mut params = Params::new();
        params.insert("setting".to_string(), name.to_string());
        let value: Value = self.invoke(&self.settings, "get", &params, None).await?;
        Ok(match value {
            Value::Null => String::new(),
            Value::String(s) => s,
            other => other.to_string(),
        })
    }
}

fn id_param(id: &str) -> Params {
    let mut params = Params::new();
    params.insert("id".to_string(), id.to_string());
    params
}

fn encode<T: Serialize>(entity: &T, path: &str) -> Result<Value, ApiError> {
    serde_json::to_value(entity).map_err(|err| ApiError::Decode {
        path: path.to_string(),
        message: format!("failed encoding payload: {err}"),
    })
}
