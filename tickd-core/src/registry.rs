//! Plugin registration and the process-wide provider registry.
//!
//! Plugins are discovered from a declared list, not dynamic loading. Each
//! plugin describes itself and, during registration, adds providers, named
//! HTTP client requirements, and credential field declarations. The
//! registry is populated once at startup and read-only thereafter.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::TickdError;
use crate::connector::TickdConnector;

/// A credential field a plugin reads from the environment.
///
/// Fields resolve to `<PROVIDER>__<FIELD>` environment variables with the
/// provider id uppercased and non-alphanumerics mapped to underscores
/// (e.g. `TICKD_STOOQ__KEYID`).
#[derive(Debug, Clone)]
pub struct CredentialSpec {
    /// Field name, e.g. "KEYID" or "SECRETKEY".
    pub field: &'static str,
    /// Whether the plugin cannot operate without it.
    pub required: bool,
}

impl CredentialSpec {
    /// Required credential field.
    #[must_use]
    pub const fn required(field: &'static str) -> Self {
        Self {
            field,
            required: true,
        }
    }

    /// Optional credential field.
    #[must_use]
    pub const fn optional(field: &'static str) -> Self {
        Self {
            field,
            required: false,
        }
    }
}

/// Environment variable name for a provider credential field.
#[must_use]
pub fn credential_env_var(provider_id: &str, field: &str) -> String {
    let prefix: String = provider_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{prefix}__{field}")
}

/// A self-describing provider plugin.
pub trait Plugin: Send + Sync {
    /// Stable plugin identifier.
    fn plugin_id(&self) -> &'static str;

    /// Human-friendly name.
    fn display_name(&self) -> &'static str;

    /// Plugin version string.
    fn version(&self) -> &'static str;

    /// Credential fields this plugin reads at startup.
    fn credentials(&self) -> Vec<CredentialSpec> {
        Vec::new()
    }

    /// Whether the whole process must refuse to start when this plugin
    /// cannot register (e.g. its credentials are missing). Optional
    /// plugins are disabled instead.
    fn mandatory(&self) -> bool {
        false
    }

    /// Register providers and requirements.
    ///
    /// # Errors
    /// Return an error to signal the plugin cannot construct (missing
    /// runtime dependency, refused stub vendor, ...).
    fn register(&self, registry: &mut RegistryBuilder) -> Result<(), TickdError>;
}

/// Mutable registration surface handed to plugins.
pub struct RegistryBuilder {
    current_plugin: &'static str,
    providers: BTreeMap<String, Arc<dyn TickdConnector>>,
    http_clients: Vec<String>,
    credentials: HashMap<String, String>,
}

impl RegistryBuilder {
    fn new() -> Self {
        Self {
            current_plugin: "",
            providers: BTreeMap::new(),
            http_clients: Vec::new(),
            credentials: HashMap::new(),
        }
    }

    /// Add a provider under its own id.
    ///
    /// # Errors
    /// `InvalidArg` when a provider with the same id is already registered.
    pub fn add_provider(&mut self, provider: Arc<dyn TickdConnector>) -> Result<(), TickdError> {
        let id = provider.id().to_string();
        if self.providers.contains_key(&id) {
            return Err(TickdError::InvalidArg(format!(
                "provider '{id}' registered twice"
            )));
        }
        self.providers.insert(id, provider);
        Ok(())
    }

    /// Declare that the plugin needs a named HTTP client built by the host.
    pub fn require_http_client(&mut self, name: impl Into<String>) {
        self.http_clients.push(name.into());
    }

    /// Resolved credential value for a field declared by the current
    /// plugin, if present in the environment.
    #[must_use]
    pub fn credential(&self, field: &str) -> Option<&str> {
        self.credentials
            .get(&credential_env_var(self.current_plugin, field))
            .map(String::as_str)
    }
}

/// Process-wide `{provider id -> connector}` mapping.
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn TickdConnector>>,
    http_clients: Vec<String>,
    disabled: Vec<DisabledPlugin>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("http_clients", &self.http_clients)
            .field("disabled", &self.disabled)
            .finish()
    }
}

/// Record of a plugin that could not register.
#[derive(Debug, Clone)]
pub struct DisabledPlugin {
    /// Plugin id.
    pub plugin_id: &'static str,
    /// Why it was disabled.
    pub reason: String,
}

impl ProviderRegistry {
    /// Build the registry by running every plugin's registration.
    ///
    /// Plugins with missing required credentials are disabled (recorded in
    /// [`disabled`](Self::disabled)) unless they declare themselves
    /// [`mandatory`](Plugin::mandatory), in which case startup aborts.
    ///
    /// # Errors
    /// `Credential` when a mandatory plugin lacks a required credential;
    /// whatever a mandatory plugin's `register` returned on failure.
    pub fn from_plugins(plugins: &[Box<dyn Plugin>]) -> Result<Self, TickdError> {
        let mut builder = RegistryBuilder::new();
        let mut disabled = Vec::new();

        for plugin in plugins {
            builder.current_plugin = plugin.plugin_id();
            builder.credentials.clear();

            let mut missing: Option<&'static str> = None;
            for spec in plugin.credentials() {
                let var = credential_env_var(plugin.plugin_id(), spec.field);
                match std::env::var(&var) {
                    Ok(value) => {
                        builder.credentials.insert(var, value);
                    }
                    Err(_) if spec.required => {
                        missing = Some(spec.field);
                        break;
                    }
                    Err(_) => {}
                }
            }

            if let Some(field) = missing {
                if plugin.mandatory() {
                    return Err(TickdError::Credential {
                        provider: plugin.plugin_id().to_string(),
                        field: credential_env_var(plugin.plugin_id(), field),
                    });
                }
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    plugin = plugin.plugin_id(),
                    field,
                    "disabling plugin: required credential missing"
                );
                disabled.push(DisabledPlugin {
                    plugin_id: plugin.plugin_id(),
                    reason: format!("missing credential {field}"),
                });
                continue;
            }

            if let Err(e) = plugin.register(&mut builder) {
                if plugin.mandatory() {
                    return Err(e);
                }
                disabled.push(DisabledPlugin {
                    plugin_id: plugin.plugin_id(),
                    reason: e.to_string(),
                });
            }
        }

        Ok(Self {
            providers: builder.providers,
            http_clients: builder.http_clients,
            disabled,
        })
    }

    /// Registry over pre-built connectors, bypassing plugins. Useful in
    /// tests and embedded setups.
    #[must_use]
    pub fn from_connectors(connectors: Vec<Arc<dyn TickdConnector>>) -> Self {
        let providers = connectors
            .into_iter()
            .map(|c| (c.id().to_string(), c))
            .collect();
        Self {
            providers,
            http_clients: Vec::new(),
            disabled: Vec::new(),
        }
    }

    /// Look up a provider by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<dyn TickdConnector>> {
        self.providers.get(id).cloned()
    }

    /// All registered providers in id order.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<dyn TickdConnector>> {
        self.providers.values().cloned().collect()
    }

    /// Providers advertising the streaming capability.
    #[must_use]
    pub fn streaming(&self) -> Vec<Arc<dyn TickdConnector>> {
        self.providers
            .values()
            .filter(|c| c.as_streaming_provider().is_some())
            .cloned()
            .collect()
    }

    /// Providers advertising the history capability.
    #[must_use]
    pub fn history(&self) -> Vec<Arc<dyn TickdConnector>> {
        self.providers
            .values()
            .filter(|c| c.as_history_provider().is_some())
            .cloned()
            .collect()
    }

    /// Named HTTP clients requested by plugins during registration.
    #[must_use]
    pub fn required_http_clients(&self) -> &[String] {
        &self.http_clients
    }

    /// Plugins that failed to register and were disabled.
    #[must_use]
    pub fn disabled(&self) -> &[DisabledPlugin] {
        &self.disabled
    }
}
