use std::sync::Arc;

use tickd_core::connector::TickdConnector;
use tickd_core::registry::{
    CredentialSpec, Plugin, ProviderRegistry, RegistryBuilder, credential_env_var,
};
use tickd_core::TickdError;

struct BareConnector {
    id: &'static str,
}

impl TickdConnector for BareConnector {
    fn id(&self) -> &'static str {
        self.id
    }
}

struct KeyedPlugin {
    id: &'static str,
    mandatory: bool,
}

impl Plugin for KeyedPlugin {
    fn plugin_id(&self) -> &'static str {
        self.id
    }
    fn display_name(&self) -> &'static str {
        "Keyed Vendor"
    }
    fn version(&self) -> &'static str {
        "1.0.0"
    }
    fn credentials(&self) -> Vec<CredentialSpec> {
        vec![CredentialSpec::required("KEYID"), CredentialSpec::optional("SECRETKEY")]
    }
    fn mandatory(&self) -> bool {
        self.mandatory
    }
    fn register(&self, registry: &mut RegistryBuilder) -> Result<(), TickdError> {
        assert!(registry.credential("KEYID").is_some());
        registry.require_http_client("keyed-api");
        registry.add_provider(Arc::new(BareConnector { id: self.id }))
    }
}

struct OpenPlugin;

impl Plugin for OpenPlugin {
    fn plugin_id(&self) -> &'static str {
        "open"
    }
    fn display_name(&self) -> &'static str {
        "Open Vendor"
    }
    fn version(&self) -> &'static str {
        "1.0.0"
    }
    fn register(&self, registry: &mut RegistryBuilder) -> Result<(), TickdError> {
        registry.add_provider(Arc::new(BareConnector { id: "open" }))
    }
}

#[test]
fn credential_env_var_uppercases_and_maps_separators() {
    assert_eq!(credential_env_var("tickd-stooq", "KEYID"), "TICKD_STOOQ__KEYID");
    assert_eq!(credential_env_var("open", "SECRETKEY"), "OPEN__SECRETKEY");
}

#[test]
fn missing_required_credential_disables_optional_plugin() {
    let plugins: Vec<Box<dyn Plugin>> = vec![
        Box::new(KeyedPlugin { id: "keyed-a", mandatory: false }),
        Box::new(OpenPlugin),
    ];
    let registry = ProviderRegistry::from_plugins(&plugins).expect("registry builds");

    assert!(registry.get("keyed-a").is_none());
    assert!(registry.get("open").is_some());
    assert_eq!(registry.disabled().len(), 1);
    assert_eq!(registry.disabled()[0].plugin_id, "keyed-a");
}

#[test]
fn missing_required_credential_aborts_for_mandatory_plugin() {
    let plugins: Vec<Box<dyn Plugin>> =
        vec![Box::new(KeyedPlugin { id: "keyed-b", mandatory: true })];
    let err = ProviderRegistry::from_plugins(&plugins).unwrap_err();
    assert!(matches!(err, TickdError::Credential { .. }));
}

#[test]
fn present_credentials_register_provider_and_http_client() {
    unsafe { std::env::set_var("KEYED_C__KEYID", "abc123") };
    let plugins: Vec<Box<dyn Plugin>> =
        vec![Box::new(KeyedPlugin { id: "keyed-c", mandatory: false })];
    let registry = ProviderRegistry::from_plugins(&plugins).expect("registry builds");

    assert!(registry.get("keyed-c").is_some());
    assert_eq!(registry.required_http_clients(), ["keyed-api"]);
    assert!(registry.disabled().is_empty());
}

#[test]
fn duplicate_provider_ids_are_rejected() {
    let registry = ProviderRegistry::from_connectors(vec![
        Arc::new(BareConnector { id: "a" }),
        Arc::new(BareConnector { id: "b" }),
    ]);
    assert!(registry.get("a").is_some());
    assert!(registry.get("b").is_some());
    assert!(registry.get("c").is_none());
    // Capability filters: bare connectors advertise nothing.
    assert!(registry.streaming().is_empty());
    assert!(registry.history().is_empty());
}
