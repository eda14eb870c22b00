use hwcloud_config::{ClientFactory, CloudConfig};
use hwcloud_resource::{Lifecycle, OperationContext, PollTiming};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use wiremock::MockServer;

pub const PROJECT_ID: &str = "p-1";

/// Context whose services all point at `server`, polling every 10ms
pub fn context(server: &MockServer) -> OperationContext {
    context_with(server, |_| {})
}

/// Same as [`context`], with provider settings adjusted by `configure`
pub fn context_with(
    server: &MockServer,
    configure: impl FnOnce(&mut CloudConfig),
) -> OperationContext {
    let endpoints: HashMap<String, String> = ["ga", "dcs", "cdm"]
        .iter()
        .map(|service| (service.to_string(), server.uri()))
        .collect();
    let mut config = CloudConfig {
        region: "cn-north-4".to_string(),
        auth_token: "token".to_string(),
        project_id: Some(PROJECT_ID.to_string()),
        endpoints,
        max_retries: 0,
        ..Default::default()
    };
    configure(&mut config);

    OperationContext::new(Arc::new(ClientFactory::new(config).unwrap())).with_poll_timing(
        PollTiming {
            delay: Duration::ZERO,
            interval: Duration::from_millis(10),
        },
    )
}

pub fn lifecycle(server: &MockServer, type_name: &str) -> Lifecycle {
    let adapter = hwcloud_services::registry().resource(type_name).unwrap();
    Lifecycle::new(adapter, context(server))
}
