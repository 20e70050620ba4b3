use relay::streaming::Relay;
use std::sync::Arc;

/// Shared application state
///
/// The relay and the provider client inside it are built once in `main` and only ever read.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
}

impl AppState {
    pub fn new(relay: Relay) -> Self {
        Self {
            relay: Arc::new(relay),
        }
    }
}
