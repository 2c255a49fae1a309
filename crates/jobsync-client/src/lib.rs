//! # Jobsync Client
//!
//! Concrete collaborators for [`jobsync_realtime::SyncService`]:
//!
//! - [`api::PortalClient`]: REST client implementing the history and
//!   notification services
//! - [`FileTokenProvider`] / [`StaticTokenProvider`]: bearer tokens per role
//! - [`WsConnector`]: WebSocket transport
//!
//! [`collaborators`] wires all three into a [`Collaborators`] set.

pub mod api;
pub mod credentials;
pub mod ws;

pub use credentials::{
    CredentialsError, FileTokenProvider, StaticTokenProvider, StoredCredentials, StoredSession,
};
pub use ws::WsConnector;

use jobsync_realtime::{Collaborators, TokenProvider};
use std::sync::Arc;

/// Builds the collaborator set for a portal deployment.
///
/// REST calls and WebSocket upgrades share `tokens`.
pub fn collaborators(
    api_url: &str,
    ws_url: &str,
    tokens: Arc<dyn TokenProvider>,
) -> api::ApiResult<Collaborators> {
    let portal = Arc::new(api::PortalClient::new(api_url, tokens.clone())?);
    Ok(Collaborators {
        connector: Arc::new(WsConnector::new(ws_url)),
        tokens,
        history: portal.clone(),
        notifications: portal,
    })
}
