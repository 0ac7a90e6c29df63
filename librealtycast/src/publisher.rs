//! Per-platform publishing with token lookup, timeout and result normalization
//!
//! Nothing here returns an error: every outcome, including a missing token
//! or an unregistered adapter, becomes a [`PublishResult`].

use std::collections::BTreeSet;
use std::time::Duration;

use futures::future::join_all;
use tracing::{error, info, warn};

use crate::error::ExternalApiError;
use crate::platforms::AdapterSet;
use crate::tokens::TokenStore;
use crate::types::{now_ts, Platform, PublishPayload, PublishResult};

#[derive(Clone)]
pub struct Publisher {
    adapters: AdapterSet,
    tokens: TokenStore,
    timeout: Duration,
}

impl Publisher {
    pub fn new(adapters: AdapterSet, tokens: TokenStore, timeout: Duration) -> Self {
        Self {
            adapters,
            tokens,
            timeout,
        }
    }

    /// Publish to one platform on behalf of `owner_key`
    ///
    /// The adapter is not called when no valid token can be obtained.
    pub async fn publish_to_platform(
        &self,
        platform: Platform,
        payload: &PublishPayload,
        owner_key: &str,
    ) -> PublishResult {
        let token = match self.tokens.get_valid_token(platform, owner_key, now_ts()).await {
            Ok(token) => token,
            Err(e) => {
                warn!(platform = %platform, owner = %owner_key, error = %e, "No usable token");
                return PublishResult::failure(platform, e.to_string(), now_ts());
            }
        };

        let Some(adapter) = self.adapters.get(platform) else {
            error!(platform = %platform, "No adapter registered");
            return PublishResult::failure(
                platform,
                format!("no adapter registered for {}", platform),
                now_ts(),
            );
        };

        let outcome = match tokio::time::timeout(self.timeout, adapter.publish(payload, &token)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ExternalApiError::timeout(platform, self.timeout)),
        };

        match outcome {
            Ok(external_id) => {
                info!(platform = %platform, external_id = %external_id, "Published");
                PublishResult::success(platform, external_id, now_ts())
            }
            Err(e) => {
                if e.is_transient() {
                    warn!(platform = %platform, error = %e, body = ?e.body, "Publish failed (transient)");
                } else {
                    error!(platform = %platform, error = %e, body = ?e.body, "Publish failed");
                }
                PublishResult::failure(platform, e.to_string(), now_ts())
            }
        }
    }

    /// Publish to every platform concurrently, one result per platform
    ///
    /// Results come back in the set's canonical order.
    pub async fn publish_to_all(
        &self,
        platforms: &BTreeSet<Platform>,
        payload: &PublishPayload,
        owner_key: &str,
    ) -> Vec<PublishResult> {
        let attempts = platforms
            .iter()
            .map(|platform| self.publish_to_platform(*platform, payload, owner_key));
        join_all(attempts).await
    }
}
