//! # Application State
//!
//! Shared state for the Axum application, passed to route handlers via the
//! `State` extractor. Everything here is either immutable or internally
//! synchronized; cloning is cheap.

use std::sync::Arc;

use gatehouse_core::Settings;
use gatehouse_crypto::HashError;

use crate::gate::AuthGate;
use crate::store::{InMemoryUserStore, UserStore};

#[derive(Clone, Debug)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub gate: Arc<AuthGate>,
}

impl AppState {
    /// State backed by a fresh in-memory user store.
    pub fn new(settings: Settings) -> Result<Self, HashError> {
        Self::with_store(settings, Arc::new(InMemoryUserStore::new()))
    }

    pub fn with_store(settings: Settings, store: Arc<dyn UserStore>) -> Result<Self, HashError> {
        let gate = AuthGate::new(&settings, store)?;
        Ok(Self {
            settings: Arc::new(settings),
            gate: Arc::new(gate),
        })
    }
}
