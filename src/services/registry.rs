//! Language → adapter registry
//!
//! Built once at the composition root and read-only afterwards.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::adapters::{self, BackendSpec, LanguageAdapter, LspAdapter, TsServerAdapter};
use super::session::LspSession;
use crate::events::EventSink;
use crate::infra::Launcher;
use crate::models::{BridgeConfig, LanguageId};

#[derive(Default)]
pub struct Registry {
    adapters: BTreeMap<LanguageId, Arc<dyn LanguageAdapter>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in adapters plus one JSON-RPC adapter per extra `[servers.<id>]`
    pub fn from_config(
        config: &BridgeConfig,
        sink: Arc<dyn EventSink>,
        launcher: Arc<dyn Launcher>,
    ) -> Self {
        let mut registry = Self::new();

        let lsp = |spec: BackendSpec| -> Arc<dyn LanguageAdapter> {
            let id = spec.language.as_str().to_string();
            let spec = spec.with_override(config.server(&id));
            let session = LspSession::new(
                spec.language.clone(),
                config.process_settings(&id),
                Arc::clone(&sink),
                Arc::clone(&launcher),
            )
            .with_initialization_options(
                config
                    .server(&id)
                    .and_then(|s| s.initialization_options.clone()),
            );
            Arc::new(LspAdapter::new(spec, session))
        };

        registry.register(lsp(adapters::go::gopls()));
        registry.register(lsp(adapters::python::pyright()));

        let typescript = LanguageId::TYPESCRIPT;
        registry.register(Arc::new(TsServerAdapter::new(
            adapters::typescript::tsserver().with_override(config.server(typescript.as_str())),
            config.process_settings(typescript.as_str()),
            Arc::clone(&sink),
            Arc::clone(&launcher),
        )));

        for (id, server) in &config.servers {
            let language = LanguageId::new(id.as_str());
            if registry.get(&language).is_some() {
                continue;
            }
            let Some(command) = &server.command else {
                tracing::warn!("[servers.{}] has no command; skipped", id);
                continue;
            };
            registry.register(lsp(BackendSpec::new(language, "custom", command.clone())));
        }

        registry
    }

    /// Register an adapter; a second adapter for the same language is ignored
    pub fn register(&mut self, adapter: Arc<dyn LanguageAdapter>) -> bool {
        let language = adapter.language().clone();
        if self.adapters.contains_key(&language) {
            tracing::warn!("Adapter for {} already registered; ignoring", language);
            return false;
        }
        tracing::debug!("Registered {} adapter", language);
        self.adapters.insert(language, adapter);
        true
    }

    pub fn get(&self, language: &LanguageId) -> Option<Arc<dyn LanguageAdapter>> {
        self.adapters.get(language).cloned()
    }

    pub fn all(&self) -> Vec<Arc<dyn LanguageAdapter>> {
        self.adapters.values().cloned().collect()
    }

    pub fn languages(&self) -> Vec<LanguageId> {
        self.adapters.keys().cloned().collect()
    }
}
