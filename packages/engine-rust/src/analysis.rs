//! Request analysis: classifies known request types against the handler
//! registry.
//!
//! Discovering candidate types is the host's job. It lists them in a
//! [`RequestCatalog`]; analysis only resolves each one's handler binding and
//! groups the results by module path.

use std::any::{type_name, TypeId};
use std::collections::BTreeMap;

use courier_core::names::short_type_name;
use courier_core::{MessageInfo, Request, RequestKind};
use serde::{Deserialize, Serialize};

use crate::handler::{HandlerRegistry, HandlerStatus};

#[derive(Debug, Clone)]
struct CatalogEntry {
    info: MessageInfo,
    kind: RequestKind,
    /// `None` for `()`.
    response_type: Option<&'static str>,
}

/// Request types known to the host.
#[derive(Debug, Clone, Default)]
pub struct RequestCatalog {
    entries: Vec<CatalogEntry>,
}

impl RequestCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `R`. Adding a type twice keeps one entry.
    pub fn add<R: Request>(&mut self) -> &mut Self {
        let info = MessageInfo::of_request::<R>();
        if self.entries.iter().all(|e| e.info.type_id != info.type_id) {
            let response_type = (TypeId::of::<R::Response>() != TypeId::of::<()>())
                .then(type_name::<R::Response>);
            self.entries.push(CatalogEntry {
                info,
                kind: R::KIND,
                response_type,
            });
        }
        self
    }

    #[must_use]
    pub fn with<R: Request>(mut self) -> Self {
        self.add::<R>();
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every cataloged query with its handler status.
    #[must_use]
    pub fn analyze_queries(&self, handlers: &HandlerRegistry) -> AnalysisReport {
        self.analyze(RequestKind::Query, handlers)
    }

    /// Every cataloged command with its handler status.
    #[must_use]
    pub fn analyze_commands(&self, handlers: &HandlerRegistry) -> AnalysisReport {
        self.analyze(RequestKind::Command, handlers)
    }

    fn analyze(&self, kind: RequestKind, handlers: &HandlerRegistry) -> AnalysisReport {
        let mut modules: BTreeMap<String, Vec<RequestAnalysis>> = BTreeMap::new();
        for entry in self.entries.iter().filter(|e| e.kind == kind) {
            let binding = handlers.resolve(entry.info.type_id);
            let response_type = entry.response_type.map(short_type_name);
            let contract = match (kind, &response_type) {
                (RequestKind::Query, Some(response)) => format!("Query<{response}>"),
                (RequestKind::Query, None) => "Query".to_string(),
                (RequestKind::Command, Some(response)) => format!("Command<{response}>"),
                (RequestKind::Command, None) => "Command".to_string(),
            };
            modules
                .entry(entry.info.module_path().to_string())
                .or_default()
                .push(RequestAnalysis {
                    class_name: entry.info.short_name(),
                    full_name: entry.info.type_name.to_string(),
                    response_type,
                    contract,
                    status: binding.status(),
                    handlers: binding.handler_names(),
                });
        }
        for requests in modules.values_mut() {
            requests.sort_by(|a, b| a.class_name.cmp(&b.class_name));
        }
        AnalysisReport { kind, modules }
    }
}

/// One analysed request type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestAnalysis {
    pub class_name: String,
    pub full_name: String,
    /// Declared response type; `None` means the request returns nothing.
    pub response_type: Option<String>,
    /// Contract the type implements, e.g. `Query<u64>` or `Command`.
    pub contract: String,
    pub status: HandlerStatus,
    pub handlers: Vec<String>,
}

/// Analysis of one request kind, grouped by module path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub kind: RequestKind,
    pub modules: BTreeMap<String, Vec<RequestAnalysis>>,
}

impl AnalysisReport {
    #[must_use]
    pub fn total(&self) -> usize {
        self.modules.values().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RequestAnalysis> {
        self.modules.values().flatten()
    }

    /// Requests that cannot be dispatched as registered.
    pub fn misconfigured(&self) -> impl Iterator<Item = &RequestAnalysis> {
        self.iter().filter(|r| r.status != HandlerStatus::Single)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
