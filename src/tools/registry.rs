//! Tool registration and the dispatch boundary.
//!
//! [`ToolRegistry`] collects tools at startup and rejects duplicate names.
//! [`ToolRegistry::build`] freezes it into a [`Dispatcher`]: an immutable,
//! cheaply clonable name → tool map that can serve any number of concurrent
//! invocations without locking.
//!
//! # Isolation
//!
//! Each invocation runs under a deadline (`dispatch.timeout_secs`) and
//! inside `catch_unwind`. A panicking tool yields an `internal failure`
//! envelope; the dispatcher and every other in-flight call are unaffected.
//! Dropping the future returned by [`Dispatcher::dispatch`] cancels the
//! whole invocation, including any pending transport retry.

use anyhow::{bail, Result};
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

use super::builtin;
use super::params::validate_params;
use super::{Tool, ToolContext, ToolDefinition, ToolInvocationRequest, ToolOutput, ToolResult};
use crate::error::{GatewayError, GatewayResult};

struct Registered {
    definition: ToolDefinition,
    tool: Arc<dyn Tool>,
}

/// Mutable registry used during startup.
///
/// # Example
///
/// ```rust
/// use vault_gateway::tools::ToolRegistry;
///
/// let registry = ToolRegistry::with_builtins();
/// assert!(registry.contains("search"));
/// ```
pub struct ToolRegistry {
    tools: Vec<Registered>,
}

impl ToolRegistry {
    /// Create an empty tool registry.
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Create a registry pre-loaded with every built-in tool.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for tool in builtin::all() {
            // built-in names are distinct
            if let Err(e) = registry.register(tool) {
                tracing::error!(error = %e, "failed to register built-in tool");
            }
        }
        registry
    }

    /// Register a tool. Fails if the name is empty, malformed, or taken.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let definition = tool.definition();
        let name = definition.name.as_str();
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            bail!(
                "invalid tool name '{}': use lowercase letters, digits, and underscores",
                name
            );
        }
        if self.contains(name) {
            bail!("tool '{}' is already registered", name);
        }
        self.tools.push(Registered { definition, tool });
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.definition.name == name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Freeze into a [`Dispatcher`].
    pub fn build(self, ctx: Arc<ToolContext>, timeout: Duration) -> Dispatcher {
        let mut catalog: Vec<ToolDefinition> =
            self.tools.iter().map(|t| t.definition.clone()).collect();
        catalog.sort_by(|a, b| a.name.cmp(&b.name));

        let tools = self
            .tools
            .into_iter()
            .map(|t| (t.definition.name.clone(), t))
            .collect();

        Dispatcher {
            inner: Arc::new(Inner {
                tools,
                catalog,
                ctx,
                timeout,
            }),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

struct Inner {
    tools: HashMap<String, Registered>,
    catalog: Vec<ToolDefinition>,
    ctx: Arc<ToolContext>,
    timeout: Duration,
}

/// Immutable name → tool map plus the shared [`ToolContext`].
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    /// Every registered definition, ordered by name.
    pub fn catalog(&self) -> &[ToolDefinition] {
        &self.inner.catalog
    }

    pub fn definition(&self, name: &str) -> Option<&ToolDefinition> {
        self.inner.tools.get(name).map(|t| &t.definition)
    }

    pub fn context(&self) -> &ToolContext {
        &self.inner.ctx
    }

    /// Run one invocation and wrap the outcome in a [`ToolResult`].
    ///
    /// Never panics and never returns an error: every failure becomes a
    /// `success: false` envelope.
    pub async fn dispatch(&self, request: ToolInvocationRequest) -> ToolResult {
        let invocation_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "dispatch",
            tool = %request.tool_name,
            invocation_id = %invocation_id,
        );

        async move {
            let started = tokio::time::Instant::now();
            let outcome = self.run(&request).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;
            match &outcome {
                Ok(_) => tracing::info!(elapsed_ms, "tool succeeded"),
                Err(e) => tracing::warn!(
                    elapsed_ms,
                    category = e.category(),
                    error = %e,
                    "tool failed"
                ),
            }
            ToolResult::from(outcome)
        }
        .instrument(span)
        .await
    }

    async fn run(&self, request: &ToolInvocationRequest) -> GatewayResult<ToolOutput> {
        let name = request.tool_name.as_str();
        let registered = self
            .inner
            .tools
            .get(name)
            .ok_or_else(|| GatewayError::ToolNotFound(name.to_string()))?;

        let params = validate_params(&registered.definition, &request.parameters)?;
        let execution = registered.tool.execute(params, &self.inner.ctx);

        match tokio::time::timeout(self.inner.timeout, AssertUnwindSafe(execution).catch_unwind())
            .await
        {
            Err(_) => Err(GatewayError::Unavailable(format!(
                "tool '{}' did not finish within {}s",
                name,
                self.inner.timeout.as_secs()
            ))),
            Ok(Err(panic)) => Err(GatewayError::InternalFailure(format!(
                "tool '{}' panicked: {}",
                name,
                panic_message(panic.as_ref())
            ))),
            Ok(Ok(result)) => result,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}
