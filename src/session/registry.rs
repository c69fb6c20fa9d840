use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{Result, SessionError};
use crate::models::{ClientMessageType, OutboundPayload, ServerMessage, ServerMessageType};

/// Registering under this name applies to every message kind.
pub const ALL_EVENTS: &str = "all";

/// Observes an incoming message. Receives its own copy of the message.
pub type EventHandler = Arc<dyn Fn(Value) -> anyhow::Result<()> + Send + Sync>;

/// May rewrite an outgoing message in place. The flag is true for audio.
pub type Middleware = Arc<dyn Fn(&mut OutboundPayload, bool) -> anyhow::Result<()> + Send + Sync>;

/// Event handlers per server message kind and middleware per client message
/// kind, each list in registration order.
#[derive(Clone)]
pub struct ExtensionRegistry {
    handlers: HashMap<ServerMessageType, Vec<EventHandler>>,
    middlewares: HashMap<ClientMessageType, Vec<Middleware>>,
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self {
            handlers: ServerMessageType::ALL
                .into_iter()
                .map(|kind| (kind, Vec::new()))
                .collect(),
            middlewares: ClientMessageType::ALL
                .into_iter()
                .map(|kind| (kind, Vec::new()))
                .collect(),
        }
    }
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers: usize = self.handlers.values().map(Vec::len).sum();
        let middlewares: usize = self.middlewares.values().map(Vec::len).sum();
        f.debug_struct("ExtensionRegistry")
            .field("handlers", &handlers)
            .field("middlewares", &middlewares)
            .finish()
    }
}

/// Kinds selected by `event`: all of them for [`ALL_EVENTS`], else exactly one.
fn selected_kinds<K>(event: &str, all: &[K]) -> Result<Vec<K>>
where
    K: Copy + FromStr<Err = SessionError>,
{
    if event == ALL_EVENTS {
        Ok(all.to_vec())
    } else {
        Ok(vec![event.parse()?])
    }
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler for server messages of kind `event`, or for every kind
    /// when `event` is `"all"`.
    pub fn add_event_handler<F>(&mut self, event: &str, handler: F) -> Result<()>
    where
        F: Fn(Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let kinds = selected_kinds(event, &ServerMessageType::ALL)?;
        let handler: EventHandler = Arc::new(handler);
        for kind in kinds {
            self.handlers.entry(kind).or_default().push(Arc::clone(&handler));
        }
        Ok(())
    }

    /// Add a middleware for client messages of kind `event`, or for every kind
    /// when `event` is `"all"`.
    pub fn add_middleware<F>(&mut self, event: &str, middleware: F) -> Result<()>
    where
        F: Fn(&mut OutboundPayload, bool) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let kinds = selected_kinds(event, &ClientMessageType::ALL)?;
        let middleware: Middleware = Arc::new(middleware);
        for kind in kinds {
            self.middlewares
                .entry(kind)
                .or_default()
                .push(Arc::clone(&middleware));
        }
        Ok(())
    }

    /// Call every handler registered for the message's kind, each with its own
    /// deep copy. The first failure stops dispatch and is returned.
    pub fn dispatch(&self, message: &ServerMessage) -> Result<()> {
        if let Some(handlers) = self.handlers.get(&message.kind) {
            for handler in handlers {
                handler(message.body.clone()).map_err(SessionError::Handler)?;
            }
        }
        Ok(())
    }

    /// Run every middleware registered for `kind` over `payload`, in order.
    pub fn apply_middleware(&self, kind: ClientMessageType, payload: &mut OutboundPayload) -> Result<()> {
        let is_binary = payload.is_binary();
        if let Some(middlewares) = self.middlewares.get(&kind) {
            for middleware in middlewares {
                middleware(payload, is_binary).map_err(SessionError::Middleware)?;
            }
        }
        Ok(())
    }

    pub fn handler_count(&self, kind: ServerMessageType) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }

    pub fn middleware_count(&self, kind: ClientMessageType) -> usize {
        self.middlewares.get(&kind).map_or(0, Vec::len)
    }
}
