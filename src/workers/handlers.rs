//! Job handlers executed by the local worker pool.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::WorkerError;

/// Domain-specific computation for one handler name.
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, payload: &Value) -> Result<Value, WorkerError>;
}

/// Handlers keyed by name.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the bundled text handlers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ReverseText));
        registry.register(Arc::new(ToCaps));
        registry
    }

    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        let name = handler.name().to_string();
        tracing::debug!("Registered handler: {}", name);
        self.handlers.insert(name, handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }
}

fn text_field(handler: &str, payload: &Value) -> Result<String, WorkerError> {
    payload
        .get("text")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| WorkerError::Failed {
            handler: handler.to_string(),
            reason: "payload has no 'text' field".to_string(),
        })
}

/// Reverses the `text` field.
pub struct ReverseText;

#[async_trait]
impl JobHandler for ReverseText {
    fn name(&self) -> &str {
        "reverse_text"
    }

    async fn run(&self, payload: &Value) -> Result<Value, WorkerError> {
        let text = text_field(self.name(), payload)?;
        let reversed: String = text.chars().rev().collect();
        Ok(json!({"task": self.name(), "original": text, "result": reversed}))
    }
}

/// Upper-cases the `text` field.
pub struct ToCaps;

#[async_trait]
impl JobHandler for ToCaps {
    fn name(&self) -> &str {
        "to_caps"
    }

    async fn run(&self, payload: &Value) -> Result<Value, WorkerError> {
        let text = text_field(self.name(), payload)?;
        let upper = text.to_uppercase();
        Ok(json!({"task": self.name(), "original": text, "result": upper}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builtins_transform_text() {
        let registry = HandlerRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["reverse_text", "to_caps"]);

        let payload = json!({"task": "reverse_text", "text": "abc"});
        let out = registry.get("reverse_text").unwrap().run(&payload).await.unwrap();
        assert_eq!(out["result"], "cba");
        assert_eq!(out["original"], "abc");

        let out = registry
            .get("to_caps")
            .unwrap()
            .run(&json!({"text": "hello"}))
            .await
            .unwrap();
        assert_eq!(out["result"], "HELLO");
    }

    #[tokio::test]
    async fn missing_text_fails() {
        let err = ToCaps.run(&json!({"task": "to_caps"})).await.unwrap_err();
        assert!(err.to_string().contains("no 'text' field"));
    }
}
