//! Insertion-ordered registries for tools, resources and prompts
//!
//! Each registry sits behind a reader-writer lock so registration can happen
//! while requests are served. Entries are handed out as `Arc`s; no lock is held
//! while a handler runs.

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use crate::handler::{CompleteFn, PromptFn, ResourceFn, ToolHandler};
use crate::schema::InputFields;
use crate::uri_template::{TemplateError, UriPattern};

struct RegistryInner<T> {
    entries: Vec<(String, Arc<T>)>,
    index: HashMap<String, usize>,
}

pub struct Registry<T> {
    inner: RwLock<RegistryInner<T>>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                entries: Vec::new(),
                index: HashMap::new(),
            }),
        }
    }
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last write wins; a replaced entry keeps its listing position. Returns
    /// `true` when an existing entry was replaced.
    pub fn insert(&self, key: impl Into<String>, entry: T) -> bool {
        let key = key.into();
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let entry = Arc::new(entry);

        if let Some(&position) = inner.index.get(&key) {
            inner.entries[position].1 = entry;
            return true;
        }

        let position = inner.entries.len();
        inner.index.insert(key.clone(), position);
        inner.entries.push((key, entry));
        false
    }

    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .index
            .get(key)
            .map(|&position| Arc::clone(&inner.entries[position].1))
    }

    /// Entries in insertion order.
    pub fn snapshot(&self) -> Vec<(String, Arc<T>)> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .clone()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Default)]
pub struct ToolOptions {
    pub description: String,
    pub input: Option<InputFields>,
    /// Informational `total` attached to progress notifications.
    pub progress_total: Option<u64>,
}

impl ToolOptions {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn input(mut self, input: InputFields) -> Self {
        self.input = Some(input);
        self
    }

    pub fn progress_total(mut self, total: u64) -> Self {
        self.progress_total = Some(total);
        self
    }
}

pub struct ToolEntry {
    pub options: ToolOptions,
    pub handler: ToolHandler,
}

#[derive(Clone, Default)]
pub struct ResourceOptions {
    pub name: Option<String>,
    pub description: String,
    pub mime_type: Option<String>,
    pub input: Option<InputFields>,
    pub complete: Option<CompleteFn>,
}

impl ResourceOptions {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn input(mut self, input: InputFields) -> Self {
        self.input = Some(input);
        self
    }

    pub fn complete<F>(mut self, complete: F) -> Self
    where
        F: Fn(&str, &str) -> Vec<String> + Send + Sync + 'static,
    {
        self.complete = Some(Arc::new(complete));
        self
    }
}

pub struct ResourceEntry {
    pub pattern: UriPattern,
    pub options: ResourceOptions,
    pub handler: ResourceFn,
}

impl ResourceEntry {
    /// Compiles the key up front so malformed templates fail at registration.
    pub fn new(
        uri: &str,
        options: ResourceOptions,
        handler: ResourceFn,
    ) -> Result<Self, TemplateError> {
        Ok(Self {
            pattern: UriPattern::parse(uri)?,
            options,
            handler,
        })
    }

    pub fn display_name(&self) -> &str {
        self.options
            .name
            .as_deref()
            .unwrap_or_else(|| self.pattern.source())
    }
}

#[derive(Clone, Default)]
pub struct PromptOptions {
    pub description: String,
    pub input: Option<InputFields>,
    pub complete: Option<CompleteFn>,
}

impl PromptOptions {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn input(mut self, input: InputFields) -> Self {
        self.input = Some(input);
        self
    }

    pub fn complete<F>(mut self, complete: F) -> Self
    where
        F: Fn(&str, &str) -> Vec<String> + Send + Sync + 'static,
    {
        self.complete = Some(Arc::new(complete));
        self
    }
}

pub struct PromptEntry {
    pub options: PromptOptions,
    pub handler: PromptFn,
}

#[derive(Default)]
pub struct Registries {
    pub tools: Registry<ToolEntry>,
    pub resources: Registry<ResourceEntry>,
    pub prompts: Registry<PromptEntry>,
}
