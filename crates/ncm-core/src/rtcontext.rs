// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runtime context: the hierarchical handle store underneath an AppContext.
//!
//! A runtime context is a subtree of the [`ContextDb`] rooted at
//! `/context/<id>/`. Every node is addressed by a [`Handle`], a structured path
//! of segments that renders to the store key:
//!
//! ```text
//! /context/<id>/                                        root
//! /context/<id>/meta/                                   composite app meta
//! /context/<id>/status/                                 AppContext status
//! /context/<id>/app/<app>/                              app
//! /context/<id>/app/instruction/order/                  app instruction
//! /context/<id>/app/<app>/cluster/<p+c>/                cluster
//! /context/<id>/app/<app>/cluster/<p+c>/meta/           cluster meta group
//! /context/<id>/app/<app>/cluster/<p+c>/resource/<n+k>/ resource
//! /context/<id>/app/<app>/cluster/<p+c>/resource/instruction/order/
//! ```
//!
//! Names are validated so that rendering and parsing are exact inverses:
//! a name may not be empty, contain `/`, or equal the reserved word `instruction`.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::contextdb::ContextDb;
use crate::error::{CoreError, Result};

/// Key prefix shared by every runtime context.
pub const CONTEXT_PREFIX: &str = "/context/";

/// Reserved token separating a level from its instructions.
pub const INSTRUCTION: &str = "instruction";

/// Levels whose segments carry a name (`<level>/<name>/`).
pub const NAMED_LEVELS: [&str; 4] = ["app", "cluster", "resource", "subresource"];

/// One step of a handle path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    /// A named node such as `app/<name>/` or `resource/<name>/`.
    Level {
        /// Level kind, one of [`NAMED_LEVELS`].
        level: String,
        /// Node name.
        name: String,
    },
    /// A single-token node such as `meta/` or `status/`.
    Leaf(String),
    /// An instruction node `<level>/instruction/<kind>/`.
    Instruction {
        /// Level the instruction applies to.
        level: String,
        /// Instruction kind (`order`, `dependency`).
        kind: String,
    },
}

impl Segment {
    fn render(&self, out: &mut String) {
        match self {
            Segment::Level { level, name } => {
                out.push_str(level);
                out.push('/');
                out.push_str(name);
                out.push('/');
            }
            Segment::Leaf(level) => {
                out.push_str(level);
                out.push('/');
            }
            Segment::Instruction { level, kind } => {
                out.push_str(level);
                out.push('/');
                out.push_str(INSTRUCTION);
                out.push('/');
                out.push_str(kind);
                out.push('/');
            }
        }
    }
}

/// Structured address of a node inside one runtime context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle {
    context_id: String,
    segments: Vec<Segment>,
}

impl Handle {
    /// The root handle of context `context_id`.
    pub fn root(context_id: impl Into<String>) -> Self {
        Self {
            context_id: context_id.into(),
            segments: Vec::new(),
        }
    }

    /// Parse a store key back into a handle.
    pub fn parse(key: &str) -> Result<Self> {
        let invalid = |reason: &str| CoreError::InvalidHandle {
            handle: key.to_string(),
            reason: reason.to_string(),
        };

        let rest = key
            .strip_prefix(CONTEXT_PREFIX)
            .ok_or_else(|| invalid("missing /context/ prefix"))?;
        let rest = rest
            .strip_suffix('/')
            .ok_or_else(|| invalid("missing trailing '/'"))?;

        let mut tokens = rest.split('/');
        let context_id = tokens
            .next()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| invalid("empty context id"))?;
        let tokens: Vec<&str> = tokens.collect();

        let mut segments = Vec::new();
        let mut i = 0;
        while i < tokens.len() {
            let token = tokens[i];
            if token.is_empty() {
                return Err(invalid("empty path segment"));
            }
            let named = NAMED_LEVELS.contains(&token);
            if named && tokens.get(i + 1) == Some(&INSTRUCTION) {
                let kind = tokens
                    .get(i + 2)
                    .filter(|k| !k.is_empty())
                    .ok_or_else(|| invalid("instruction without a type"))?;
                segments.push(Segment::Instruction {
                    level: token.to_string(),
                    kind: kind.to_string(),
                });
                i += 3;
            } else if named && i + 1 < tokens.len() {
                let name = tokens[i + 1];
                if name.is_empty() {
                    return Err(invalid("empty level name"));
                }
                segments.push(Segment::Level {
                    level: token.to_string(),
                    name: name.to_string(),
                });
                i += 2;
            } else {
                segments.push(Segment::Leaf(token.to_string()));
                i += 1;
            }
        }

        Ok(Self {
            context_id: context_id.to_string(),
            segments,
        })
    }

    /// The context id this handle belongs to.
    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    /// Path segments below the root.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// True for the context root.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// The last segment, `None` for the root.
    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    /// Name of the last segment when it is a named level of kind `level`.
    pub fn name_at(&self, level: &str) -> Option<&str> {
        match self.segments.last() {
            Some(Segment::Level { level: l, name }) if l == level => Some(name),
            _ => None,
        }
    }

    /// Child handle for a named level.
    pub fn child(&self, level: &str, name: &str) -> Self {
        self.with(Segment::Level {
            level: level.to_string(),
            name: name.to_string(),
        })
    }

    /// Child handle for a single-token level.
    pub fn leaf(&self, level: &str) -> Self {
        self.with(Segment::Leaf(level.to_string()))
    }

    /// Child handle for an instruction.
    pub fn instruction(&self, level: &str, kind: &str) -> Self {
        self.with(Segment::Instruction {
            level: level.to_string(),
            kind: kind.to_string(),
        })
    }

    fn with(&self, segment: Segment) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self {
            context_id: self.context_id.clone(),
            segments,
        }
    }

    /// True when `self` is `ancestor` or lies beneath it.
    pub fn starts_with(&self, ancestor: &Handle) -> bool {
        self.context_id == ancestor.context_id && self.segments.starts_with(&ancestor.segments)
    }

    /// True when `self` lies strictly beneath `ancestor`.
    pub fn is_descendant_of(&self, ancestor: &Handle) -> bool {
        self.starts_with(ancestor) && self.segments.len() > ancestor.segments.len()
    }

    /// Segments of `self` below `ancestor`, `None` if `ancestor` is not a prefix.
    pub fn relative_to(&self, ancestor: &Handle) -> Option<&[Segment]> {
        if self.starts_with(ancestor) {
            Some(&self.segments[ancestor.segments.len()..])
        } else {
            None
        }
    }

    /// True when `self` is a resource directly under `cluster`, i.e. the path
    /// below the cluster is exactly `resource/<name>+<kind>/`.
    pub fn is_resource_of(&self, cluster: &Handle) -> bool {
        match self.relative_to(cluster) {
            Some([Segment::Level { level, name }]) => {
                level == "resource" && name.split('+').count() == 2
            }
            _ => false,
        }
    }

    /// Render the store key.
    pub fn key(&self) -> String {
        let mut out = String::with_capacity(32 + self.segments.len() * 24);
        out.push_str(CONTEXT_PREFIX);
        out.push_str(&self.context_id);
        out.push('/');
        for segment in &self.segments {
            segment.render(&mut out);
        }
        out
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Validate a level or node name so that the rendered key parses back unambiguously.
pub fn validate_name(field: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CoreError::validation(field, "must not be empty"));
    }
    if name.contains('/') {
        return Err(CoreError::validation(field, "must not contain '/'"));
    }
    if name == INSTRUCTION {
        return Err(CoreError::validation(
            field,
            "'instruction' is a reserved name",
        ));
    }
    Ok(())
}

/// Handle store bound to one context id.
///
/// `RunTimeContext` is cheap to construct; every call goes straight to the
/// [`ContextDb`] without caching, so concurrent readers always see the latest
/// store state.
#[derive(Clone)]
pub struct RunTimeContext {
    db: Arc<dyn ContextDb>,
    cid: Option<String>,
}

impl fmt::Debug for RunTimeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunTimeContext")
            .field("cid", &self.cid)
            .finish_non_exhaustive()
    }
}

impl RunTimeContext {
    /// Create an unbound runtime context over `db`.
    pub fn new(db: Arc<dyn ContextDb>) -> Self {
        Self { db, cid: None }
    }

    /// The bound context id, if any.
    pub fn context_id(&self) -> Option<&str> {
        self.cid.as_deref()
    }

    /// Assign a fresh context id. Nothing is written until [`create`](Self::create).
    pub fn init(&mut self) -> Result<String> {
        if let Some(cid) = &self.cid {
            return Err(CoreError::InvalidHandle {
                handle: Handle::root(cid.clone()).key(),
                reason: "context already initialized".to_string(),
            });
        }
        let id = Uuid::new_v4().simple().to_string();
        self.cid = Some(id.clone());
        Ok(id)
    }

    /// Bind to an existing context id and return its root handle.
    pub async fn load(&mut self, id: &str) -> Result<Handle> {
        if id.is_empty() || id.contains('/') {
            return Err(CoreError::InvalidHandle {
                handle: id.to_string(),
                reason: "not a valid context id".to_string(),
            });
        }
        self.cid = Some(id.to_string());
        self.root().await
    }

    /// Write the root node of an initialized context.
    pub async fn create(&self) -> Result<Handle> {
        let root = self.bound_root()?;
        self.db
            .put(&root.key(), &Value::String(root.context_id().to_string()))
            .await?;
        debug!(context_id = %root.context_id(), "Runtime context created");
        Ok(root)
    }

    /// Resolve the root handle, failing if the root node does not exist.
    pub async fn root(&self) -> Result<Handle> {
        let root = self.bound_root()?;
        match self.db.get(&root.key()).await? {
            Some(Value::String(id)) if id == root.context_id() => Ok(root),
            Some(_) => Err(CoreError::InvalidHandle {
                handle: root.key(),
                reason: "root value does not match context id".to_string(),
            }),
            None => Err(CoreError::not_found("AppContext", root.context_id())),
        }
    }

    /// Store the composite app metadata at `<root>meta/`.
    pub async fn add_meta(&self, meta: &Value) -> Result<()> {
        let root = self.bound_root()?;
        self.db.put(&root.leaf("meta").key(), meta).await
    }

    /// Read the composite app metadata.
    pub async fn meta(&self) -> Result<Value> {
        let handle = self.bound_root()?.leaf("meta");
        self.db
            .get(&handle.key())
            .await?
            .ok_or_else(|| CoreError::HandleNotFound {
                handle: handle.key(),
                level: "meta".to_string(),
            })
    }

    /// Add a named level `<level>/<name>/` under `handle`.
    pub async fn add_level(&self, handle: &Handle, level: &str, name: &str) -> Result<Handle> {
        self.check(handle)?;
        if !NAMED_LEVELS.contains(&level) {
            return Err(CoreError::validation(
                "level",
                format!("'{}' is not a named level", level),
            ));
        }
        validate_name(level, name)?;
        let child = handle.child(level, name);
        self.db
            .put(&child.key(), &Value::String(name.to_string()))
            .await?;
        Ok(child)
    }

    /// Add a single-token level `<level>/` under `handle` holding `value`.
    pub async fn add_one_level(&self, handle: &Handle, level: &str, value: &Value) -> Result<Handle> {
        self.check(handle)?;
        validate_name("level", level)?;
        if NAMED_LEVELS.contains(&level) {
            return Err(CoreError::validation(
                "level",
                format!("'{}' is a named level", level),
            ));
        }
        if value.is_null() {
            return Err(CoreError::validation("value", "must not be empty"));
        }
        let child = handle.leaf(level);
        self.db.put(&child.key(), value).await?;
        Ok(child)
    }

    /// Add a resource `resource/<name>/` under `handle`.
    pub async fn add_resource(&self, handle: &Handle, name: &str, value: &Value) -> Result<Handle> {
        self.check(handle)?;
        validate_name("resource", name)?;
        if value.is_null() {
            return Err(CoreError::validation("value", "resource value must not be empty"));
        }
        let child = handle.child("resource", name);
        self.db.put(&child.key(), value).await?;
        Ok(child)
    }

    /// Add an instruction `<level>/instruction/<kind>/` under `handle`.
    pub async fn add_instruction(
        &self,
        handle: &Handle,
        level: &str,
        kind: &str,
        value: &Value,
    ) -> Result<Handle> {
        self.check(handle)?;
        validate_name("level", level)?;
        validate_name("instruction type", kind)?;
        if value.is_null() {
            return Err(CoreError::validation("value", "instruction value must not be empty"));
        }
        let child = handle.instruction(level, kind);
        self.db.put(&child.key(), value).await?;
        Ok(child)
    }

    /// Delete exactly the node at `handle`, leaving its children.
    pub async fn delete_pair(&self, handle: &Handle) -> Result<()> {
        self.check(handle)?;
        self.db.delete(&handle.key()).await
    }

    /// Delete the node at `handle` and everything beneath it.
    pub async fn delete_prefix(&self, handle: &Handle) -> Result<u64> {
        self.check(handle)?;
        let removed = self.db.delete_all(&handle.key()).await?;
        debug!(handle = %handle, removed, "Deleted runtime context prefix");
        Ok(removed)
    }

    /// Every handle at or beneath `handle`.
    pub async fn handles(&self, handle: &Handle) -> Result<Vec<Handle>> {
        self.check(handle)?;
        self.db
            .get_all_keys(&handle.key())
            .await?
            .iter()
            .map(|key| Handle::parse(key))
            .collect()
    }

    /// True when a node exists at `handle`.
    pub async fn exists(&self, handle: &Handle) -> Result<bool> {
        self.check(handle)?;
        Ok(self.db.get(&handle.key()).await?.is_some())
    }

    /// Raw JSON value at `handle`.
    pub async fn raw_value(&self, handle: &Handle) -> Result<Value> {
        self.check(handle)?;
        self.db
            .get(&handle.key())
            .await?
            .ok_or_else(|| CoreError::HandleNotFound {
                handle: handle.key(),
                level: segment_label(handle),
            })
    }

    /// Decode the value at `handle`.
    pub async fn value<T: DeserializeOwned>(&self, handle: &Handle) -> Result<T> {
        let raw = self.raw_value(handle).await?;
        serde_json::from_value(raw).map_err(|e| CoreError::serialization(handle.key(), e))
    }

    /// Overwrite the value at `handle`.
    pub async fn update_value(&self, handle: &Handle, value: &Value) -> Result<()> {
        self.check(handle)?;
        self.db.put(&handle.key(), value).await
    }

    fn bound_root(&self) -> Result<Handle> {
        self.cid
            .as_ref()
            .map(|cid| Handle::root(cid.clone()))
            .ok_or_else(|| CoreError::InvalidHandle {
                handle: String::new(),
                reason: "context not initialized".to_string(),
            })
    }

    fn check(&self, handle: &Handle) -> Result<()> {
        match &self.cid {
            Some(cid) if cid == handle.context_id() => Ok(()),
            _ => Err(CoreError::InvalidHandle {
                handle: handle.key(),
                reason: "not a handle of this run time context".to_string(),
            }),
        }
    }
}

fn segment_label(handle: &Handle) -> String {
    match handle.last() {
        None => "root".to_string(),
        Some(Segment::Level { level, .. }) => level.clone(),
        Some(Segment::Leaf(level)) => level.clone(),
        Some(Segment::Instruction { kind, .. }) => kind.clone(),
    }
}
