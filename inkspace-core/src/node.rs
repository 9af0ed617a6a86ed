//! Document nodes: the workspace → folder → file hierarchy.
//!
//! Ownership is strictly hierarchical. A workspace owns its folders, a
//! folder owns its files; there is no cross-ownership and deleting a parent
//! cascades to every descendant (enforced by the store, modeled here).
//!
//! Trash and favorite state are explicit `Option<Marker>` values carrying a
//! structured actor id plus note, rather than an "empty string means unset"
//! sentinel: `None` is unambiguously "no event occurred".

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The three node kinds, top-down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Workspace,
    Folder,
    File,
}

impl NodeKind {
    /// The kind a parent of this kind must have, if any.
    pub fn parent_kind(&self) -> Option<NodeKind> {
        match self {
            NodeKind::Workspace => None,
            NodeKind::Folder => Some(NodeKind::Workspace),
            NodeKind::File => Some(NodeKind::Folder),
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::Workspace => write!(f, "workspace"),
            NodeKind::Folder => write!(f, "folder"),
            NodeKind::File => write!(f, "file"),
        }
    }
}

/// Actor-tagged audit marker for trash / favorite state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    /// Who performed the action (e.g. `alice@x`).
    pub actor_id: String,
    /// What happened (e.g. `Deleted`).
    pub note: String,
}

impl Marker {
    pub fn new(actor_id: impl Into<String>, note: impl Into<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
            note: note.into(),
        }
    }

    /// Human-readable audit string, "note by actor".
    pub fn label(&self) -> String {
        format!("{} by {}", self.note, self.actor_id)
    }
}

/// A node in the workspace hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentNode {
    pub id: Uuid,
    pub kind: NodeKind,
    /// `None` iff `kind` is `Workspace`.
    pub parent_id: Option<Uuid>,
    pub title: String,
    /// JSON-serialized delta (the stored rich-text form).
    pub content: String,
    pub icon_glyph: String,
    pub banner_ref: Option<String>,
    pub trash: Option<Marker>,
    pub favorite: Option<Marker>,
    /// Seconds since epoch; children list in ascending order of this.
    pub created_at: u64,
}

impl DocumentNode {
    /// Build a node with empty content and no markers.
    pub fn new(
        kind: NodeKind,
        parent_id: Option<Uuid>,
        title: impl Into<String>,
        created_at: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            parent_id,
            title: title.into(),
            content: String::new(),
            icon_glyph: String::new(),
            banner_ref: None,
            trash: None,
            favorite: None,
            created_at,
        }
    }

    pub fn is_trashed(&self) -> bool {
        self.trash.is_some()
    }

    pub fn is_favorite(&self) -> bool {
        self.favorite.is_some()
    }

    /// Structural validation: id, title, and parent rules.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_nil() {
            return Err(ValidationError::InvalidId(self.id.to_string()));
        }
        if self.title.trim().is_empty() {
            return Err(ValidationError::MissingTitle);
        }
        match (self.kind.parent_kind(), self.parent_id) {
            (None, Some(_)) => Err(ValidationError::InvalidParent(self.kind)),
            (Some(_), None) => Err(ValidationError::InvalidParent(self.kind)),
            _ => Ok(()),
        }
    }
}

/// Merge-update for a node. Fields left `None` are untouched;
/// clearable fields use a second `Option` level (`Some(None)` clears).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodePatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub icon_glyph: Option<String>,
    pub banner_ref: Option<Option<String>>,
    pub trash: Option<Option<Marker>>,
    pub favorite: Option<Option<Marker>>,
}

impl NodePatch {
    pub fn is_empty(&self) -> bool {
        self == &NodePatch::default()
    }

    /// Apply the patch onto a node in place.
    pub fn apply_to(&self, node: &mut DocumentNode) {
        if let Some(title) = &self.title {
            node.title = title.clone();
        }
        if let Some(content) = &self.content {
            node.content = content.clone();
        }
        if let Some(glyph) = &self.icon_glyph {
            node.icon_glyph = glyph.clone();
        }
        if let Some(banner) = &self.banner_ref {
            node.banner_ref = banner.clone();
        }
        if let Some(trash) = &self.trash {
            node.trash = trash.clone();
        }
        if let Some(favorite) = &self.favorite {
            node.favorite = favorite.clone();
        }
    }

    /// Patch that moves a node to trash with an audit marker.
    pub fn trash_by(actor_id: impl Into<String>) -> Self {
        Self {
            trash: Some(Some(Marker::new(actor_id, "Deleted"))),
            ..Self::default()
        }
    }

    /// Patch that restores a node from trash.
    pub fn restore() -> Self {
        Self {
            trash: Some(None),
            ..Self::default()
        }
    }

    /// Patch that updates only the serialized content.
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }
}

/// A collaborator's display identity, resolved once on room join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorProfile {
    pub actor_id: String,
    pub display_label: String,
    pub avatar_ref: Option<String>,
}

impl ActorProfile {
    pub fn new(actor_id: impl Into<String>, display_label: impl Into<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
            display_label: display_label.into(),
            avatar_ref: None,
        }
    }
}

/// Node-level validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    MissingTitle,
    InvalidParent(NodeKind),
    InvalidId(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::MissingTitle => write!(f, "Node title must not be empty"),
            ValidationError::InvalidParent(kind) => {
                write!(f, "Invalid parent for {kind} node")
            }
            ValidationError::InvalidId(id) => write!(f, "Invalid node id: {id}"),
        }
    }
}

impl std::error::Error for ValidationError {}
