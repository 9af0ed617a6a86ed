//! Optimistic state tree: the client-resident mirror of the full
//! workspace → folder → file hierarchy.
//!
//! The UI renders exclusively from this tree; it is authoritative until the
//! store round-trips. Mutation happens only through the closed [`TreeAction`]
//! set, and every application returns a new tree — nothing is mutated in
//! place. Actions referencing ids that are not present are deliberate no-ops
//! (unchanged tree, no error): store fetches and realtime updates race, and
//! an update for a node that has not been loaded yet must not fault.
//!
//! The tree is reached only through an owned [`StateStore`]; there is no
//! ambient global state.

use crate::node::{DocumentNode, NodePatch};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A folder with its owned files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderEntry {
    pub node: DocumentNode,
    pub files: Vec<DocumentNode>,
}

impl FolderEntry {
    pub fn new(node: DocumentNode) -> Self {
        Self {
            node,
            files: Vec::new(),
        }
    }
}

/// A workspace with its owned folders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceEntry {
    pub node: DocumentNode,
    pub folders: Vec<FolderEntry>,
}

impl WorkspaceEntry {
    pub fn new(node: DocumentNode) -> Self {
        Self {
            node,
            folders: Vec::new(),
        }
    }
}

/// The closed set of tree mutations.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeAction {
    SetWorkspaces(Vec<WorkspaceEntry>),
    AddWorkspace(WorkspaceEntry),
    UpdateWorkspace {
        workspace_id: Uuid,
        patch: NodePatch,
    },
    DeleteWorkspace(Uuid),
    SetFolders {
        workspace_id: Uuid,
        folders: Vec<FolderEntry>,
    },
    AddFolder {
        workspace_id: Uuid,
        folder: FolderEntry,
    },
    UpdateFolder {
        workspace_id: Uuid,
        folder_id: Uuid,
        patch: NodePatch,
    },
    DeleteFolder {
        workspace_id: Uuid,
        folder_id: Uuid,
    },
    SetFiles {
        workspace_id: Uuid,
        folder_id: Uuid,
        files: Vec<DocumentNode>,
    },
    AddFile {
        workspace_id: Uuid,
        folder_id: Uuid,
        file: DocumentNode,
    },
    UpdateFile {
        workspace_id: Uuid,
        folder_id: Uuid,
        file_id: Uuid,
        patch: NodePatch,
    },
    DeleteFile {
        workspace_id: Uuid,
        folder_id: Uuid,
        file_id: Uuid,
    },
}

/// The full client-side hierarchy.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkspaceTree {
    pub workspaces: Vec<WorkspaceEntry>,
}

impl WorkspaceTree {
    pub fn new() -> Self {
        Self {
            workspaces: Vec::new(),
        }
    }

    /// Apply an action, producing a new tree.
    ///
    /// Missing ids make the action a no-op; duplicate adds are ignored.
    pub fn apply(&self, action: TreeAction) -> WorkspaceTree {
        let mut next = self.clone();
        match action {
            TreeAction::SetWorkspaces(workspaces) => {
                next.workspaces = workspaces;
            }
            TreeAction::AddWorkspace(entry) => {
                if !next.workspaces.iter().any(|w| w.node.id == entry.node.id) {
                    next.workspaces.push(entry);
                }
            }
            TreeAction::UpdateWorkspace {
                workspace_id,
                patch,
            } => {
                if let Some(ws) = next.workspace_mut(workspace_id) {
                    patch.apply_to(&mut ws.node);
                }
            }
            TreeAction::DeleteWorkspace(workspace_id) => {
                next.workspaces.retain(|w| w.node.id != workspace_id);
            }
            TreeAction::SetFolders {
                workspace_id,
                folders,
            } => {
                if let Some(ws) = next.workspace_mut(workspace_id) {
                    ws.folders = folders;
                }
            }
            TreeAction::AddFolder {
                workspace_id,
                folder,
            } => {
                if let Some(ws) = next.workspace_mut(workspace_id) {
                    if !ws.folders.iter().any(|f| f.node.id == folder.node.id) {
                        ws.folders.push(folder);
                    }
                }
            }
            TreeAction::UpdateFolder {
                workspace_id,
                folder_id,
                patch,
            } => {
                if let Some(folder) = next.folder_mut(workspace_id, folder_id) {
                    patch.apply_to(&mut folder.node);
                }
            }
            TreeAction::DeleteFolder {
                workspace_id,
                folder_id,
            } => {
                if let Some(ws) = next.workspace_mut(workspace_id) {
                    ws.folders.retain(|f| f.node.id != folder_id);
                }
            }
            TreeAction::SetFiles {
                workspace_id,
                folder_id,
                files,
            } => {
                if let Some(folder) = next.folder_mut(workspace_id, folder_id) {
                    folder.files = files;
                }
            }
            TreeAction::AddFile {
                workspace_id,
                folder_id,
                file,
            } => {
                if let Some(folder) = next.folder_mut(workspace_id, folder_id) {
                    if !folder.files.iter().any(|f| f.id == file.id) {
                        folder.files.push(file);
                    }
                }
            }
            TreeAction::UpdateFile {
                workspace_id,
                folder_id,
                file_id,
                patch,
            } => {
                if let Some(folder) = next.folder_mut(workspace_id, folder_id) {
                    if let Some(file) = folder.files.iter_mut().find(|f| f.id == file_id) {
                        patch.apply_to(file);
                    }
                }
            }
            TreeAction::DeleteFile {
                workspace_id,
                folder_id,
                file_id,
            } => {
                if let Some(folder) = next.folder_mut(workspace_id, folder_id) {
                    folder.files.retain(|f| f.id != file_id);
                }
            }
        }
        next
    }

    pub fn workspace(&self, workspace_id: Uuid) -> Option<&WorkspaceEntry> {
        self.workspaces.iter().find(|w| w.node.id == workspace_id)
    }

    pub fn folder(&self, workspace_id: Uuid, folder_id: Uuid) -> Option<&FolderEntry> {
        self.workspace(workspace_id)?
            .folders
            .iter()
            .find(|f| f.node.id == folder_id)
    }

    pub fn file(
        &self,
        workspace_id: Uuid,
        folder_id: Uuid,
        file_id: Uuid,
    ) -> Option<&DocumentNode> {
        self.folder(workspace_id, folder_id)?
            .files
            .iter()
            .find(|f| f.id == file_id)
    }

    fn workspace_mut(&mut self, workspace_id: Uuid) -> Option<&mut WorkspaceEntry> {
        self.workspaces
            .iter_mut()
            .find(|w| w.node.id == workspace_id)
    }

    fn folder_mut(&mut self, workspace_id: Uuid, folder_id: Uuid) -> Option<&mut FolderEntry> {
        self.workspace_mut(workspace_id)?
            .folders
            .iter_mut()
            .find(|f| f.node.id == folder_id)
    }
}

/// Explicitly owned holder of the tree.
///
/// Callers dispatch actions through a `&mut` reference they own; reads go
/// through [`StateStore::tree`]. Keeps mutation rights visible in the type
/// system instead of behind a process-global.
#[derive(Debug, Default)]
pub struct StateStore {
    tree: WorkspaceTree,
}

impl StateStore {
    pub fn new() -> Self {
        Self {
            tree: WorkspaceTree::new(),
        }
    }

    pub fn dispatch(&mut self, action: TreeAction) {
        log::trace!("dispatch {action:?}");
        self.tree = self.tree.apply(action);
    }

    pub fn tree(&self) -> &WorkspaceTree {
        &self.tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;

    fn workspace(title: &str) -> WorkspaceEntry {
        WorkspaceEntry::new(DocumentNode::new(NodeKind::Workspace, None, title, 1))
    }

    fn folder(parent: Uuid, title: &str) -> FolderEntry {
        FolderEntry::new(DocumentNode::new(NodeKind::Folder, Some(parent), title, 2))
    }

    fn file(parent: Uuid, title: &str) -> DocumentNode {
        DocumentNode::new(NodeKind::File, Some(parent), title, 3)
    }

    /// Tree with one workspace, one folder, one file; returns ids.
    fn seeded() -> (WorkspaceTree, Uuid, Uuid, Uuid) {
        let ws = workspace("W");
        let ws_id = ws.node.id;
        let fo = folder(ws_id, "F");
        let fo_id = fo.node.id;
        let fi = file(fo_id, "doc");
        let fi_id = fi.id;

        let tree = WorkspaceTree::new()
            .apply(TreeAction::AddWorkspace(ws))
            .apply(TreeAction::AddFolder {
                workspace_id: ws_id,
                folder: fo,
            })
            .apply(TreeAction::AddFile {
                workspace_id: ws_id,
                folder_id: fo_id,
                file: fi,
            });
        (tree, ws_id, fo_id, fi_id)
    }

    #[test]
    fn test_add_and_lookup() {
        let (tree, ws_id, fo_id, fi_id) = seeded();
        assert_eq!(tree.workspaces.len(), 1);
        assert!(tree.workspace(ws_id).is_some());
        assert!(tree.folder(ws_id, fo_id).is_some());
        assert_eq!(tree.file(ws_id, fo_id, fi_id).unwrap().title, "doc");
    }

    #[test]
    fn test_apply_returns_new_tree() {
        let (tree, ws_id, _, _) = seeded();
        let next = tree.apply(TreeAction::DeleteWorkspace(ws_id));
        assert!(next.workspaces.is_empty());
        // Original untouched.
        assert_eq!(tree.workspaces.len(), 1);
    }

    #[test]
    fn test_update_file() {
        let (tree, ws_id, fo_id, fi_id) = seeded();
        let next = tree.apply(TreeAction::UpdateFile {
            workspace_id: ws_id,
            folder_id: fo_id,
            file_id: fi_id,
            patch: NodePatch {
                title: Some("renamed".into()),
                ..NodePatch::default()
            },
        });
        assert_eq!(next.file(ws_id, fo_id, fi_id).unwrap().title, "renamed");
    }

    #[test]
    fn test_update_missing_file_is_noop() {
        let (tree, ws_id, fo_id, _) = seeded();
        let next = tree.apply(TreeAction::UpdateFile {
            workspace_id: ws_id,
            folder_id: fo_id,
            file_id: Uuid::new_v4(),
            patch: NodePatch {
                title: Some("ghost".into()),
                ..NodePatch::default()
            },
        });
        assert_eq!(next, tree);
    }

    #[test]
    fn test_update_missing_workspace_is_noop() {
        let (tree, _, _, _) = seeded();
        let next = tree.apply(TreeAction::UpdateWorkspace {
            workspace_id: Uuid::new_v4(),
            patch: NodePatch {
                title: Some("ghost".into()),
                ..NodePatch::default()
            },
        });
        assert_eq!(next, tree);
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let (tree, ws_id, fo_id, _) = seeded();
        let next = tree
            .apply(TreeAction::DeleteFile {
                workspace_id: ws_id,
                folder_id: fo_id,
                file_id: Uuid::new_v4(),
            })
            .apply(TreeAction::DeleteFolder {
                workspace_id: ws_id,
                folder_id: Uuid::new_v4(),
            })
            .apply(TreeAction::DeleteWorkspace(Uuid::new_v4()));
        assert_eq!(next, tree);
    }

    #[test]
    fn test_add_into_missing_parent_is_noop() {
        let (tree, _, _, _) = seeded();
        let stray_ws = Uuid::new_v4();
        let next = tree.apply(TreeAction::AddFolder {
            workspace_id: stray_ws,
            folder: folder(stray_ws, "stray"),
        });
        assert_eq!(next, tree);
    }

    #[test]
    fn test_duplicate_add_ignored() {
        let ws = workspace("W");
        let tree = WorkspaceTree::new()
            .apply(TreeAction::AddWorkspace(ws.clone()))
            .apply(TreeAction::AddWorkspace(ws));
        assert_eq!(tree.workspaces.len(), 1);
    }

    #[test]
    fn test_set_replaces_level() {
        let (tree, ws_id, fo_id, _) = seeded();
        let replacement = vec![file(fo_id, "a"), file(fo_id, "b")];
        let next = tree.apply(TreeAction::SetFiles {
            workspace_id: ws_id,
            folder_id: fo_id,
            files: replacement,
        });
        assert_eq!(next.folder(ws_id, fo_id).unwrap().files.len(), 2);
    }

    #[test]
    fn test_set_workspaces_replaces_all() {
        let (tree, _, _, _) = seeded();
        let next = tree.apply(TreeAction::SetWorkspaces(vec![
            workspace("A"),
            workspace("B"),
        ]));
        assert_eq!(next.workspaces.len(), 2);
    }

    #[test]
    fn test_delete_workspace_drops_descendants() {
        let (tree, ws_id, fo_id, fi_id) = seeded();
        let next = tree.apply(TreeAction::DeleteWorkspace(ws_id));
        assert!(next.workspace(ws_id).is_none());
        assert!(next.folder(ws_id, fo_id).is_none());
        assert!(next.file(ws_id, fo_id, fi_id).is_none());
    }

    #[test]
    fn test_state_store_dispatch() {
        let mut store = StateStore::new();
        assert!(store.tree().workspaces.is_empty());

        let ws = workspace("W");
        let ws_id = ws.node.id;
        store.dispatch(TreeAction::AddWorkspace(ws));
        assert!(store.tree().workspace(ws_id).is_some());

        store.dispatch(TreeAction::DeleteWorkspace(ws_id));
        assert!(store.tree().workspaces.is_empty());
    }

    #[test]
    fn test_trash_restore_through_reducer() {
        let (tree, ws_id, fo_id, fi_id) = seeded();
        let trashed = tree.apply(TreeAction::UpdateFile {
            workspace_id: ws_id,
            folder_id: fo_id,
            file_id: fi_id,
            patch: NodePatch::trash_by("alice@x"),
        });
        assert!(trashed.file(ws_id, fo_id, fi_id).unwrap().is_trashed());

        let restored = trashed.apply(TreeAction::UpdateFile {
            workspace_id: ws_id,
            folder_id: fo_id,
            file_id: fi_id,
            patch: NodePatch::restore(),
        });
        assert_eq!(restored.file(ws_id, fo_id, fi_id).unwrap().trash, None);
    }
}
