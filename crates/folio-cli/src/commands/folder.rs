//! Folder command handlers

use anyhow::{Context, Result};

use folio_core::{ConfidentialityLevel, NewFolder, Store};

use super::{resolve_folder, Caller};
use crate::output::Output;

pub struct CreateArgs {
    pub name: String,
    pub parent: Option<String>,
    pub confidentiality: Option<ConfidentialityLevel>,
    pub department: Option<String>,
    pub description: Option<String>,
}

pub fn create(store: &mut Store, caller: &Caller, args: CreateArgs, output: &Output) -> Result<()> {
    let parent = match args.parent {
        Some(ref reference) => Some(resolve_folder(store, reference)?),
        None => None,
    };

    let mut new = NewFolder::new(args.name, parent, caller.user_id);
    if let Some(level) = args.confidentiality {
        new = new.confidentiality(level);
    }
    if let Some(dept) = args.department {
        new = new.department(dept);
    }
    if let Some(desc) = args.description {
        new = new.description(desc);
    }

    let folder = store.create_folder(&new).context("Failed to create folder")?;
    output.success(&format!("Created folder: {}", folder.path));
    output.print_folder(&folder);
    Ok(())
}

/// List root folders, the children of `parent`, or its whole subtree
pub fn list(store: &Store, parent: Option<String>, recursive: bool, output: &Output) -> Result<()> {
    let folders = match parent {
        Some(ref reference) => {
            let id = resolve_folder(store, reference)?;
            if recursive {
                store.list_subtree(id)?
            } else {
                store.list_subfolders(id)?
            }
        }
        None if recursive => {
            let mut all = Vec::new();
            for root in store.list_root_folders()? {
                all.extend(store.list_subtree(root.id)?);
            }
            all
        }
        None => store.list_root_folders()?,
    };

    output.print_folders(&folders);
    Ok(())
}

pub fn show(store: &Store, reference: String, output: &Output) -> Result<()> {
    let id = resolve_folder(store, &reference)?;
    let folder = store.get_folder(id)?;
    let grants = store.list_folder_permissions(id)?;

    if output.is_json() {
        output.json(&serde_json::json!({
            "folder": folder,
            "permissions": grants,
        }));
        return Ok(());
    }

    output.print_folder(&folder);
    if !output.is_quiet() {
        println!();
        println!("── Grants ({}) ──", grants.len());
        output.print_folder_permissions(&grants);
    }
    Ok(())
}

/// Move a folder under `to`, or to the root when `to` is absent
pub fn move_to(store: &mut Store, reference: String, to: Option<String>, output: &Output) -> Result<()> {
    let id = resolve_folder(store, &reference)?;
    let parent = match to {
        Some(ref target) => Some(resolve_folder(store, target)?),
        None => None,
    };

    let folder = store.move_folder(id, parent).context("Failed to move folder")?;
    output.success(&format!("Moved folder to {}", folder.path));
    output.print_folder(&folder);
    Ok(())
}

pub fn rename(store: &mut Store, reference: String, name: String, output: &Output) -> Result<()> {
    let id = resolve_folder(store, &reference)?;
    let folder = store.rename_folder(id, &name).context("Failed to rename folder")?;
    output.success(&format!("Renamed folder to {}", folder.path));
    output.print_folder(&folder);
    Ok(())
}

pub fn delete(store: &mut Store, reference: String, output: &Output) -> Result<()> {
    let id = resolve_folder(store, &reference)?;
    let folder = store.get_folder(id)?;
    store.delete_folder(id).context("Failed to delete folder")?;

    if output.is_quiet() {
        println!("{}", id);
    }
    output.success(&format!("Deleted folder: {}", folder.path));
    Ok(())
}

/// Restore takes an id only, deleted folders are not addressable by path
pub fn restore(store: &mut Store, id: String, output: &Output) -> Result<()> {
    let id = super::parse_id(&id, "folder")?;
    let folder = store.restore_folder(id).context("Failed to restore folder")?;
    output.success(&format!("Restored folder: {}", folder.path));
    output.print_folder(&folder);
    Ok(())
}
