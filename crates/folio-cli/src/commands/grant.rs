//! Grant and revoke command handlers

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use folio_core::{
    NewDocumentPermission, NewFolderPermission, PermissionLevel, PermissionTarget, Store,
};

use super::{parse_id, resolve_folder, Caller};
use crate::output::Output;

pub struct FolderGrantArgs {
    pub folder: String,
    pub user: Option<Uuid>,
    pub department: Option<String>,
    pub level: PermissionLevel,
    pub inherit: bool,
    pub until: Option<DateTime<Utc>>,
}

pub fn grant_folder(
    store: &mut Store,
    caller: &Caller,
    args: FolderGrantArgs,
    output: &Output,
) -> Result<()> {
    let folder_id = resolve_folder(store, &args.folder)?;
    let target = match (args.user, args.department) {
        (Some(user), None) => PermissionTarget::User(user),
        (None, Some(dept)) => PermissionTarget::Department(dept),
        _ => bail!("Specify exactly one of --user or --department"),
    };

    let mut grant = NewFolderPermission::new(target, args.level, caller.user_id).inherit(args.inherit);
    if let Some(until) = args.until {
        grant = grant.valid_until(until);
    }

    let permission = store
        .grant_folder_permission(folder_id, &grant)
        .context("Failed to grant folder permission")?;

    if output.is_json() {
        output.json(&permission);
    } else if output.is_quiet() {
        println!("{}", permission.id);
    } else {
        output.success(&format!(
            "Granted {} on folder {} to {}",
            permission.level, folder_id, permission.target
        ));
        println!("Grant ID: {}", permission.id);
    }
    Ok(())
}

pub fn grant_document(
    store: &mut Store,
    caller: &Caller,
    document: String,
    user: Uuid,
    level: PermissionLevel,
    until: Option<DateTime<Utc>>,
    output: &Output,
) -> Result<()> {
    let document_id = parse_id(&document, "document")?;
    let mut grant = NewDocumentPermission::new(user, level, caller.user_id);
    if let Some(until) = until {
        grant = grant.valid_until(until);
    }

    let permission = store
        .grant_document_permission(document_id, &grant)
        .context("Failed to grant document permission")?;

    if output.is_json() {
        output.json(&permission);
    } else if output.is_quiet() {
        println!("{}", permission.id);
    } else {
        output.success(&format!(
            "Granted {} on document {} to user:{}",
            permission.level, document_id, permission.user_id
        ));
        println!("Grant ID: {}", permission.id);
    }
    Ok(())
}

pub fn revoke_folder(store: &mut Store, folder: String, grant: String, output: &Output) -> Result<()> {
    let folder_id = resolve_folder(store, &folder)?;
    let grant_id = parse_id(&grant, "grant")?;
    store
        .revoke_folder_permission(folder_id, grant_id)
        .context("Failed to revoke folder permission")?;
    output.success(&format!("Revoked grant {}", grant_id));
    Ok(())
}

pub fn revoke_document(
    store: &mut Store,
    document: String,
    grant: String,
    output: &Output,
) -> Result<()> {
    let document_id = parse_id(&document, "document")?;
    let grant_id = parse_id(&grant, "grant")?;
    store
        .revoke_document_permission(document_id, grant_id)
        .context("Failed to revoke document permission")?;
    output.success(&format!("Revoked grant {}", grant_id));
    Ok(())
}
