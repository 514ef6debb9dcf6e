//! Access checks, integrity checks and repository status

use anyhow::Result;

use folio_core::{PermissionLevel, Resource, Store};

use super::{parse_id, resolve_folder, Caller};
use crate::output::{format_bytes, Output, OutputFormat};

/// Report the caller's effective level on a folder
pub fn folder_access(
    store: &Store,
    caller: &Caller,
    folder: String,
    required: PermissionLevel,
    output: &Output,
) -> Result<bool> {
    let id = resolve_folder(store, &folder)?;
    access(store, caller, Resource::Folder(id), &format!("folder {}", id), required, output)
}

/// Report the caller's effective level on a document
pub fn document_access(
    store: &Store,
    caller: &Caller,
    document: String,
    required: PermissionLevel,
    output: &Output,
) -> Result<bool> {
    let id = parse_id(&document, "document")?;
    access(store, caller, Resource::Document(id), &format!("document {}", id), required, output)
}

fn access(
    store: &Store,
    caller: &Caller,
    resource: Resource,
    label: &str,
    required: PermissionLevel,
    output: &Output,
) -> Result<bool> {
    let effective = store.effective_level(&caller.principal(), resource)?;
    output.print_access(label, effective, required);
    Ok(effective.map_or(false, |level| level.satisfies(required)))
}

/// Run the consistency checks, optionally recomputing folder counts first
pub fn integrity(store: &mut Store, repair: bool, output: &Output) -> Result<bool> {
    if repair {
        let fixed = store.repair_document_counts()?;
        output.message(&format!("Repaired {} folder count(s)", fixed));
    }
    let report = store.check_integrity()?;
    output.print_integrity(&report);
    Ok(report.is_clean())
}

/// Show repository totals and locations
pub fn status(store: &Store, output: &Output) -> Result<()> {
    let summary = store.storage_summary()?;
    let config = store.config();

    match output.format {
        OutputFormat::Json => {
            output.json(&serde_json::json!({
                "database": config.sqlite_path(),
                "storage": config.storage_root(),
                "documents": summary.total_documents,
                "bytes": summary.total_bytes,
                "recent_uploads": summary.recent_uploads,
                "shared_documents": summary.shared_documents,
                "root_folders": store.list_root_folders()?.len(),
            }));
        }
        OutputFormat::Quiet => println!("{}", summary.total_documents),
        OutputFormat::Human => {
            println!("Folio Status");
            println!("============");
            println!();
            println!("Database: {}", config.sqlite_path().display());
            println!("Storage:  {}", config.storage_root().display());
            println!();
            println!("Root folders:     {}", store.list_root_folders()?.len());
            println!("Documents:        {}", summary.total_documents);
            println!("This month:       {}", summary.recent_uploads);
            println!("Shared documents: {}", summary.shared_documents);
            println!("Total size:       {}", format_bytes(summary.total_bytes));
        }
    }
    Ok(())
}
