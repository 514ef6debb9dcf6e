//! Document command handlers

use std::io::Write;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

use folio_core::{
    ConfidentialityLevel, DocumentFilter, DocumentMetadata, DocumentStatus, DocumentUpdate, Store,
};

use super::{parse_id, resolve_folder, Caller};
use crate::output::{Output, OutputFormat};

pub struct UploadArgs {
    pub file: PathBuf,
    pub folder: String,
    pub name: Option<String>,
    pub mime_type: Option<String>,
    pub confidentiality: Option<ConfidentialityLevel>,
    pub tags: Vec<String>,
}

pub fn upload(store: &mut Store, caller: &Caller, args: UploadArgs, output: &Output) -> Result<()> {
    let folder_id = resolve_folder(store, &args.folder)?;
    let filename = args
        .file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("Invalid file name: {}", args.file.display()))?
        .to_string();

    let mut metadata = DocumentMetadata::new(filename, caller.user_id);
    if let Some(name) = args.name {
        metadata.name = name;
    }
    if let Some(mime) = args.mime_type {
        metadata = metadata.mime_type(mime);
    }
    if let Some(level) = args.confidentiality {
        metadata = metadata.confidentiality(level);
    }
    for tag in args.tags {
        metadata = metadata.tag(tag);
    }

    let bytes = std::fs::read(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let document = store
        .upload_document(folder_id, &metadata, &bytes)
        .context("Failed to upload document")?;

    output.success(&format!("Uploaded document: {}", document.id));
    output.print_document(&document);
    Ok(())
}

pub fn show(store: &Store, id: String, output: &Output) -> Result<()> {
    let id = parse_id(&id, "document")?;
    let document = store.get_document(id)?;
    let grants = store.list_document_permissions(id)?;
    let categories = store.document_categories(id)?;

    if output.is_json() {
        output.json(&serde_json::json!({
            "document": document,
            "categories": categories,
            "permissions": grants,
        }));
        return Ok(());
    }

    output.print_document(&document);
    if !output.is_quiet() {
        if !categories.is_empty() {
            let names: Vec<&str> = categories.iter().map(|c| c.name.as_str()).collect();
            println!("Categories:      {}", names.join(", "));
        }
        println!();
        println!("── Grants ({}) ──", grants.len());
        output.print_document_permissions(&grants);
    }
    Ok(())
}

pub struct ListArgs {
    pub folder: Option<String>,
    pub category: Option<String>,
    pub search: Option<String>,
    pub status: Option<DocumentStatus>,
    pub tags: Vec<String>,
    pub confidentiality: Option<ConfidentialityLevel>,
    pub limit: i64,
    pub offset: i64,
}

pub fn list(store: &Store, args: ListArgs, output: &Output) -> Result<()> {
    let folder_id = match args.folder {
        Some(ref reference) => Some(resolve_folder(store, reference)?),
        None => None,
    };
    let category_id = match args.category {
        Some(ref reference) => Some(super::category::resolve_category(store, reference)?),
        None => None,
    };
    let filter = DocumentFilter {
        folder_id,
        category_id,
        search: args.search,
        tags: args.tags,
        status: args.status,
        confidentiality: args.confidentiality,
        limit: args.limit,
        offset: args.offset,
    };

    let page = store.list_documents(&filter)?;
    output.print_documents(&page);
    Ok(())
}

pub fn confirm(store: &mut Store, id: String, output: &Output) -> Result<()> {
    let id = parse_id(&id, "document")?;
    let document = store.confirm_upload(id).context("Failed to confirm upload")?;
    output.success(&format!("Upload confirmed, status is now {}", document.status));
    if output.is_quiet() {
        println!("{}", document.id);
    }
    Ok(())
}

pub fn activate(store: &mut Store, id: String, output: &Output) -> Result<()> {
    let id = parse_id(&id, "document")?;
    let document = store.activate_document(id).context("Failed to activate document")?;
    output.success(&format!("Document {} is {}", document.id, document.status));
    Ok(())
}

pub fn archive(store: &mut Store, id: String, output: &Output) -> Result<()> {
    let id = parse_id(&id, "document")?;
    let document = store.archive_document(id).context("Failed to archive document")?;
    output.success(&format!("Document {} is {}", document.id, document.status));
    Ok(())
}

/// Store the contents of `file` as the next version
pub fn version(
    store: &mut Store,
    caller: &Caller,
    id: String,
    file: PathBuf,
    summary: Option<String>,
    output: &Output,
) -> Result<()> {
    let id = parse_id(&id, "document")?;
    let bytes =
        std::fs::read(&file).with_context(|| format!("Failed to read {}", file.display()))?;

    let version = store
        .create_version_with_retry(id, &bytes, summary.as_deref(), caller.user_id)
        .context("Failed to create version")?;

    match output.format {
        OutputFormat::Json => output.json(&version),
        OutputFormat::Quiet => println!("{}", version.version_number),
        OutputFormat::Human => output.success(&format!("Created version {}", version.version_number)),
    }
    Ok(())
}

pub fn versions(store: &Store, id: String, output: &Output) -> Result<()> {
    let id = parse_id(&id, "document")?;
    let versions = store.list_versions(id)?;
    output.print_versions(&versions);
    Ok(())
}

/// Write the current version's bytes to `destination`, or stdout
pub fn download(store: &Store, id: String, destination: Option<PathBuf>, output: &Output) -> Result<()> {
    let id = parse_id(&id, "document")?;
    let bytes = store.read_document(id)?;

    match destination {
        Some(path) => {
            std::fs::write(&path, &bytes)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            output.success(&format!("Wrote {} bytes to {}", bytes.len(), path.display()));
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes).context("Failed to write to stdout")?;
            stdout.flush()?;
        }
    }
    Ok(())
}

pub fn move_to(store: &mut Store, id: String, to: String, output: &Output) -> Result<()> {
    let id = parse_id(&id, "document")?;
    let folder_id = resolve_folder(store, &to)?;
    let document = store.move_document(id, folder_id).context("Failed to move document")?;
    output.success(&format!("Moved document to folder {}", document.folder_id));
    Ok(())
}

pub fn update(
    store: &mut Store,
    id: String,
    name: Option<String>,
    tags: Option<Vec<String>>,
    confidentiality: Option<ConfidentialityLevel>,
    output: &Output,
) -> Result<()> {
    let id = parse_id(&id, "document")?;
    let update = DocumentUpdate {
        name,
        tags,
        confidentiality,
    };
    let document = store
        .update_document(id, &update)
        .context("Failed to update document")?;
    output.success("Document updated");
    output.print_document(&document);
    Ok(())
}

pub fn delete(store: &mut Store, id: String, output: &Output) -> Result<()> {
    let id = parse_id(&id, "document")?;
    store.delete_document(id).context("Failed to delete document")?;
    if output.is_quiet() {
        println!("{}", id);
    }
    output.success(&format!("Deleted document: {}", id));
    Ok(())
}

pub fn restore(store: &mut Store, id: String, output: &Output) -> Result<()> {
    let id = parse_id(&id, "document")?;
    let document = store.restore_document(id).context("Failed to restore document")?;
    output.success(&format!("Restored document: {}", document.name));
    output.print_document(&document);
    Ok(())
}
