//! Category command handlers

use anyhow::{anyhow, Context, Result};
use uuid::Uuid;

use folio_core::{NewCategory, Store};

use super::parse_id;
use crate::output::Output;

/// Resolve a category given either its id or its name (case-insensitive)
pub fn resolve_category(store: &Store, reference: &str) -> Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(reference) {
        return Ok(id);
    }
    store
        .list_categories()?
        .into_iter()
        .find(|c| c.name.eq_ignore_ascii_case(reference.trim()))
        .map(|c| c.id)
        .ok_or_else(|| anyhow!("Category not found: {}", reference))
}

pub fn create(
    store: &mut Store,
    name: String,
    color: Option<String>,
    icon: Option<String>,
    output: &Output,
) -> Result<()> {
    let mut new = NewCategory::new(name);
    new.color = color;
    new.icon = icon;

    let category = store
        .create_category(&new)
        .context("Failed to create category")?;
    output.success(&format!("Created category: {} ({})", category.name, category.id));
    if output.is_json() {
        output.json(&category);
    } else if output.is_quiet() {
        println!("{}", category.id);
    }
    Ok(())
}

pub fn list(store: &Store, output: &Output) -> Result<()> {
    let categories = store.list_categories()?;
    output.print_categories(&categories);
    Ok(())
}

/// File a document under a category
pub fn assign(store: &mut Store, document: String, category: String, output: &Output) -> Result<()> {
    let document_id = parse_id(&document, "document")?;
    let category_id = resolve_category(store, &category)?;

    let document = store
        .add_document_category(document_id, category_id)
        .context("Failed to categorize document")?;
    output.success(&format!("Filed {} under {}", document.name, category));
    if output.is_json() {
        output.json(&store.document_categories(document.id)?);
    }
    Ok(())
}
