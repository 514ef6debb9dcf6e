//! Output formatting for CLI
//!
//! Every command prints through [`Output`] so that the three modes stay
//! consistent:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode, ids only (--quiet flag)

use serde::Serialize;

use folio_core::{
    Category, Document, DocumentPage, DocumentPermission, DocumentVersion, Folder,
    FolderPermission, IntegrityReport, PermissionLevel,
};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Pretty-print any serializable value
    pub fn json<T: Serialize + ?Sized>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Failed to serialize output: {}", e),
        }
    }

    pub fn print_folder(&self, folder: &Folder) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:              {}", folder.id);
                println!("Name:            {}", folder.name);
                println!("Path:            {}", folder.path);
                if let Some(parent) = folder.parent_id {
                    println!("Parent:          {}", parent);
                }
                println!("Documents:       {}", folder.document_count);
                println!("Confidentiality: {}", folder.confidentiality);
                if let Some(ref dept) = folder.department {
                    println!("Department:      {}", dept);
                }
                if let Some(ref desc) = folder.description {
                    println!("Description:     {}", desc);
                }
                println!("Created:         {}", folder.created_at.format("%Y-%m-%d %H:%M"));
                println!("Updated:         {}", folder.updated_at.format("%Y-%m-%d %H:%M"));
            }
            OutputFormat::Json => self.json(folder),
            OutputFormat::Quiet => println!("{}", folder.id),
        }
    }

    /// Print folders, indented by depth relative to the shallowest one
    pub fn print_folders(&self, folders: &[Folder]) {
        match self.format {
            OutputFormat::Human => {
                if folders.is_empty() {
                    println!("No folders found.");
                    return;
                }
                let base = folders.iter().map(Folder::depth).min().unwrap_or(1);
                for folder in folders {
                    let indent = "  ".repeat(folder.depth().saturating_sub(base));
                    println!(
                        "{} | {}{} ({})",
                        short_id(&folder.id),
                        indent,
                        folder.path,
                        folder.document_count
                    );
                }
                println!("\n{} folder(s)", folders.len());
            }
            OutputFormat::Json => self.json(folders),
            OutputFormat::Quiet => {
                for folder in folders {
                    println!("{}", folder.id);
                }
            }
        }
    }

    pub fn print_document(&self, document: &Document) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:              {}", document.id);
                println!("Name:            {}", document.name);
                if document.original_filename != document.name {
                    println!("Filename:        {}", document.original_filename);
                }
                println!("Folder:          {}", document.folder_id);
                println!("Status:          {}", document.status);
                println!("Version:         {}", document.version);
                println!("Type:            {}", document.mime_type);
                println!("Size:            {}", format_bytes(document.size_bytes));
                println!("Confidentiality: {}", document.confidentiality);
                if !document.tags.is_empty() {
                    println!("Tags:            {}", document.tags.join(", "));
                }
                println!("Location:        {}", document.storage_location);
                println!("Uploaded by:     {}", document.uploaded_by);
                println!("Created:         {}", document.created_at.format("%Y-%m-%d %H:%M"));
                println!("Updated:         {}", document.updated_at.format("%Y-%m-%d %H:%M"));
            }
            OutputFormat::Json => self.json(document),
            OutputFormat::Quiet => println!("{}", document.id),
        }
    }

    pub fn print_documents(&self, page: &DocumentPage) {
        match self.format {
            OutputFormat::Human => {
                if page.documents.is_empty() {
                    println!("No documents found.");
                    return;
                }
                for doc in &page.documents {
                    println!(
                        "{} | {} | v{} | {} | {}",
                        short_id(&doc.id),
                        truncate(&doc.name, 40),
                        doc.version,
                        doc.status,
                        format_bytes(doc.size_bytes)
                    );
                }
                println!("\n{} of {} document(s)", page.documents.len(), page.total);
            }
            OutputFormat::Json => self.json(page),
            OutputFormat::Quiet => {
                for doc in &page.documents {
                    println!("{}", doc.id);
                }
            }
        }
    }

    pub fn print_categories(&self, categories: &[Category]) {
        match self.format {
            OutputFormat::Human => {
                if categories.is_empty() {
                    println!("No categories found.");
                    return;
                }
                for category in categories {
                    let style: Vec<&str> = [category.color.as_deref(), category.icon.as_deref()]
                        .into_iter()
                        .flatten()
                        .collect();
                    if style.is_empty() {
                        println!("{} | {}", short_id(&category.id), category.name);
                    } else {
                        println!(
                            "{} | {} ({})",
                            short_id(&category.id),
                            category.name,
                            style.join(", ")
                        );
                    }
                }
                println!("\n{} category(ies)", categories.len());
            }
            OutputFormat::Json => self.json(categories),
            OutputFormat::Quiet => {
                for category in categories {
                    println!("{}", category.id);
                }
            }
        }
    }

    pub fn print_versions(&self, versions: &[DocumentVersion]) {
        match self.format {
            OutputFormat::Human => {
                for version in versions {
                    println!(
                        "v{} | {} | {} | {}",
                        version.version_number,
                        version.created_at.format("%Y-%m-%d %H:%M"),
                        format_bytes(version.size_bytes),
                        version.change_summary.as_deref().unwrap_or("")
                    );
                }
                println!("\n{} version(s)", versions.len());
            }
            OutputFormat::Json => self.json(versions),
            OutputFormat::Quiet => {
                for version in versions {
                    println!("{}", version.version_number);
                }
            }
        }
    }

    pub fn print_folder_permissions(&self, permissions: &[FolderPermission]) {
        match self.format {
            OutputFormat::Human => {
                if permissions.is_empty() {
                    println!("No grants.");
                    return;
                }
                for p in permissions {
                    println!(
                        "{} | {} | {}{}{}",
                        short_id(&p.id),
                        p.target,
                        p.level,
                        if p.inherit { " (inherited)" } else { "" },
                        until_suffix(p.valid_until)
                    );
                }
            }
            OutputFormat::Json => self.json(permissions),
            OutputFormat::Quiet => {
                for p in permissions {
                    println!("{}", p.id);
                }
            }
        }
    }

    pub fn print_document_permissions(&self, permissions: &[DocumentPermission]) {
        match self.format {
            OutputFormat::Human => {
                if permissions.is_empty() {
                    println!("No grants.");
                    return;
                }
                for p in permissions {
                    println!(
                        "{} | user:{} | {}{}",
                        short_id(&p.id),
                        p.user_id,
                        p.level,
                        until_suffix(p.valid_until)
                    );
                }
            }
            OutputFormat::Json => self.json(permissions),
            OutputFormat::Quiet => {
                for p in permissions {
                    println!("{}", p.id);
                }
            }
        }
    }

    /// Print the outcome of an access check
    pub fn print_access(
        &self,
        resource: &str,
        effective: Option<PermissionLevel>,
        required: PermissionLevel,
    ) {
        let allowed = effective.map_or(false, |level| level.satisfies(required));
        match self.format {
            OutputFormat::Human => {
                println!("Resource:  {}", resource);
                println!(
                    "Effective: {}",
                    effective.map_or("none", |level| level.as_str())
                );
                println!("Required:  {}", required);
                println!("Allowed:   {}", if allowed { "yes" } else { "no" });
            }
            OutputFormat::Json => {
                self.json(&serde_json::json!({
                    "resource": resource,
                    "effective": effective,
                    "required": required,
                    "allowed": allowed
                }));
            }
            OutputFormat::Quiet => println!("{}", allowed),
        }
    }

    pub fn print_integrity(&self, report: &IntegrityReport) {
        match self.format {
            OutputFormat::Human => {
                println!("Checked {} folder(s)", report.folders_checked);
                if report.is_clean() {
                    println!("No problems found.");
                    return;
                }
                for m in &report.paths {
                    println!(
                        "path    {} stored {} expected {}",
                        m.folder_id, m.actual, m.expected
                    );
                }
                for orphan in &report.orphans {
                    println!("orphan  {}", orphan);
                }
                for m in &report.counts {
                    println!(
                        "count   {} stored {} actual {}",
                        m.folder_id, m.stored, m.actual
                    );
                }
                for m in &report.versions {
                    println!(
                        "version {} stored {} latest {}",
                        m.document_id, m.stored, m.latest
                    );
                }
            }
            OutputFormat::Json => self.json(report),
            OutputFormat::Quiet => println!("{}", if report.is_clean() { "clean" } else { "dirty" }),
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => println!("{}", serde_json::json!({"message": msg})),
            OutputFormat::Quiet => {}
        }
    }
}

fn short_id(id: &uuid::Uuid) -> String {
    id.to_string()[..8].to_string()
}

fn until_suffix(until: Option<chrono::DateTime<chrono::Utc>>) -> String {
    until
        .map(|t| format!(" until {}", t.format("%Y-%m-%d %H:%M")))
        .unwrap_or_default()
}

/// Truncate a string to `max_len` characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Human-readable byte size
pub fn format_bytes(bytes: i64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
        assert_eq!(truncate("ünïcödé names", 8), "ünïcö...");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
