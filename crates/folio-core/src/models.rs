//! Data models for Folio
//!
//! Folders, documents, versions, permission grants and the principal
//! evaluated by the resolver.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Separator used in materialized paths
pub const PATH_SEPARATOR: char = '/';

/// Access level, totally ordered: read < write < admin
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    Read = 1,
    Write = 2,
    Admin = 3,
}

impl PermissionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionLevel::Read => "read",
            PermissionLevel::Write => "write",
            PermissionLevel::Admin => "admin",
        }
    }

    /// Numeric rank used for comparisons and storage
    pub fn rank(&self) -> i64 {
        *self as i64
    }

    pub fn from_rank(rank: i64) -> Option<Self> {
        match rank {
            1 => Some(PermissionLevel::Read),
            2 => Some(PermissionLevel::Write),
            3 => Some(PermissionLevel::Admin),
            _ => None,
        }
    }

    /// Whether this level is at least `required`
    pub fn satisfies(&self, required: PermissionLevel) -> bool {
        *self >= required
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "read" => Ok(PermissionLevel::Read),
            "write" => Ok(PermissionLevel::Write),
            "admin" => Ok(PermissionLevel::Admin),
            other => Err(format!("unknown permission level: {}", other)),
        }
    }
}

/// Stored classification; enforcement belongs to an external policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidentialityLevel {
    Public,
    #[default]
    Internal,
    Confidential,
    Restricted,
}

impl ConfidentialityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidentialityLevel::Public => "public",
            ConfidentialityLevel::Internal => "internal",
            ConfidentialityLevel::Confidential => "confidential",
            ConfidentialityLevel::Restricted => "restricted",
        }
    }
}

impl fmt::Display for ConfidentialityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfidentialityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "public" => Ok(ConfidentialityLevel::Public),
            "internal" => Ok(ConfidentialityLevel::Internal),
            "confidential" => Ok(ConfidentialityLevel::Confidential),
            "restricted" => Ok(ConfidentialityLevel::Restricted),
            other => Err(format!("unknown confidentiality level: {}", other)),
        }
    }
}

/// Document processing status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Active,
    Archived,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Active => "active",
            DocumentStatus::Archived => "archived",
        }
    }

    /// Forward-only transitions: pending -> processing -> active -> archived
    pub fn can_transition_to(&self, next: DocumentStatus) -> bool {
        matches!(
            (self, next),
            (DocumentStatus::Pending, DocumentStatus::Processing)
                | (DocumentStatus::Processing, DocumentStatus::Active)
                | (DocumentStatus::Active, DocumentStatus::Archived)
        )
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DocumentStatus::Pending),
            "processing" => Ok(DocumentStatus::Processing),
            "active" => Ok(DocumentStatus::Active),
            "archived" => Ok(DocumentStatus::Archived),
            other => Err(format!("unknown document status: {}", other)),
        }
    }
}

/// The caller evaluated by the permission resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: Uuid,
    pub department: Option<String>,
}

impl Principal {
    pub fn user(user_id: Uuid) -> Self {
        Self {
            user_id,
            department: None,
        }
    }

    pub fn with_department(user_id: Uuid, department: impl Into<String>) -> Self {
        Self {
            user_id,
            department: Some(department.into()),
        }
    }
}

/// A folder in the hierarchy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    pub id: Uuid,
    pub name: String,
    pub parent_id: Option<Uuid>,
    /// Materialized path, e.g. `/Legal/Cases/`
    pub path: String,
    /// Directly-owned, non-deleted documents
    pub document_count: i64,
    pub confidentiality: ConfidentialityLevel,
    pub department: Option<String>,
    pub description: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
}

impl Folder {
    /// Whether `other` lies strictly below this folder
    pub fn is_ancestor_of(&self, other: &Folder) -> bool {
        other.path.len() > self.path.len() && other.path.starts_with(&self.path)
    }

    /// Number of path segments (`/A/` is 1, `/A/B/` is 2)
    pub fn depth(&self) -> usize {
        self.path.matches(PATH_SEPARATOR).count().saturating_sub(1)
    }
}

/// Input for folder creation
#[derive(Debug, Clone)]
pub struct NewFolder {
    pub name: String,
    pub parent_id: Option<Uuid>,
    pub created_by: Uuid,
    pub confidentiality: ConfidentialityLevel,
    pub department: Option<String>,
    pub description: Option<String>,
}

impl NewFolder {
    pub fn new(name: impl Into<String>, parent_id: Option<Uuid>, created_by: Uuid) -> Self {
        Self {
            name: name.into(),
            parent_id,
            created_by,
            confidentiality: ConfidentialityLevel::default(),
            department: None,
            description: None,
        }
    }

    pub fn confidentiality(mut self, level: ConfidentialityLevel) -> Self {
        self.confidentiality = level;
        self
    }

    pub fn department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Partial folder update; `None` leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct FolderUpdate {
    pub description: Option<String>,
    pub confidentiality: Option<ConfidentialityLevel>,
    pub department: Option<String>,
}

/// A stored document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub folder_id: Uuid,
    pub name: String,
    pub original_filename: String,
    pub mime_type: String,
    pub size_bytes: i64,
    /// Location of the current version's bytes
    pub storage_location: String,
    pub status: DocumentStatus,
    pub version: i64,
    pub confidentiality: ConfidentialityLevel,
    pub tags: Vec<String>,
    pub uploaded_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
}

/// Metadata supplied when a document is created
#[derive(Debug, Clone)]
pub struct DocumentMetadata {
    pub name: String,
    pub original_filename: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub uploaded_by: Uuid,
    pub confidentiality: ConfidentialityLevel,
    pub tags: Vec<String>,
}

impl DocumentMetadata {
    /// Metadata named after the uploaded file
    pub fn new(filename: impl Into<String>, uploaded_by: Uuid) -> Self {
        let filename = filename.into();
        Self {
            name: filename.clone(),
            original_filename: filename,
            mime_type: "application/octet-stream".to_string(),
            size_bytes: 0,
            uploaded_by,
            confidentiality: ConfidentialityLevel::default(),
            tags: Vec::new(),
        }
    }

    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn size_bytes(mut self, size: i64) -> Self {
        self.size_bytes = size;
        self
    }

    pub fn confidentiality(mut self, level: ConfidentialityLevel) -> Self {
        self.confidentiality = level;
        self
    }

    /// Add a tag (duplicates are ignored)
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
        self
    }
}

/// Partial metadata update; `None` leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct DocumentUpdate {
    pub name: Option<String>,
    pub tags: Option<Vec<String>>,
    pub confidentiality: Option<ConfidentialityLevel>,
}

/// One stored revision of a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentVersion {
    pub id: Uuid,
    pub document_id: Uuid,
    pub version_number: i64,
    pub storage_location: String,
    pub size_bytes: i64,
    pub change_summary: Option<String>,
    pub uploaded_by: Uuid,
    pub created_at: DateTime<Utc>,
    /// Live location the bytes came from while they sit in holding
    pub held_from: Option<String>,
}

/// Who a folder grant applies to: exactly one of user or department
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "value")]
pub enum PermissionTarget {
    User(Uuid),
    Department(String),
}

impl PermissionTarget {
    pub fn matches(&self, principal: &Principal) -> bool {
        match self {
            PermissionTarget::User(id) => *id == principal.user_id,
            PermissionTarget::Department(dept) => principal.department.as_deref() == Some(dept),
        }
    }
}

impl fmt::Display for PermissionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionTarget::User(id) => write!(f, "user:{}", id),
            PermissionTarget::Department(dept) => write!(f, "department:{}", dept),
        }
    }
}

/// A grant on a folder, optionally inherited by its subtree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderPermission {
    pub id: Uuid,
    pub folder_id: Uuid,
    pub target: PermissionTarget,
    pub level: PermissionLevel,
    pub inherit: bool,
    pub granted_by: Uuid,
    pub valid_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl FolderPermission {
    /// Whether the grant is still in force at `now`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        is_unexpired(self.valid_until, now)
    }
}

/// A grant on a single document for a single user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentPermission {
    pub id: Uuid,
    pub document_id: Uuid,
    pub user_id: Uuid,
    pub level: PermissionLevel,
    pub granted_by: Uuid,
    pub valid_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl DocumentPermission {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        is_unexpired(self.valid_until, now)
    }
}

/// Input for a folder grant
#[derive(Debug, Clone)]
pub struct NewFolderPermission {
    pub target: PermissionTarget,
    pub level: PermissionLevel,
    pub inherit: bool,
    pub granted_by: Uuid,
    pub valid_until: Option<DateTime<Utc>>,
}

impl NewFolderPermission {
    /// Non-inherited, non-expiring grant
    pub fn new(target: PermissionTarget, level: PermissionLevel, granted_by: Uuid) -> Self {
        Self {
            target,
            level,
            inherit: false,
            granted_by,
            valid_until: None,
        }
    }

    pub fn inherit(mut self, inherit: bool) -> Self {
        self.inherit = inherit;
        self
    }

    pub fn valid_until(mut self, until: DateTime<Utc>) -> Self {
        self.valid_until = Some(until);
        self
    }
}

/// Input for a document grant
#[derive(Debug, Clone)]
pub struct NewDocumentPermission {
    pub user_id: Uuid,
    pub level: PermissionLevel,
    pub granted_by: Uuid,
    pub valid_until: Option<DateTime<Utc>>,
}

impl NewDocumentPermission {
    pub fn new(user_id: Uuid, level: PermissionLevel, granted_by: Uuid) -> Self {
        Self {
            user_id,
            level,
            granted_by,
            valid_until: None,
        }
    }

    pub fn valid_until(mut self, until: DateTime<Utc>) -> Self {
        self.valid_until = Some(until);
        self
    }
}

pub(crate) fn is_unexpired(valid_until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    valid_until.map_or(true, |until| now < until)
}

/// Resource addressed by a resolution request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Folder(Uuid),
    Document(Uuid),
}

/// Largest page `list_documents` returns; bigger limits are clamped
pub const MAX_PAGE_SIZE: i64 = 500;

/// Filters for `list_documents`
#[derive(Debug, Clone)]
pub struct DocumentFilter {
    pub folder_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    /// Case-insensitive substring of the name or original filename
    pub search: Option<String>,
    /// Documents must carry every one of these tags
    pub tags: Vec<String>,
    pub status: Option<DocumentStatus>,
    pub confidentiality: Option<ConfidentialityLevel>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for DocumentFilter {
    fn default() -> Self {
        Self {
            folder_id: None,
            category_id: None,
            search: None,
            tags: Vec::new(),
            status: None,
            confidentiality: None,
            limit: 50,
            offset: 0,
        }
    }
}

impl DocumentFilter {
    /// Page size actually applied, between 0 and [`MAX_PAGE_SIZE`]
    pub fn page_size(&self) -> i64 {
        self.limit.clamp(0, MAX_PAGE_SIZE)
    }
}

/// A label documents can be filed under, independent of their folder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    /// Unique, compared case-insensitively
    pub name: String,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for category creation
#[derive(Debug, Clone)]
pub struct NewCategory {
    pub name: String,
    pub color: Option<String>,
    pub icon: Option<String>,
}

impl NewCategory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: None,
            icon: None,
        }
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }
}

/// One page of `list_documents` results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentPage {
    pub documents: Vec<Document>,
    /// Matching documents across all pages
    pub total: i64,
}

/// Repository-wide totals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSummary {
    pub total_documents: i64,
    pub total_bytes: i64,
    /// Documents created since the start of the current month (UTC)
    pub recent_uploads: i64,
    pub shared_documents: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_permission_ordering() {
        assert!(PermissionLevel::Read < PermissionLevel::Write);
        assert!(PermissionLevel::Write < PermissionLevel::Admin);
        assert!(PermissionLevel::Admin.satisfies(PermissionLevel::Read));
        assert!(!PermissionLevel::Read.satisfies(PermissionLevel::Write));
        assert_eq!(PermissionLevel::from_rank(2), Some(PermissionLevel::Write));
        assert_eq!(PermissionLevel::from_rank(4), None);
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!("ADMIN".parse::<PermissionLevel>(), Ok(PermissionLevel::Admin));
        assert!("owner".parse::<PermissionLevel>().is_err());
        assert_eq!(
            "restricted".parse::<ConfidentialityLevel>(),
            Ok(ConfidentialityLevel::Restricted)
        );
        assert_eq!("active".parse::<DocumentStatus>(), Ok(DocumentStatus::Active));
    }

    #[test]
    fn test_status_transitions() {
        use DocumentStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Active));
        assert!(Active.can_transition_to(Archived));
        assert!(!Pending.can_transition_to(Active));
        assert!(!Archived.can_transition_to(Pending));
        assert!(!Active.can_transition_to(Active));
    }

    #[test]
    fn test_target_matching() {
        let user = Uuid::new_v4();
        let principal = Principal::with_department(user, "Finance");

        assert!(PermissionTarget::User(user).matches(&principal));
        assert!(!PermissionTarget::User(Uuid::new_v4()).matches(&principal));
        assert!(PermissionTarget::Department("Finance".into()).matches(&principal));
        assert!(!PermissionTarget::Department("Legal".into()).matches(&principal));
        assert!(!PermissionTarget::Department("Finance".into()).matches(&Principal::user(user)));
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        assert!(is_unexpired(None, now));
        assert!(is_unexpired(Some(now + Duration::hours(1)), now));
        assert!(!is_unexpired(Some(now - Duration::seconds(1)), now));
        assert!(!is_unexpired(Some(now), now));
    }

    #[test]
    fn test_folder_depth_and_ancestry() {
        let now = Utc::now();
        let make = |path: &str| Folder {
            id: Uuid::new_v4(),
            name: "x".into(),
            parent_id: None,
            path: path.into(),
            document_count: 0,
            confidentiality: ConfidentialityLevel::Internal,
            department: None,
            description: None,
            created_by: Uuid::nil(),
            created_at: now,
            updated_at: now,
            is_deleted: false,
        };

        let a = make("/A/");
        let ab = make("/A/B/");
        let abc = make("/AB/");
        assert_eq!(a.depth(), 1);
        assert_eq!(ab.depth(), 2);
        assert!(a.is_ancestor_of(&ab));
        assert!(!a.is_ancestor_of(&a));
        assert!(!a.is_ancestor_of(&abc));
    }

    #[test]
    fn test_metadata_builder() {
        let uploader = Uuid::new_v4();
        let meta = DocumentMetadata::new("brief.pdf", uploader)
            .mime_type("application/pdf")
            .size_bytes(42)
            .tag("court")
            .tag("court");
        assert_eq!(meta.name, "brief.pdf");
        assert_eq!(meta.tags, vec!["court"]);
        assert_eq!(meta.size_bytes, 42);
    }

    #[test]
    fn test_page_size_is_clamped() {
        let filter = |limit| DocumentFilter {
            limit,
            ..Default::default()
        };
        assert_eq!(DocumentFilter::default().page_size(), 50);
        assert_eq!(filter(10_000).page_size(), MAX_PAGE_SIZE);
        assert_eq!(filter(-5).page_size(), 0);
    }

    #[test]
    fn test_target_serialization() {
        let target = PermissionTarget::Department("Finance".into());
        let json = serde_json::to_string(&target).unwrap();
        assert_eq!(json, r#"{"kind":"department","value":"Finance"}"#);
        let back: PermissionTarget = serde_json::from_str(&json).unwrap();
        assert_eq!(back, target);
    }
}
