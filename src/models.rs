use crate::error::ContainerError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageType {
    Article,
    Redirect(String),
}

/// One page of the dump. Only `title` is guaranteed; every other field may be
/// absent, either because the dump lacked it or because the container that
/// produced the record suppressed it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageRecord {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl PageRecord {
    pub fn article(title: &str, page_id: u64, text: &str) -> Self {
        Self {
            title: title.to_string(),
            page_id: Some(page_id),
            namespace: Some(0),
            text: Some(text.to_string()),
            ..Self::default()
        }
    }

    pub fn redirect(title: &str, page_id: u64, target: &str) -> Self {
        Self {
            title: title.to_string(),
            page_id: Some(page_id),
            namespace: Some(0),
            redirect_target: Some(target.to_string()),
            ..Self::default()
        }
    }

    pub fn is_redirect(&self) -> bool {
        self.redirect_target.is_some()
    }

    pub fn page_type(&self) -> PageType {
        match &self.redirect_target {
            Some(target) => PageType::Redirect(target.clone()),
            None => PageType::Article,
        }
    }

    pub fn wikipedia_url(&self) -> String {
        format!(
            "https://en.wikipedia.org/wiki/{}",
            self.title.replace(' ', "_")
        )
    }

    /// Copy of this record carrying only the fields in `fields`.
    pub fn retain_fields(&self, fields: FieldSet) -> Self {
        let keep = |f: Field| fields.contains(f);
        Self {
            title: self.title.clone(),
            page_id: self.page_id.filter(|_| keep(Field::PageId)),
            namespace: self.namespace.filter(|_| keep(Field::Namespace)),
            redirect_target: self.redirect_target.clone(),
            revision_id: self.revision_id.filter(|_| keep(Field::RevisionId)),
            timestamp: self.timestamp.clone().filter(|_| keep(Field::Timestamp)),
            text: self.text.clone().filter(|_| keep(Field::Text)),
            categories: self.categories.clone().filter(|_| keep(Field::Categories)),
            tags: self.tags.clone().filter(|_| keep(Field::Tags)),
        }
    }
}

/// Wire type of a container field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Long,
    Int,
    String,
    StringList,
}

impl FieldKind {
    pub fn name(self) -> &'static str {
        match self {
            FieldKind::Long => "long",
            FieldKind::Int => "int",
            FieldKind::String => "string",
            FieldKind::StringList => "string[]",
        }
    }
}

/// Serialisable fields of a [`PageRecord`], in canonical container order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    PageId,
    Title,
    Namespace,
    RedirectTarget,
    RevisionId,
    Timestamp,
    Text,
    Categories,
    Tags,
}

impl Field {
    pub const ALL: [Field; 9] = [
        Field::PageId,
        Field::Title,
        Field::Namespace,
        Field::RedirectTarget,
        Field::RevisionId,
        Field::Timestamp,
        Field::Text,
        Field::Categories,
        Field::Tags,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::PageId => "page_id",
            Field::Title => "title",
            Field::Namespace => "namespace",
            Field::RedirectTarget => "redirect_target",
            Field::RevisionId => "revision_id",
            Field::Timestamp => "timestamp",
            Field::Text => "text",
            Field::Categories => "categories",
            Field::Tags => "tags",
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            Field::PageId | Field::RevisionId => FieldKind::Long,
            Field::Namespace => FieldKind::Int,
            Field::Title | Field::RedirectTarget | Field::Timestamp | Field::Text => {
                FieldKind::String
            }
            Field::Categories | Field::Tags => FieldKind::StringList,
        }
    }

    pub fn from_name(name: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|f| f.name() == name)
    }

    /// Key fields identify a record and are always stored.
    pub fn is_key(self) -> bool {
        matches!(self, Field::Title | Field::RedirectTarget)
    }

    fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::from_name(s.trim()).ok_or_else(|| format!("unknown field '{}'", s))
    }
}

/// Set of fields stored by a container, as a bit mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSet(u16);

impl FieldSet {
    pub fn all() -> Self {
        Field::ALL
            .into_iter()
            .fold(FieldSet(0), |set, f| FieldSet(set.0 | f.bit()))
    }

    /// All fields except `suppressed`. Key fields cannot be suppressed.
    pub fn suppressing(suppressed: &[Field]) -> Result<Self, ContainerError> {
        let mut set = Self::all();
        for field in suppressed {
            if field.is_key() {
                return Err(ContainerError::InvalidSuppression(field.name().to_string()));
            }
            set.0 &= !field.bit();
        }
        Ok(set)
    }

    pub fn from_mask(mask: u16) -> Self {
        FieldSet(mask & Self::all().0)
    }

    pub fn mask(self) -> u16 {
        self.0
    }

    pub fn contains(self, field: Field) -> bool {
        self.0 & field.bit() != 0
    }

    pub fn insert(&mut self, field: Field) {
        self.0 |= field.bit();
    }

    /// Fields in canonical order.
    pub fn iter(self) -> impl Iterator<Item = Field> {
        Field::ALL.into_iter().filter(move |f| self.contains(*f))
    }
}

impl Default for FieldSet {
    fn default() -> Self {
        Self::all()
    }
}
