//! Slide catalog
//!
//! The catalog only knows slide identity. Slide content (text, images,
//! video) lives in the external content store.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("slide catalog is empty")]
    Empty,
    #[error("slide ids must be contiguous from 1: expected {expected}, found {found}")]
    NonContiguous { expected: u32, found: u32 },
}

/// Identity of one slide
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideInfo {
    pub id: u32,
    pub name: String,
    pub content_type: String,
}

impl SlideInfo {
    pub fn new(id: u32, name: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            content_type: content_type.into(),
        }
    }
}

/// Ordered slides with ids `1..=N`
#[derive(Debug, Clone, Serialize)]
pub struct SlideCatalog {
    slides: Vec<SlideInfo>,
}

impl SlideCatalog {
    /// Build a catalog, sorting by id and checking ids run 1..=N
    pub fn new(mut slides: Vec<SlideInfo>) -> Result<Self, CatalogError> {
        if slides.is_empty() {
            return Err(CatalogError::Empty);
        }
        slides.sort_by_key(|s| s.id);
        for (idx, slide) in slides.iter().enumerate() {
            let expected = idx as u32 + 1;
            if slide.id != expected {
                return Err(CatalogError::NonContiguous {
                    expected,
                    found: slide.id,
                });
            }
        }
        Ok(Self { slides })
    }

    /// The stock ten-slide exhibition deck
    pub fn standard() -> Self {
        let slides = [
            "welcome",
            "company",
            "products",
            "innovation",
            "technology",
            "references",
            "team",
            "career",
            "contact",
            "thanks",
        ]
        .iter()
        .enumerate()
        .map(|(idx, content)| {
            let mut name = content.to_string();
            name[..1].make_ascii_uppercase();
            SlideInfo::new(idx as u32 + 1, name, *content)
        })
        .collect();
        Self { slides }
    }

    pub fn count(&self) -> u32 {
        self.slides.len() as u32
    }

    pub fn contains(&self, id: i64) -> bool {
        id >= 1 && id <= i64::from(self.count())
    }

    pub fn get(&self, id: u32) -> Option<&SlideInfo> {
        id.checked_sub(1).and_then(|idx| self.slides.get(idx as usize))
    }

    pub fn name(&self, id: u32) -> Option<&str> {
        self.get(id).map(|s| s.name.as_str())
    }

    pub fn slides(&self) -> &[SlideInfo] {
        &self.slides
    }
}

impl Default for SlideCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
