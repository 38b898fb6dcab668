use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::slug::slugify;

const NAME_MAX: usize = 255;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub icon: Option<String>,
    pub description: Option<String>,
    /// Active products in the category
    pub product_count: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub slug: Option<String>,
    pub icon: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub icon: Option<String>,
    pub description: Option<String>,
}

fn validate_name(name: &str) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Category name is required".to_string());
    }
    if name.chars().count() > NAME_MAX {
        return Err(format!("Category name must be at most {} characters", NAME_MAX));
    }
    Ok(())
}

/// Slug from an explicit value, else from the name
pub fn category_slug(explicit: Option<&str>, name: &str) -> Result<String, String> {
    let source = explicit.map(str::trim).filter(|s| !s.is_empty()).unwrap_or(name);
    match slugify(source) {
        slug if slug.is_empty() => Err("Category slug cannot be empty".to_string()),
        slug => Ok(slug),
    }
}

impl CreateCategoryRequest {
    pub fn validate(&self) -> Result<String, String> {
        validate_name(&self.name)?;
        category_slug(self.slug.as_deref(), &self.name)
    }
}

impl UpdateCategoryRequest {
    /// New slug when the name or slug changes
    pub fn validate(&self) -> Result<Option<String>, String> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        match (self.slug.as_deref(), self.name.as_deref()) {
            (Some(slug), _) => category_slug(Some(slug), slug).map(Some),
            (None, Some(name)) => category_slug(None, name).map(Some),
            (None, None) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_from_name_or_explicit() {
        let req = CreateCategoryRequest {
            name: "Cà Phê Hạt".to_string(),
            slug: None,
            icon: None,
            description: None,
        };
        assert_eq!(req.validate(), Ok("ca-phe-hat".to_string()));

        let req = CreateCategoryRequest {
            slug: Some("Beans".to_string()),
            ..req
        };
        assert_eq!(req.validate(), Ok("beans".to_string()));
    }

    #[test]
    fn test_blank_name_is_rejected() {
        let req = CreateCategoryRequest {
            name: "   ".to_string(),
            slug: None,
            icon: None,
            description: None,
        };
        assert!(req.validate().is_err());
        assert!(category_slug(Some("!!!"), "x").is_err());
    }

    #[test]
    fn test_update_slug_follows_rename() {
        let rename = UpdateCategoryRequest {
            name: Some("Cold Brew".to_string()),
            ..Default::default()
        };
        assert_eq!(rename.validate(), Ok(Some("cold-brew".to_string())));

        let icon_only = UpdateCategoryRequest {
            icon: Some("cup".to_string()),
            ..Default::default()
        };
        assert_eq!(icon_only.validate(), Ok(None));
    }
}
