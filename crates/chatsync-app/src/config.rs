//! Coordinator configuration.

use chatsync_core::{FIRST_PAGE_SIZE, PAGE_SIZE, ValidationError, model::EXCERPT_LEN};

/// Stream coordinator configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Window of the first page of a paginated stream.
    pub first_page_size: usize,
    /// Window growth when the user scrolls to the edge.
    pub page_size: usize,
    /// Maximum characters kept in a chat's last-message excerpt.
    pub excerpt_len: usize,
    /// Keep chats with deleted metadata in the chat list, titled
    /// "Deleted chat", instead of hiding them.
    pub show_deleted_chats: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            first_page_size: FIRST_PAGE_SIZE,
            page_size: PAGE_SIZE,
            excerpt_len: EXCERPT_LEN,
            show_deleted_chats: false,
        }
    }
}

impl CoordinatorConfig {
    /// Check the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Config`] for a zero page size or excerpt
    /// length.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.first_page_size == 0 {
            return Err(ValidationError::Config("first_page_size must be positive".into()));
        }
        if self.page_size == 0 {
            return Err(ValidationError::Config("page_size must be positive".into()));
        }
        if self.excerpt_len == 0 {
            return Err(ValidationError::Config("excerpt_len must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.first_page_size, 10);
        assert_eq!(config.page_size, 10);
        assert_eq!(config.excerpt_len, 40);
        assert!(!config.show_deleted_chats);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let config = CoordinatorConfig { page_size: 0, ..CoordinatorConfig::default() };
        assert!(matches!(config.validate(), Err(ValidationError::Config(_))));
    }
}
