use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("blog `{blog}` not found")]
    BlogNotFound { blog: String },
}

impl DomainError {
    pub fn blog_not_found(blog: impl Into<String>) -> Self {
        Self::BlogNotFound { blog: blog.into() }
    }
}
