pub mod showmojo;

pub use showmojo::ShowMojoClient;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::types::{Showing, ShowingsWindow};

/// Source of prospect showings for a date window, optionally for one property.
#[async_trait]
pub trait ShowingsProvider: Send + Sync + 'static {
    async fn fetch_showings(
        &self,
        window: ShowingsWindow,
        property_id: Option<&str>,
    ) -> Result<Vec<Showing>>;
}

/// Stand-in when no showings credentials are configured.
pub struct UnconfiguredShowings;

#[async_trait]
impl ShowingsProvider for UnconfiguredShowings {
    async fn fetch_showings(
        &self,
        _window: ShowingsWindow,
        _property_id: Option<&str>,
    ) -> Result<Vec<Showing>> {
        Err(AppError::UpstreamUnavailable(
            "showings provider is not configured (SHOWMOJO_EMAIL, SHOWMOJO_PASSWORD)".to_string(),
        ))
    }
}
