use std::convert::Infallible;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// The authenticated caller, as placed in request extensions by the auth layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestUser {
    pub id: i64,
    pub username: String,
}

/// Per-request scope threaded through the serializers.
///
/// A context without a user is legal: reads are then unfiltered, which is
/// what background jobs and fixtures rely on.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    pub user: Option<RequestUser>,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn for_user(user: RequestUser) -> Self {
        Self { user: Some(user) }
    }

    pub fn user_id(&self) -> Option<i64> {
        self.user.as_ref().map(|u| u.id)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self {
            user: parts.extensions.get::<RequestUser>().cloned(),
        })
    }
}
