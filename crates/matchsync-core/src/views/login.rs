use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::auth::AuthSession;
use crate::route::{Content, RenderContext, View};

/// Sign-in status. Rendered on every visit since it depends on session
/// state rather than on the location.
pub struct LoginView {
    auth: Arc<AuthSession>,
}

impl LoginView {
    pub fn new(auth: Arc<AuthSession>) -> Self {
        Self { auth }
    }
}

#[async_trait]
impl View for LoginView {
    async fn render(&self, ctx: &RenderContext) -> anyhow::Result<()> {
        let user = self.auth.current_user();
        ctx.commit(Content::Ready(json!({
            "view": "login",
            "signedIn": self.auth.token().is_some(),
            "user": user,
        })));
        Ok(())
    }

    fn always_render(&self) -> bool {
        true
    }
}
