use async_trait::async_trait;

/// Live directory queries answered by the messaging gateway.
///
/// Implementations swallow their own failures: a lookup that cannot be
/// answered reports `None` and the caller falls back.
#[async_trait]
pub trait DirectoryLookup: Send + Sync {
    async fn group_subject(&self, group_jid: &str) -> Option<String>;

    async fn profile_picture_url(&self, jid: &str) -> Option<String>;
}
