//! Request-scoped tenancy: the active store slug rides a task-local so it is
//! inherited across awaits and dropped on every exit path, including panics
//! and cancellation. Tools never read process globals for tenancy.

use std::future::Future;

tokio::task_local! {
    static STORE_SLUG: Option<String>;
}

/// Run `future` with the given slug installed as the request scope.
pub async fn with_store_slug<F>(slug: Option<String>, future: F) -> F::Output
where
    F: Future,
{
    STORE_SLUG.scope(slug, future).await
}

/// The slug installed by the dispatcher for the current request, if any.
#[must_use]
pub fn current_store_slug() -> Option<String> {
    STORE_SLUG.try_with(Clone::clone).ok().flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scope_is_visible_inside_and_absent_outside() {
        assert_eq!(current_store_slug(), None);

        let seen = with_store_slug(Some("acme".to_string()), async {
            current_store_slug()
        })
        .await;
        assert_eq!(seen.as_deref(), Some("acme"));

        assert_eq!(current_store_slug(), None);
    }

    #[tokio::test]
    async fn scopes_nest_and_restore() {
        let (outer, inner) = with_store_slug(Some("outer".to_string()), async {
            let inner = with_store_slug(Some("inner".to_string()), async {
                current_store_slug()
            })
            .await;
            (current_store_slug(), inner)
        })
        .await;

        assert_eq!(outer.as_deref(), Some("outer"));
        assert_eq!(inner.as_deref(), Some("inner"));
    }

    #[tokio::test]
    async fn explicit_none_scope_reads_as_absent() {
        let seen = with_store_slug(None, async { current_store_slug() }).await;
        assert_eq!(seen, None);
    }
}
