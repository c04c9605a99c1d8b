//! Entity id → name resolution with a per-run cache.
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument};

use crate::ads::AdsService;
use crate::error::{ReportError, Result};
use crate::model::{EntityInfo, EntityKind};

/// Resolves and caches the entity listing of each kind. One resolver lives
/// for one downloader session; the cached maps are read-only once built.
#[derive(Debug, Default)]
pub struct EntityResolver {
    cache: HashMap<EntityKind, EntityInfo>,
}

impl EntityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Page through the listing for `kind` until the platform stops returning
    /// a cursor. Later calls for the same kind are served from the cache.
    #[instrument(skip_all, fields(kind = %kind))]
    pub async fn resolve(&mut self, service: &dyn AdsService, kind: EntityKind) -> Result<&EntityInfo> {
        if !self.cache.contains_key(&kind) {
            let info = fetch_all(service, kind).await?;
            info!(entities = info.len(), "resolved entity names");
            self.cache.insert(kind, info);
        }
        Ok(&self.cache[&kind])
    }

    pub fn cached(&self, kind: EntityKind) -> Option<&EntityInfo> {
        self.cache.get(&kind)
    }
}

async fn fetch_all(service: &dyn AdsService, kind: EntityKind) -> Result<EntityInfo> {
    let mut info = EntityInfo::default();
    let mut cursor: Option<String> = None;
    let mut seen = HashSet::new();
    let mut pages = 0usize;
    loop {
        let page = service.list_entities(kind, cursor.as_deref()).await?;
        pages += 1;
        debug!(page = pages, entities = page.entities.len(), "listing page");
        for (id, name) in page.entities {
            info.insert(id, name);
        }
        match page.next_cursor {
            Some(next) if !next.is_empty() => {
                if !seen.insert(next.clone()) {
                    return Err(ReportError::remote(
                        format!("list {}", kind.listing_path()),
                        format!("listing cursor {next} repeated after {pages} pages"),
                    ));
                }
                cursor = Some(next);
            }
            _ => break,
        }
    }
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityPage, JobDetails, JobId, JobRequest};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves three listing pages chained by cursor.
    #[derive(Default)]
    struct PagedListing {
        calls: AtomicUsize,
        cursors: std::sync::Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl AdsService for PagedListing {
        async fn list_entities(&self, _kind: EntityKind, cursor: Option<&str>) -> Result<EntityPage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.cursors.lock().unwrap().push(cursor.map(str::to_string));
            let page = match cursor {
                None => EntityPage {
                    entities: vec![("1".into(), Some("A".into())), ("2".into(), Some("B".into()))],
                    next_cursor: Some("p2".into()),
                },
                Some("p2") => EntityPage {
                    entities: vec![("3".into(), None)],
                    next_cursor: Some("p3".into()),
                },
                Some(_) => EntityPage {
                    entities: vec![],
                    next_cursor: None,
                },
            };
            Ok(page)
        }

        async fn create_job(&self, _request: &JobRequest) -> Result<JobId> {
            unreachable!()
        }

        async fn job_details(&self, _job_id: &str) -> Result<Option<JobDetails>> {
            unreachable!()
        }

        async fn download(&self, _url: &str) -> Result<Vec<u8>> {
            unreachable!()
        }
    }

    /// Every page points back at the same cursor.
    #[derive(Default)]
    struct CyclingListing {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AdsService for CyclingListing {
        async fn list_entities(&self, _kind: EntityKind, _cursor: Option<&str>) -> Result<EntityPage> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(EntityPage {
                entities: vec![(n.to_string(), None)],
                next_cursor: Some("same".into()),
            })
        }

        async fn create_job(&self, _request: &JobRequest) -> Result<JobId> {
            unreachable!()
        }

        async fn job_details(&self, _job_id: &str) -> Result<Option<JobDetails>> {
            unreachable!()
        }

        async fn download(&self, _url: &str) -> Result<Vec<u8>> {
            unreachable!()
        }
    }

    struct FailingListing;

    #[async_trait]
    impl AdsService for FailingListing {
        async fn list_entities(&self, _kind: EntityKind, _cursor: Option<&str>) -> Result<EntityPage> {
            Err(ReportError::remote("list campaigns", "unauthorized"))
        }

        async fn create_job(&self, _request: &JobRequest) -> Result<JobId> {
            unreachable!()
        }

        async fn job_details(&self, _job_id: &str) -> Result<Option<JobDetails>> {
            unreachable!()
        }

        async fn download(&self, _url: &str) -> Result<Vec<u8>> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn pages_until_cursor_is_exhausted_and_caches() {
        let service = PagedListing::default();
        let mut resolver = EntityResolver::new();

        let info = resolver.resolve(&service, EntityKind::Campaign).await.unwrap();
        assert_eq!(info.ids(), ["1".to_string(), "2".to_string(), "3".to_string()]);
        assert_eq!(info.name("1"), Some("A"));
        assert_eq!(info.name("3"), None);
        assert_eq!(service.calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            *service.cursors.lock().unwrap(),
            vec![None, Some("p2".to_string()), Some("p3".to_string())]
        );

        resolver.resolve(&service, EntityKind::Campaign).await.unwrap();
        assert_eq!(service.calls.load(Ordering::SeqCst), 3);
        assert!(resolver.cached(EntityKind::Campaign).is_some());
    }

    #[tokio::test]
    async fn listing_failure_propagates_and_is_not_cached() {
        let mut resolver = EntityResolver::new();
        let err = resolver
            .resolve(&FailingListing, EntityKind::Campaign)
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::RemoteApi { .. }));
        assert!(resolver.cached(EntityKind::Campaign).is_none());
    }

    #[tokio::test]
    async fn repeated_cursor_is_an_error_not_a_loop() {
        let service = CyclingListing::default();
        let mut resolver = EntityResolver::new();
        let err = resolver
            .resolve(&service, EntityKind::Campaign)
            .await
            .unwrap_err();
        match err {
            ReportError::RemoteApi { operation, message, .. } => {
                assert_eq!(operation, "list campaigns");
                assert!(message.contains("same"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(service.calls.load(Ordering::SeqCst), 2);
        assert!(resolver.cached(EntityKind::Campaign).is_none());
    }
}
