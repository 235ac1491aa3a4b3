use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use tracing::{debug, warn};

use crate::session::{ContactRecord, Namespace, SessionClient};

/// Outcome of resolving a group author against the contact directory.
///
/// `found == false` is a resolution miss, not an error: the payload is
/// annotated and dispatch continues.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedContact {
    pub name: Option<String>,
    pub phone_number: Option<String>,
    pub found: bool,
}

/// Resolve a display name and, best effort, a phone number for `author_id`.
///
/// Group authors are not addressable as direct chats, so the phone number is
/// recovered from the first direct-namespace record sharing the author's
/// display name. Name collisions resolve to whichever comes first in
/// directory order.
pub fn resolve_by_author(directory: &[ContactRecord], author_id: &str) -> ResolvedContact {
    let name = directory
        .iter()
        .find(|c| c.id == author_id)
        .and_then(|c| c.name.clone());

    let phone_number = name.as_deref().and_then(|name| {
        directory
            .iter()
            .find(|c| {
                c.name.as_deref() == Some(name) && Namespace::of(&c.id) == Namespace::Direct
            })
            .and_then(|c| c.number.clone())
            .filter(|n| !n.is_empty())
    });

    ResolvedContact {
        found: phone_number.is_some(),
        name,
        phone_number,
    }
}

/// Contact directory view with an explicit snapshot TTL.
///
/// A TTL of zero fetches a fresh snapshot for every call. Only records
/// flagged `is_user` are kept.
pub struct ContactDirectory {
    session: Arc<dyn SessionClient>,
    cache: Option<Cache<(), Arc<Vec<ContactRecord>>>>,
}

impl ContactDirectory {
    pub fn new(session: Arc<dyn SessionClient>, ttl: Duration) -> Self {
        let cache = (!ttl.is_zero()).then(|| {
            Cache::builder()
                .max_capacity(1)
                .time_to_live(ttl)
                .build()
        });
        Self { session, cache }
    }

    /// Current directory snapshot. Fetch failures yield an empty snapshot
    /// (every lookup becomes a miss) and are not cached.
    pub async fn snapshot(&self) -> Arc<Vec<ContactRecord>> {
        if let Some(cache) = &self.cache
            && let Some(hit) = cache.get(&())
        {
            return hit;
        }

        match self.session.get_contacts().await {
            Ok(contacts) => {
                let users: Vec<ContactRecord> =
                    contacts.into_iter().filter(|c| c.is_user).collect();
                debug!("contact directory fetched: {} user records", users.len());
                let snapshot = Arc::new(users);
                if let Some(cache) = &self.cache {
                    cache.insert((), snapshot.clone());
                }
                snapshot
            }
            Err(e) => {
                warn!("failed to fetch contact directory: {}", e);
                Arc::new(Vec::new())
            }
        }
    }
}
