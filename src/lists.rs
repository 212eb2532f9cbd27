use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio_stream::wrappers::WatchStream;
use tokio_stream::Stream;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Result, SyncError};
use crate::models::{ContentKey, CustomList};
use crate::store::ListStore;

/// User-curated lists. All mutations go through one lock and are persisted
/// before the new list set is published.
pub struct CustomListStore {
    store: Arc<dyn ListStore>,
    lists: Mutex<BTreeMap<String, CustomList>>,
    updates: watch::Sender<Arc<Vec<CustomList>>>,
}

impl CustomListStore {
    pub async fn load(store: Arc<dyn ListStore>) -> Result<Self> {
        let lists: BTreeMap<_, _> = store
            .load_lists()
            .await?
            .into_iter()
            .map(|mut list| {
                list.member_count = list.members.len();
                (list.id.clone(), list)
            })
            .collect();
        info!("Loaded {} custom lists", lists.len());
        let (updates, _) = watch::channel(Arc::new(ordered(&lists)));
        Ok(Self {
            store,
            lists: Mutex::new(lists),
            updates,
        })
    }

    pub async fn create_list(
        &self,
        name: &str,
        description: Option<String>,
        is_public: bool,
    ) -> Result<CustomList> {
        let name = validate_name(name)?;
        let now = Utc::now();
        let list = CustomList {
            id: Uuid::new_v4().to_string(),
            name,
            description,
            is_public,
            created_at: now,
            updated_at: now,
            members: Vec::new(),
            member_count: 0,
        };

        let mut lists = self.lists.lock().await;
        self.store.save_list(&list).await?;
        lists.insert(list.id.clone(), list.clone());
        self.publish(&lists);
        info!("Created list '{}' ({})", list.name, list.id);
        Ok(list)
    }

    /// Applies name, description and visibility from `update`. Members are
    /// never taken from the argument.
    pub async fn update_list(&self, update: &CustomList) -> Result<CustomList> {
        let name = validate_name(&update.name)?;
        let mut lists = self.lists.lock().await;
        let current = lists
            .get(&update.id)
            .ok_or_else(|| SyncError::ListNotFound(update.id.clone()))?;
        if current.name == name
            && current.description == update.description
            && current.is_public == update.is_public
        {
            return Ok(current.clone());
        }

        let mut next = current.clone();
        next.name = name;
        next.description = update.description.clone();
        next.is_public = update.is_public;
        next.updated_at = Utc::now();
        self.commit(&mut lists, next).await
    }

    pub async fn delete_list(&self, list_id: &str) -> Result<()> {
        let mut lists = self.lists.lock().await;
        if !lists.contains_key(list_id) {
            debug!("List {} already gone", list_id);
            return Ok(());
        }
        self.store.delete_list(list_id).await?;
        lists.remove(list_id);
        self.publish(&lists);
        info!("Deleted list {}", list_id);
        Ok(())
    }

    pub async fn add_member(&self, list_id: &str, key: &ContentKey) -> Result<CustomList> {
        let mut lists = self.lists.lock().await;
        let current = lists
            .get(list_id)
            .ok_or_else(|| SyncError::ListNotFound(list_id.to_string()))?;
        if current.contains(key) {
            return Ok(current.clone());
        }
        let mut next = current.clone();
        next.members.push(key.clone());
        next.member_count = next.members.len();
        next.updated_at = Utc::now();
        debug!("Adding {} to list {}", key, list_id);
        self.commit(&mut lists, next).await
    }

    pub async fn remove_member(&self, list_id: &str, key: &ContentKey) -> Result<CustomList> {
        let mut lists = self.lists.lock().await;
        let current = lists
            .get(list_id)
            .ok_or_else(|| SyncError::ListNotFound(list_id.to_string()))?;
        if !current.contains(key) {
            return Ok(current.clone());
        }
        let mut next = current.clone();
        next.members.retain(|k| k != key);
        next.member_count = next.members.len();
        next.updated_at = Utc::now();
        debug!("Removing {} from list {}", key, list_id);
        self.commit(&mut lists, next).await
    }

    pub async fn get_list(&self, list_id: &str) -> Option<CustomList> {
        self.lists.lock().await.get(list_id).cloned()
    }

    /// All lists, most recently updated first.
    pub fn list_all(&self) -> Vec<CustomList> {
        self.updates.borrow().as_ref().clone()
    }

    pub fn lists_updates(&self) -> impl Stream<Item = Arc<Vec<CustomList>>> + Send + 'static {
        WatchStream::new(self.updates.subscribe())
    }

    async fn commit(
        &self,
        lists: &mut BTreeMap<String, CustomList>,
        next: CustomList,
    ) -> Result<CustomList> {
        self.store.save_list(&next).await?;
        lists.insert(next.id.clone(), next.clone());
        self.publish(lists);
        Ok(next)
    }

    fn publish(&self, lists: &BTreeMap<String, CustomList>) {
        let ordered = Arc::new(ordered(lists));
        self.updates.send_modify(|current| *current = ordered);
    }
}

fn ordered(lists: &BTreeMap<String, CustomList>) -> Vec<CustomList> {
    let mut all: Vec<_> = lists.values().cloned().collect();
    all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    all
}

fn validate_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(SyncError::InvalidList("list name must not be empty".to_string()));
    }
    Ok(trimmed.to_string())
}
