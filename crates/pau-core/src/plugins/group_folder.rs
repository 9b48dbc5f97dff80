//! Group Folder
//!
//! Groups keyed by folder-local name, each listing its member principal ids.
//! An inverse index maps every principal id to the groups it belongs to and
//! is kept as the exact transpose of the member lists.
//!
//! A group's full id is `owner_prefix + prefix + name`, where `owner_prefix`
//! is the prefix of the dispatcher serving the folder. Member ids and the
//! inverse index always use full ids, so a group can itself be a member of
//! another group in the same folder.
//!
//! Mutations are applied to a copy of the state, validated for membership
//! cycles, and only then swapped in, all under one write lock. A rejected
//! mutation leaves nothing behind.
//!
//! Cycle detection follows this folder's own inverse index only. A cycle
//! spanning two folders (A in one folder contains B in another, which
//! contains A) is accepted.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;
use pau_common::{Credentials, PrincipalInfo};
use std::collections::{HashMap, HashSet, VecDeque};
use std::iter;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{AuthError, Result};
use crate::events::{PrincipalCreated, PrincipalCreatedSubscriber};
use crate::plugin::{paginate, Authenticator, PrincipalIdStream, PrincipalSearch, SearchQuery};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupInformation {
    pub title: String,
    pub description: String,
    /// Member principal ids, in insertion order and without duplicates
    pub principals: Vec<String>,
}

impl GroupInformation {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            principals: Vec::new(),
        }
    }

    pub fn with_principals<I, S>(mut self, principals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.principals = dedup(principals.into_iter().map(Into::into));
        self
    }

    fn matches(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle) || self.description.to_lowercase().contains(needle)
    }
}

fn dedup(ids: impl Iterator<Item = String>) -> Vec<String> {
    ids.collect::<IndexSet<_>>().into_iter().collect()
}

#[derive(Debug, Clone, Default)]
struct GroupState {
    groups: IndexMap<String, GroupInformation>,
    /// principal id -> full group ids
    inverse: HashMap<String, IndexSet<String>>,
}

impl GroupState {
    fn link(&mut self, principal_id: &str, group_id: &str) {
        self.inverse
            .entry(principal_id.to_string())
            .or_default()
            .insert(group_id.to_string());
    }

    fn unlink(&mut self, principal_id: &str, group_id: &str) {
        if let Some(groups) = self.inverse.get_mut(principal_id) {
            groups.shift_remove(group_id);
            if groups.is_empty() {
                self.inverse.remove(principal_id);
            }
        }
    }

    /// Depth-first walk up the membership graph from `start`, tracking only
    /// the current path. Reaching a node already on the path is a cycle;
    /// reaching one seen on a different branch is not.
    fn check_cycles(&self, start: &str) -> Result<()> {
        let mut path: Vec<(&str, usize)> = vec![(start, 0)];

        while let Some(&(node, child)) = path.last() {
            let Some(parent) = self.inverse.get(node).and_then(|groups| groups.get_index(child)) else {
                path.pop();
                continue;
            };
            if let Some(top) = path.last_mut() {
                top.1 += 1;
            }

            if path.iter().any(|&(visiting, _)| visiting == parent.as_str()) {
                let mut cycle: Vec<String> = path.iter().map(|&(id, _)| id.to_string()).collect();
                cycle.push(parent.clone());
                return Err(AuthError::GroupCycle {
                    group_id: parent.clone(),
                    path: cycle,
                });
            }
            path.push((parent.as_str(), 0));
        }

        Ok(())
    }
}

pub struct GroupFolder {
    prefix: String,
    owner_prefix: String,
    state: Arc<RwLock<GroupState>>,
}

impl GroupFolder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            owner_prefix: String::new(),
            state: Arc::new(RwLock::new(GroupState::default())),
        }
    }

    /// Set the prefix of the dispatcher this folder is served by
    pub fn with_owner_prefix(mut self, owner_prefix: impl Into<String>) -> Self {
        self.owner_prefix = owner_prefix.into();
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn owner_prefix(&self) -> &str {
        &self.owner_prefix
    }

    /// Full id of the group named `name`
    pub fn group_id(&self, name: &str) -> String {
        format!("{}{}{}", self.owner_prefix, self.prefix, name)
    }

    fn name_from_group_id<'a>(&self, group_id: &'a str) -> Option<&'a str> {
        group_id
            .strip_prefix(self.owner_prefix.as_str())
            .and_then(|rest| rest.strip_prefix(self.prefix.as_str()))
    }

    /// Apply `change` to a copy of the state and commit it only if `change`
    /// succeeds and no membership cycle reaches `check_from`.
    fn mutate<T>(
        &self,
        change: impl FnOnce(&mut GroupState) -> Result<(T, Vec<String>)>,
    ) -> Result<T> {
        let mut state = self.state.write();
        let mut next = state.clone();
        let (value, check_from) = change(&mut next)?;

        for start in &check_from {
            if let Err(err) = next.check_cycles(start) {
                warn!(folder = %self.prefix, start = %start, error = %err, "Group membership change rejected");
                return Err(err);
            }
        }

        *state = next;
        Ok(value)
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    pub fn add_group(&self, name: &str, group: GroupInformation) -> Result<()> {
        let group_id = self.group_id(name);
        self.mutate(|state| {
            if state.groups.contains_key(name) {
                return Err(AuthError::duplicate("group", name));
            }
            let group = GroupInformation {
                principals: dedup(group.principals.into_iter()),
                ..group
            };
            for principal_id in &group.principals {
                state.link(principal_id, &group_id);
            }
            state.groups.insert(name.to_string(), group);
            Ok(((), vec![group_id.clone()]))
        })?;
        info!(group_id = %group_id, "Group added");
        Ok(())
    }

    pub fn remove_group(&self, name: &str) -> Result<GroupInformation> {
        let group_id = self.group_id(name);
        let removed = self.mutate(|state| {
            let group = state
                .groups
                .shift_remove(name)
                .ok_or_else(|| AuthError::GroupNotFound { id: group_id.clone() })?;
            for principal_id in &group.principals {
                state.unlink(principal_id, &group_id);
            }
            Ok((group, Vec::new()))
        })?;
        info!(group_id = %group_id, "Group removed");
        Ok(removed)
    }

    /// Replace the member list of a group
    pub fn set_principals<I, S>(&self, name: &str, principals: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let group_id = self.group_id(name);
        let wanted = dedup(principals.into_iter().map(Into::into));

        self.mutate(|state| {
            let old = state
                .groups
                .get(name)
                .map(|group| group.principals.clone())
                .ok_or_else(|| AuthError::GroupNotFound { id: group_id.clone() })?;

            for removed in old.iter().filter(|id| !wanted.contains(id)) {
                state.unlink(removed, &group_id);
            }
            for added in wanted.iter().filter(|id| !old.contains(id)) {
                state.link(added, &group_id);
            }
            if let Some(group) = state.groups.get_mut(name) {
                group.principals = wanted;
            }
            Ok(((), vec![group_id.clone()]))
        })?;
        debug!(group_id = %group_id, "Group members replaced");
        Ok(())
    }

    pub fn add_principal_to_group(&self, name: &str, principal_id: &str) -> Result<()> {
        let group_id = self.group_id(name);
        let added = self.mutate(|state| {
            let group = state
                .groups
                .get_mut(name)
                .ok_or_else(|| AuthError::GroupNotFound { id: group_id.clone() })?;
            if group.principals.iter().any(|id| id == principal_id) {
                return Ok((false, Vec::new()));
            }
            group.principals.push(principal_id.to_string());
            state.link(principal_id, &group_id);
            Ok((true, vec![group_id.clone()]))
        })?;
        if added {
            debug!(group_id = %group_id, principal_id = %principal_id, "Principal added to group");
        }
        Ok(())
    }

    pub fn remove_principal_from_group(&self, name: &str, principal_id: &str) -> Result<()> {
        let group_id = self.group_id(name);
        self.mutate(|state| {
            let group = state
                .groups
                .get_mut(name)
                .ok_or_else(|| AuthError::GroupNotFound { id: group_id.clone() })?;
            group.principals.retain(|id| id != principal_id);
            state.unlink(principal_id, &group_id);
            Ok(((), Vec::new()))
        })?;
        debug!(group_id = %group_id, principal_id = %principal_id, "Principal removed from group");
        Ok(())
    }

    /// Make `principal_id` a member of exactly `group_ids` among this folder's
    /// groups. Every id must be a full id of an existing group here.
    pub fn set_groups_for_principal<I, S>(&self, principal_id: &str, group_ids: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let wanted = dedup(group_ids.into_iter().map(Into::into));

        self.mutate(|state| {
            let mut wanted_names = Vec::with_capacity(wanted.len());
            for group_id in &wanted {
                match self.name_from_group_id(group_id) {
                    Some(name) if state.groups.contains_key(name) => wanted_names.push(name.to_string()),
                    _ => return Err(AuthError::InvalidGroupId { id: group_id.clone() }),
                }
            }

            let current: Vec<String> = state
                .inverse
                .get(principal_id)
                .map(|groups| groups.iter().cloned().collect())
                .unwrap_or_default();

            for group_id in current.iter().filter(|id| !wanted.contains(id)) {
                if let Some(name) = self.name_from_group_id(group_id) {
                    if let Some(group) = state.groups.get_mut(name) {
                        group.principals.retain(|id| id != principal_id);
                    }
                }
                state.unlink(principal_id, group_id);
            }
            for (group_id, name) in wanted.iter().zip(&wanted_names) {
                if current.contains(group_id) {
                    continue;
                }
                if let Some(group) = state.groups.get_mut(name.as_str()) {
                    group.principals.push(principal_id.to_string());
                }
                state.link(principal_id, group_id);
            }

            Ok(((), vec![principal_id.to_string()]))
        })?;
        debug!(principal_id = %principal_id, groups = wanted.len(), "Principal groups replaced");
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Direct groups of `principal_id`, as full group ids
    pub fn groups_for_principal(&self, principal_id: &str) -> Vec<String> {
        self.state
            .read()
            .inverse
            .get(principal_id)
            .map(|groups| groups.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every group reachable from `principal_id` through nested membership,
    /// nearest first.
    pub fn transitive_groups_for_principal(&self, principal_id: &str) -> Vec<String> {
        let state = self.state.read();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut ordered = Vec::new();
        let mut queue: VecDeque<&str> = VecDeque::from([principal_id]);

        while let Some(id) = queue.pop_front() {
            let Some(groups) = state.inverse.get(id) else {
                continue;
            };
            for group_id in groups {
                if seen.insert(group_id.as_str()) {
                    ordered.push(group_id.clone());
                    queue.push_back(group_id.as_str());
                }
            }
        }
        ordered
    }

    pub fn principals_for_group(&self, name: &str) -> Result<Vec<String>> {
        self.state
            .read()
            .groups
            .get(name)
            .map(|group| group.principals.clone())
            .ok_or_else(|| AuthError::GroupNotFound { id: self.group_id(name) })
    }

    pub fn get(&self, name: &str) -> Option<GroupInformation> {
        self.state.read().groups.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.state.read().groups.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().groups.is_empty()
    }
}

/// Groups never accept credentials; they are only looked up by id.
#[async_trait]
impl Authenticator for GroupFolder {
    async fn authenticate_credentials(&self, _credentials: &Credentials) -> Result<Option<PrincipalInfo>> {
        Ok(None)
    }

    async fn principal_info(&self, id: &str) -> Result<Option<PrincipalInfo>> {
        let Some(name) = id.strip_prefix(self.prefix.as_str()) else {
            return Ok(None);
        };
        let state = self.state.read();
        Ok(state
            .groups
            .get(name)
            .map(|group| PrincipalInfo::new(id, "", group.title.clone(), group.description.clone())))
    }
}

impl PrincipalSearch for GroupFolder {
    fn search(&self, query: &SearchQuery, start: Option<usize>, batch_size: Option<usize>) -> PrincipalIdStream {
        let Some(needle) = query.needle() else {
            return stream::empty().boxed();
        };

        let state = Arc::clone(&self.state);
        let prefix = self.prefix.clone();
        let mut index = 0;
        let matches = iter::from_fn(move || loop {
            let guard = state.read();
            let (name, group) = guard.groups.get_index(index)?;
            index += 1;
            if group.matches(&needle) {
                return Some(format!("{}{}", prefix, name));
            }
        });

        paginate(stream::iter(matches), start, batch_size)
    }
}

/// Principal-created hook filling `Principal::groups` from group folders.
#[derive(Default)]
pub struct GroupMembershipSubscriber {
    folders: RwLock<Vec<Arc<GroupFolder>>>,
}

impl GroupMembershipSubscriber {
    pub fn new(folders: Vec<Arc<GroupFolder>>) -> Self {
        Self {
            folders: RwLock::new(folders),
        }
    }

    pub fn add_folder(&self, folder: Arc<GroupFolder>) {
        self.folders.write().push(folder);
    }
}

#[async_trait]
impl PrincipalCreatedSubscriber for GroupMembershipSubscriber {
    async fn principal_created(&self, event: &mut PrincipalCreated<'_>) -> Result<()> {
        let folders = self.folders.read().clone();
        for folder in folders {
            for group_id in folder.groups_for_principal(&event.principal.id) {
                event.principal.add_group(group_id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder() -> GroupFolder {
        let folder = GroupFolder::new("groups.").with_owner_prefix("site.");
        folder
            .add_group("staff", GroupInformation::new("Staff", "Everyone").with_principals(["site.bob"]))
            .unwrap();
        folder
            .add_group("admins", GroupInformation::new("Admins", "Site managers"))
            .unwrap();
        folder
    }

    #[test]
    fn test_group_ids_carry_both_prefixes() {
        let folder = folder();
        assert_eq!(folder.group_id("staff"), "site.groups.staff");
        assert_eq!(folder.groups_for_principal("site.bob"), vec!["site.groups.staff"]);
    }

    #[test]
    fn test_set_principals_updates_inverse_index() {
        let folder = folder();
        folder.set_principals("staff", ["site.alice", "site.carol"]).unwrap();

        assert!(folder.groups_for_principal("site.bob").is_empty());
        assert_eq!(folder.groups_for_principal("site.alice"), vec!["site.groups.staff"]);
        assert_eq!(folder.principals_for_group("staff").unwrap(), vec!["site.alice", "site.carol"]);
    }

    #[test]
    fn test_remove_group_unlinks_members() {
        let folder = folder();
        folder.remove_group("staff").unwrap();
        assert!(folder.groups_for_principal("site.bob").is_empty());
        assert!(matches!(folder.remove_group("staff"), Err(AuthError::GroupNotFound { .. })));
    }

    #[test]
    fn test_self_membership_is_a_cycle() {
        let folder = folder();
        let err = folder.add_principal_to_group("staff", "site.groups.staff").unwrap_err();
        assert!(matches!(err, AuthError::GroupCycle { .. }));
        assert_eq!(folder.principals_for_group("staff").unwrap(), vec!["site.bob"]);
    }

    #[test]
    fn test_set_groups_for_principal() {
        let folder = folder();
        folder
            .set_groups_for_principal("site.bob", ["site.groups.admins"])
            .unwrap();

        assert_eq!(folder.groups_for_principal("site.bob"), vec!["site.groups.admins"]);
        assert!(folder.principals_for_group("staff").unwrap().is_empty());
        assert_eq!(folder.principals_for_group("admins").unwrap(), vec!["site.bob"]);
    }

    #[test]
    fn test_set_groups_for_principal_rejects_foreign_ids() {
        let folder = folder();
        for bad in ["groups.admins", "site.groups.missing", "site.other.admins"] {
            let err = folder.set_groups_for_principal("site.bob", [bad]).unwrap_err();
            assert!(matches!(err, AuthError::InvalidGroupId { .. }), "{bad}");
        }
        assert_eq!(folder.groups_for_principal("site.bob"), vec!["site.groups.staff"]);
    }

    #[tokio::test]
    async fn test_principal_info_for_groups() {
        let folder = folder();
        let info = folder.principal_info("groups.admins").await.unwrap().unwrap();
        assert_eq!(info.id, "groups.admins");
        assert_eq!(info.title, "Admins");
        assert!(folder.principal_info("admins").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_search_title_and_description() {
        let folder = folder();
        let ids: Vec<String> = folder.search(&SearchQuery::text("SITE"), None, None).collect().await;
        assert_eq!(ids, vec!["groups.admins"]);

        let all: Vec<String> = folder.search(&SearchQuery::text(""), Some(1), Some(5)).collect().await;
        assert_eq!(all, vec!["groups.admins"]);
    }
}
