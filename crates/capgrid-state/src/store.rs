//! StateStore — redb-backed state persistence for capgrid.
//!
//! Reads go straight through [`StateStore`], each in its own read
//! transaction. Mutations go through a [`StateTxn`]: a redb write
//! transaction wrapped as a unit of work. [`StateStore::transact`] runs a
//! closure against one and commits only if the closure returns `Ok`;
//! every other exit path aborts, so no partial state is ever visible.

use std::path::Path;
use std::sync::Arc;

use redb::{
    Database, ReadOnlyTable, ReadableDatabase, ReadableTable, Table, TableDefinition,
    TableHandle, WriteTransaction,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

type RecordTable = TableDefinition<'static, u64, &'static [u8]>;

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(ORGANIZATIONS).map_err(map_err!(Table))?;
        txn.open_table(USERS).map_err(map_err!(Table))?;
        txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
        txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
        txn.open_table(SEQUENCES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Units of work ──────────────────────────────────────────────

    /// Start a write transaction. Dropping it without `commit` aborts it.
    pub fn begin_write(&self) -> StateResult<StateTxn> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        Ok(StateTxn { txn })
    }

    /// Run `f` inside one write transaction.
    ///
    /// Commits when `f` returns `Ok`, aborts otherwise.
    pub fn transact<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&StateTxn) -> Result<T, E>,
        E: From<StateError>,
    {
        let txn = self.begin_write()?;
        match f(&txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort_err) = txn.abort() {
                    warn!(error = %abort_err, "failed to abort transaction");
                }
                Err(e)
            }
        }
    }

    fn read<T, F>(&self, def: RecordTable, f: F) -> StateResult<T>
    where
        F: FnOnce(&ReadOnlyTable<u64, &'static [u8]>) -> StateResult<T>,
    {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        f(&table)
    }

    // ── Users ──────────────────────────────────────────────────────

    pub fn get_user(&self, id: UserId) -> StateResult<Option<User>> {
        self.read(USERS, |t| get_record(&*t, id))
    }

    // ── Clusters ───────────────────────────────────────────────────

    pub fn get_cluster(&self, id: ClusterId) -> StateResult<Option<Cluster>> {
        self.read(CLUSTERS, |t| get_record(&*t, id))
    }

    /// Clusters owned by an organization, in id order.
    pub fn list_clusters_for_organization(
        &self,
        organization_id: OrganizationId,
    ) -> StateResult<Vec<Cluster>> {
        self.read(CLUSTERS, |t| {
            let all: Vec<Cluster> = scan_records(&*t)?;
            Ok(all
                .into_iter()
                .filter(|c| c.organization_id == organization_id)
                .collect())
        })
    }

    // ── Deployments ────────────────────────────────────────────────

    pub fn get_deployment(&self, id: DeploymentId) -> StateResult<Option<Deployment>> {
        self.read(DEPLOYMENTS, |t| get_record(&*t, id))
    }

    pub fn list_deployments_for_cluster(&self, cluster_id: ClusterId) -> StateResult<Vec<Deployment>> {
        self.list_deployments_for_clusters(&[cluster_id])
    }

    /// Deployments on any of the given clusters, in id order.
    pub fn list_deployments_for_clusters(
        &self,
        cluster_ids: &[ClusterId],
    ) -> StateResult<Vec<Deployment>> {
        self.read(DEPLOYMENTS, |t| {
            let all: Vec<Deployment> = scan_records(&*t)?;
            Ok(all
                .into_iter()
                .filter(|d| cluster_ids.contains(&d.cluster_id))
                .collect())
        })
    }

    /// Running deployments on a cluster, lowest priority first.
    pub fn list_running_deployments(&self, cluster_id: ClusterId) -> StateResult<Vec<Deployment>> {
        self.read(DEPLOYMENTS, |t| running_on(&*t, cluster_id))
    }
}

/// A write transaction over the state store.
///
/// Reads through a `StateTxn` observe its own uncommitted writes.
pub struct StateTxn {
    txn: WriteTransaction,
}

impl StateTxn {
    pub fn commit(self) -> StateResult<()> {
        self.txn.commit().map_err(map_err!(Transaction))
    }

    pub fn abort(self) -> StateResult<()> {
        self.txn.abort().map_err(map_err!(Transaction))
    }

    fn with_table<T, F>(&self, def: RecordTable, f: F) -> StateResult<T>
    where
        F: FnOnce(&mut Table<'_, u64, &'static [u8]>) -> StateResult<T>,
    {
        let mut table = self.txn.open_table(def).map_err(map_err!(Table))?;
        f(&mut table)
    }

    /// Allocate the next id for an entity table.
    pub fn next_id(&self, def: RecordTable) -> StateResult<u64> {
        let name = def.name();
        let mut table = self.txn.open_table(SEQUENCES).map_err(map_err!(Table))?;
        let current = table
            .get(name)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value())
            .unwrap_or(0);
        let next = current + 1;
        table.insert(name, next).map_err(map_err!(Write))?;
        Ok(next)
    }

    // ── Organizations ──────────────────────────────────────────────

    pub fn find_organization_by_name(&self, name: &str) -> StateResult<Option<Organization>> {
        self.with_table(ORGANIZATIONS, |t| {
            let all: Vec<Organization> = scan_records(&*t)?;
            Ok(all.into_iter().find(|o| o.name == name))
        })
    }

    pub fn find_organization_by_invite_code(&self, code: &str) -> StateResult<Option<Organization>> {
        self.with_table(ORGANIZATIONS, |t| {
            let all: Vec<Organization> = scan_records(&*t)?;
            Ok(all.into_iter().find(|o| o.invite_code == code))
        })
    }

    pub fn put_organization(&self, org: &Organization) -> StateResult<()> {
        self.with_table(ORGANIZATIONS, |t| put_record(t, org.id, org))?;
        debug!(id = org.id, name = %org.name, "organization stored");
        Ok(())
    }

    // ── Users ──────────────────────────────────────────────────────

    pub fn get_user(&self, id: UserId) -> StateResult<Option<User>> {
        self.with_table(USERS, |t| get_record(&*t, id))
    }

    /// First user whose username or email matches.
    pub fn find_user_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> StateResult<Option<User>> {
        self.with_table(USERS, |t| {
            let all: Vec<User> = scan_records(&*t)?;
            Ok(all
                .into_iter()
                .find(|u| u.username == username || u.email == email))
        })
    }

    pub fn put_user(&self, user: &User) -> StateResult<()> {
        self.with_table(USERS, |t| put_record(t, user.id, user))?;
        debug!(id = user.id, username = %user.username, "user stored");
        Ok(())
    }

    // ── Clusters ───────────────────────────────────────────────────

    pub fn get_cluster(&self, id: ClusterId) -> StateResult<Option<Cluster>> {
        self.with_table(CLUSTERS, |t| get_record(&*t, id))
    }

    pub fn put_cluster(&self, cluster: &Cluster) -> StateResult<()> {
        self.with_table(CLUSTERS, |t| put_record(t, cluster.id, cluster))?;
        debug!(
            id = cluster.id,
            available = %cluster.available(),
            "cluster stored"
        );
        Ok(())
    }

    /// Delete a cluster by id. Returns true if it existed.
    pub fn delete_cluster(&self, id: ClusterId) -> StateResult<bool> {
        let existed = self.with_table(CLUSTERS, |t| remove_record(t, id))?;
        debug!(id, existed, "cluster deleted");
        Ok(existed)
    }

    // ── Deployments ────────────────────────────────────────────────

    pub fn get_deployment(&self, id: DeploymentId) -> StateResult<Option<Deployment>> {
        self.with_table(DEPLOYMENTS, |t| get_record(&*t, id))
    }

    pub fn list_deployments_for_cluster(&self, cluster_id: ClusterId) -> StateResult<Vec<Deployment>> {
        self.with_table(DEPLOYMENTS, |t| {
            let all: Vec<Deployment> = scan_records(&*t)?;
            Ok(all
                .into_iter()
                .filter(|d| d.cluster_id == cluster_id)
                .collect())
        })
    }

    /// Running deployments on a cluster, lowest priority first.
    pub fn list_running_deployments(&self, cluster_id: ClusterId) -> StateResult<Vec<Deployment>> {
        self.with_table(DEPLOYMENTS, |t| running_on(&*t, cluster_id))
    }

    pub fn put_deployment(&self, deployment: &Deployment) -> StateResult<()> {
        self.with_table(DEPLOYMENTS, |t| put_record(t, deployment.id, deployment))?;
        debug!(
            id = deployment.id,
            cluster = deployment.cluster_id,
            status = ?deployment.status,
            "deployment stored"
        );
        Ok(())
    }

    /// Delete a deployment by id. Returns true if it existed.
    pub fn delete_deployment(&self, id: DeploymentId) -> StateResult<bool> {
        self.with_table(DEPLOYMENTS, |t| remove_record(t, id))
    }
}

// ── Record helpers ────────────────────────────────────────────────

fn get_record<T, R>(table: &R, id: u64) -> StateResult<Option<T>>
where
    T: DeserializeOwned,
    R: ReadableTable<u64, &'static [u8]>,
{
    match table.get(id).map_err(map_err!(Read))? {
        Some(guard) => {
            let record: T = serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
            Ok(Some(record))
        }
        None => Ok(None),
    }
}

fn scan_records<T, R>(table: &R) -> StateResult<Vec<T>>
where
    T: DeserializeOwned,
    R: ReadableTable<u64, &'static [u8]>,
{
    let mut results = Vec::new();
    for entry in table.iter().map_err(map_err!(Read))? {
        let (_, value) = entry.map_err(map_err!(Read))?;
        let record: T = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
        results.push(record);
    }
    Ok(results)
}

fn put_record<T: Serialize>(
    table: &mut Table<'_, u64, &'static [u8]>,
    id: u64,
    record: &T,
) -> StateResult<()> {
    let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
    table
        .insert(id, value.as_slice())
        .map_err(map_err!(Write))?;
    Ok(())
}

fn remove_record(table: &mut Table<'_, u64, &'static [u8]>, id: u64) -> StateResult<bool> {
    let existed = table.remove(id).map_err(map_err!(Write))?.is_some();
    Ok(existed)
}

/// Running deployments on `cluster_id`, ordered by ascending priority with
/// ties broken by ascending id.
fn running_on<R>(table: &R, cluster_id: ClusterId) -> StateResult<Vec<Deployment>>
where
    R: ReadableTable<u64, &'static [u8]>,
{
    let all: Vec<Deployment> = scan_records(table)?;
    let mut running: Vec<Deployment> = all
        .into_iter()
        .filter(|d| d.cluster_id == cluster_id && d.status == DeploymentStatus::Running)
        .collect();
    running.sort_by_key(|d| (d.priority, d.id));
    Ok(running)
}
