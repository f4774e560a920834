//! In-memory record storage.
//!
//! Each collection is an independent `RwLock<HashMap>`. Writes to different
//! collections are not atomic with respect to each other.

use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{
    Appointment, AuditLog, Bill, DentalHistory, Doctor, Insurance, InventoryItem, Notification,
    Patient, Prescription, Staff, Treatment, User,
};

/// A stored record with a stable id.
pub trait Record: Clone + Send + Sync {
    fn id(&self) -> Uuid;
}

macro_rules! impl_record {
    ($($ty:ty),* $(,)?) => {
        $(impl Record for $ty {
            fn id(&self) -> Uuid {
                self.id
            }
        })*
    };
}

impl_record!(
    User,
    Patient,
    Doctor,
    Staff,
    Appointment,
    Treatment,
    Prescription,
    Bill,
    Insurance,
    DentalHistory,
    InventoryItem,
    Notification,
    AuditLog,
);

#[derive(Debug)]
pub struct Collection<T> {
    rows: RwLock<HashMap<Uuid, T>>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Collection {
            rows: RwLock::new(HashMap::new()),
        }
    }
}

impl<T: Record> Collection<T> {
    pub async fn insert(&self, record: T) -> T {
        self.rows.write().await.insert(record.id(), record.clone());
        record
    }

    pub async fn get(&self, id: Uuid) -> Option<T> {
        self.rows.read().await.get(&id).cloned()
    }

    /// Run `change` against the stored record and return the result.
    pub async fn update<R>(&self, id: Uuid, change: impl FnOnce(&mut T) -> R) -> Option<(T, R)> {
        let mut rows = self.rows.write().await;
        let record = rows.get_mut(&id)?;
        let out = change(record);
        Some((record.clone(), out))
    }

    pub async fn remove(&self, id: Uuid) -> Option<T> {
        self.rows.write().await.remove(&id)
    }

    pub async fn find(&self, predicate: impl Fn(&T) -> bool) -> Vec<T> {
        self.rows
            .read()
            .await
            .values()
            .filter(|r| predicate(r))
            .cloned()
            .collect()
    }

    pub async fn count(&self, predicate: impl Fn(&T) -> bool) -> usize {
        self.rows.read().await.values().filter(|r| predicate(r)).count()
    }

    pub async fn all(&self) -> Vec<T> {
        self.rows.read().await.values().cloned().collect()
    }
}

/// Every collection the clinic keeps.
#[derive(Debug, Default)]
pub struct Database {
    pub users: Collection<User>,
    pub patients: Collection<Patient>,
    pub doctors: Collection<Doctor>,
    pub staff: Collection<Staff>,
    pub appointments: Collection<Appointment>,
    pub treatments: Collection<Treatment>,
    pub prescriptions: Collection<Prescription>,
    pub bills: Collection<Bill>,
    pub insurances: Collection<Insurance>,
    pub dental_histories: Collection<DentalHistory>,
    pub inventory: Collection<InventoryItem>,
    pub notifications: Collection<Notification>,
    pub audit_logs: Collection<AuditLog>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewStaff, Staff};

    fn staff(name: &str) -> Staff {
        Staff::new(NewStaff {
            name: name.to_string(),
            email: format!("{}@clinic.test", name.to_lowercase()),
            phone: "555-0100".to_string(),
            position: "Reception".to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn insert_get_update_remove() {
        let collection = Collection::<Staff>::default();
        let row = collection.insert(staff("Mia")).await;

        assert_eq!(collection.get(row.id).await, Some(row.clone()));

        let (updated, old) = collection
            .update(row.id, |s| std::mem::replace(&mut s.position, "Manager".to_string()))
            .await
            .unwrap();
        assert_eq!(old, "Reception");
        assert_eq!(updated.position, "Manager");

        assert!(collection.remove(row.id).await.is_some());
        assert!(collection.get(row.id).await.is_none());
        assert!(collection.update(row.id, |_| ()).await.is_none());
    }

    #[tokio::test]
    async fn find_and_count_filter_rows() {
        let collection = Collection::<Staff>::default();
        collection.insert(staff("Mia")).await;
        collection.insert(staff("Leo")).await;

        assert_eq!(collection.count(|s| s.name.starts_with('M')).await, 1);
        assert_eq!(collection.find(|_| true).await.len(), 2);
        assert_eq!(collection.all().await.len(), 2);
    }
}
