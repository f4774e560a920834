//! Clinic supplies: stock levels, adjustments and low-stock alerts.

use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clinic::{Announcement, Clinic};
use crate::error::{ClinicError, ClinicResult};
use crate::models::{AuditAction, InventoryItem, NewInventoryItem, Role, StockAdjustment};

impl Clinic {
    pub async fn create_inventory_item(&self, input: NewInventoryItem) -> ClinicResult<InventoryItem> {
        let item = InventoryItem::new(input)?;
        let name = item.name.to_lowercase();
        if self
            .db
            .inventory
            .count(|i| i.name.to_lowercase() == name)
            .await
            > 0
        {
            return Err(ClinicError::validation(format!(
                "Inventory item already exists: {}",
                item.name
            )));
        }

        let item = self.db.inventory.insert(item).await;
        info!(item = %item.id, name = %item.name, quantity = item.quantity, "inventory item added");
        self.audit(AuditAction::Created, "inventory", item.id, None).await;
        Ok(item)
    }

    pub async fn get_inventory_item(&self, id: Uuid) -> ClinicResult<InventoryItem> {
        self.db
            .inventory
            .get(id)
            .await
            .ok_or(ClinicError::not_found("Inventory item", id))
    }

    /// Items by name; with `low_only`, just those at or below their reorder level.
    pub async fn list_inventory(&self, low_only: bool) -> Vec<InventoryItem> {
        let mut items = self
            .db
            .inventory
            .find(|i| !low_only || i.is_low())
            .await;
        items.sort_by(|a, b| a.name.cmp(&b.name));
        items
    }

    /// Change an item's stock. Dropping to the reorder level alerts the
    /// front desk once per crossing.
    pub async fn adjust_stock(&self, id: Uuid, adjustment: StockAdjustment) -> ClinicResult<InventoryItem> {
        let (item, was_low) = self
            .db
            .inventory
            .update(id, |item| {
                let was_low = item.is_low();
                item.adjust(adjustment.delta).map(|()| was_low)
            })
            .await
            .ok_or(ClinicError::not_found("Inventory item", id))?;
        let was_low = was_low?;

        info!(item = %id, delta = adjustment.delta, quantity = item.quantity, "stock adjusted");
        self.audit(
            AuditAction::Updated,
            "inventory",
            id,
            Some(match &adjustment.reason {
                Some(reason) => format!("{:+} {} ({})", adjustment.delta, item.unit, reason),
                None => format!("{:+} {}", adjustment.delta, item.unit),
            }),
        )
        .await;

        if item.is_low() && !was_low {
            warn!(item = %id, name = %item.name, quantity = item.quantity, "stock low");
            let staff = self.users_with_roles(&[Role::Admin, Role::Staff]).await;
            self.announce(
                &staff,
                Announcement {
                    event: "inventory-low",
                    message: format!(
                        "{} is low on stock: {} {} left",
                        item.name, item.quantity, item.unit
                    ),
                    payload: json!({ "item_id": item.id, "quantity": item.quantity }),
                    email_subject: Some("Low stock"),
                },
            )
            .await;
        }
        Ok(item)
    }

    pub async fn delete_inventory_item(&self, id: Uuid) -> ClinicResult<InventoryItem> {
        let item = self
            .db
            .inventory
            .remove(id)
            .await
            .ok_or(ClinicError::not_found("Inventory item", id))?;
        info!(item = %id, "inventory item removed");
        self.audit(AuditAction::Deleted, "inventory", id, None).await;
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewUser;
    use crate::outbox::{LogMailer, OutboxWorker, RetryPolicy};
    use crate::presence::ConnectionRegistry;
    use std::sync::Arc;

    fn anesthetic(quantity: u32) -> NewInventoryItem {
        NewInventoryItem {
            name: "Lidocaine cartridges".to_string(),
            category: Some("Anesthetics".to_string()),
            unit: "cartridge".to_string(),
            quantity,
            reorder_level: 20,
            unit_cost: 120,
        }
    }

    async fn deliver(clinic: &Clinic) {
        OutboxWorker::new(
            clinic.outbox.clone(),
            clinic.db.clone(),
            ConnectionRegistry::new(),
            Arc::new(LogMailer),
            RetryPolicy::default(),
        )
        .run_once()
        .await;
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected() {
        let clinic = Clinic::in_memory();
        clinic.create_inventory_item(anesthetic(50)).await.unwrap();
        let mut again = anesthetic(5);
        again.name = "LIDOCAINE cartridges".to_string();
        let err = clinic.create_inventory_item(again).await.unwrap_err();
        assert!(matches!(err, ClinicError::Validation(_)));
    }

    #[tokio::test]
    async fn crossing_the_reorder_level_alerts_once() {
        let clinic = Clinic::in_memory();
        let desk = clinic
            .create_user(NewUser {
                link_id: None,
                name: "Reception".to_string(),
                email: "desk@clinic.test".to_string(),
                role: Role::Staff,
            })
            .await
            .unwrap();
        let item = clinic.create_inventory_item(anesthetic(25)).await.unwrap();

        let used = StockAdjustment {
            delta: -5,
            reason: Some("Root canal".to_string()),
        };
        let item = clinic.adjust_stock(item.id, used.clone()).await.unwrap();
        assert_eq!(item.quantity, 20);
        clinic.adjust_stock(item.id, used).await.unwrap();
        deliver(&clinic).await;
        let alerts = clinic.notifications_for(desk.id).await;
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].message.contains("low on stock"));

        assert_eq!(clinic.list_inventory(true).await.len(), 1);
        let err = clinic
            .adjust_stock(item.id, StockAdjustment { delta: -100, reason: None })
            .await
            .unwrap_err();
        assert!(matches!(err, ClinicError::Validation(_)));
        assert_eq!(clinic.get_inventory_item(item.id).await.unwrap().quantity, 15);

        let trail = clinic.audit_trail(Some(item.id)).await;
        assert!(trail
            .iter()
            .any(|e| e.detail.as_deref() == Some("-5 cartridge (Root canal)")));
    }
}
