//! Database migrations module

pub use sea_orm_migration::prelude::*;

mod m20250601_000001_create_venues;
mod m20250601_000002_create_slots;
mod m20250601_000003_create_customers;
mod m20250601_000004_create_reservations;
mod m20250601_000005_create_reservation_changes;
mod m20250601_000006_add_call_attribution;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250601_000001_create_venues::Migration),
            Box::new(m20250601_000002_create_slots::Migration),
            Box::new(m20250601_000003_create_customers::Migration),
            Box::new(m20250601_000004_create_reservations::Migration),
            Box::new(m20250601_000005_create_reservation_changes::Migration),
            Box::new(m20250601_000006_add_call_attribution::Migration),
        ]
    }
}
