//! One-time creation of the default appliance set.

use tracing::{debug, info};

use crate::appliances::model::Appliance;
use crate::appliances::service::ApplianceService;
use crate::error::ServiceError;
use crate::store::finish;

/// Metadata key recording that the defaults were seeded.
pub const SEED_SENTINEL_KEY: &str = "seed_defaults_done";

/// Appliances created on first start, with their cleaning intervals in days.
pub const DEFAULT_APPLIANCES: &[(&str, u32)] = &[
    ("Dishwasher", 30),
    ("Cat Fountain", 7),
    ("Washer", 14),
    ("Fridge Water Filter", 90),
    ("HVAC Filter", 60),
    ("Humidifier", 7),
    ("Litter Box Deep Clean", 14),
];

/// Create the default appliances unless that already happened once.
///
/// Does nothing when `auto` is false or the sentinel is set. Appliances that
/// already exist by name are left alone. Returns the appliances created by
/// this call.
pub async fn ensure_seed_defaults(
    service: &ApplianceService,
    auto: bool,
) -> Result<Vec<Appliance>, ServiceError> {
    if !auto {
        debug!("Default appliance seeding disabled");
        return Ok(Vec::new());
    }

    let db = service.db();
    let _guard = service.gate().acquire().await;
    db.begin().await?;
    let outcome = async {
        if db.get_meta(SEED_SENTINEL_KEY).await?.is_some() {
            return Ok(Vec::new());
        }

        let mut created = Vec::new();
        for (name, days) in DEFAULT_APPLIANCES {
            if db.find_appliance_by_name(name).await?.is_some() {
                continue;
            }
            created.push(service.create_in_unit(name, Some(*days)).await?);
        }
        db.put_meta_once(SEED_SENTINEL_KEY, "1").await?;
        Ok::<_, ServiceError>(created)
    }
    .await;
    let created = finish(db, outcome).await?;

    if !created.is_empty() {
        info!(count = created.len(), "Default appliances seeded");
    }
    Ok(created)
}
