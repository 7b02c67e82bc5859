//! Region scoping applied to fetched records.

use hivegate_auth::{User, authorize_region, can_access_region};
use hivegate_core::RegionId;

use crate::error::GatewayError;

/// Records that belong to exactly one region.
pub trait RegionScoped {
    /// `None` for a region record that has not been persisted yet.
    fn region(&self) -> Option<RegionId>;
}

/// Fail with `Forbidden` unless `user` may act on `record`.
///
/// An unsaved record has no region yet; only admins may act on it here.
pub fn ensure_region_access<'a, T, I>(user: &User, granted: I, record: &T) -> Result<(), GatewayError>
where
    T: RegionScoped,
    I: IntoIterator<Item = &'a RegionId>,
{
    match record.region() {
        Some(region) => authorize_region(user, granted, region).map_err(|err| {
            tracing::debug!(user_id = %user.id, region_id = %region, "region access denied");
            GatewayError::from(err)
        }),
        None if user.is_admin() => Ok(()),
        None => Err(GatewayError::Forbidden(
            "record is not assigned to a region".to_string(),
        )),
    }
}

/// Keep only the records `user` may see.
pub fn retain_in_scope<T: RegionScoped>(user: &User, granted: &[RegionId], records: &mut Vec<T>) {
    records.retain(|record| match record.region() {
        Some(region) => can_access_region(user.role, granted, region),
        None => user.is_admin(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::WeatherData;
    use hivegate_auth::Role;
    use hivegate_core::UserId;

    fn user(role: Role) -> User {
        User {
            id: UserId::new(3).unwrap(),
            username: "carol".to_string(),
            full_name: "Carol".to_string(),
            role,
            email: "carol@example.com".to_string(),
        }
    }

    fn weather(region: i64) -> WeatherData {
        WeatherData {
            weather_id: None,
            region_id: RegionId::new(region).unwrap(),
            date: None,
            temperature: 18.5,
            humidity: 60.0,
            wind_speed: 3.0,
            precipitation: 0.0,
        }
    }

    fn regions(ids: &[i64]) -> Vec<RegionId> {
        ids.iter().map(|id| RegionId::new(*id).unwrap()).collect()
    }

    #[test]
    fn workers_are_limited_to_granted_regions() {
        let worker = user(Role::Worker);
        let granted = regions(&[1, 2]);

        assert!(ensure_region_access(&worker, &granted, &weather(2)).is_ok());
        let err = ensure_region_access(&worker, &granted, &weather(5)).unwrap_err();
        assert!(matches!(err, GatewayError::Forbidden(_)));
    }

    #[test]
    fn admins_see_every_region() {
        let admin = user(Role::Admin);
        let mut records = vec![weather(1), weather(7), weather(9)];
        retain_in_scope(&admin, &[], &mut records);
        assert_eq!(records.len(), 3);
        assert!(ensure_region_access(&admin, &[], &weather(42)).is_ok());
    }

    #[test]
    fn out_of_scope_records_are_dropped() {
        let manager = user(Role::Manager);
        let mut records = vec![weather(1), weather(7), weather(2)];
        retain_in_scope(&manager, &regions(&[1, 2]), &mut records);

        let kept: Vec<i64> = records.iter().map(|w| w.region_id.get()).collect();
        assert_eq!(kept, vec![1, 2]);
    }
}
