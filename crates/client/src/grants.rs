//! Per-user region grants on the server.

use async_trait::async_trait;

use hivegate_core::{RegionId, UserId};

use crate::error::GatewayError;
use crate::records::AllowedRegion;
use crate::resource::ResourceClient;

/// Add-one/remove-one access to a user's region grants.
#[async_trait]
pub trait RegionGrantStore: Send + Sync {
    /// Grant records currently held by `user`, as the server sees them.
    async fn granted(&self, user: UserId) -> Result<Vec<AllowedRegion>, GatewayError>;

    async fn grant(&self, user: UserId, region: RegionId) -> Result<AllowedRegion, GatewayError>;

    async fn revoke(&self, grant: &AllowedRegion) -> Result<(), GatewayError>;
}

/// Grants kept by the REST API:
/// `GET /api/user/:id/allowed-regions`, `POST /api/allowed-region`,
/// `DELETE /api/allowed-region/:id`.
#[derive(Clone)]
pub struct RestRegionGrants {
    client: ResourceClient,
}

impl RestRegionGrants {
    pub fn new(client: ResourceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RegionGrantStore for RestRegionGrants {
    async fn granted(&self, user: UserId) -> Result<Vec<AllowedRegion>, GatewayError> {
        let mut grants: Vec<AllowedRegion> = self
            .client
            .list_related("user", user, "allowed-regions")
            .await?;
        // Some server versions return every grant; keep the requested user's.
        grants.retain(|grant| grant.user_id == user);
        Ok(grants)
    }

    async fn grant(&self, user: UserId, region: RegionId) -> Result<AllowedRegion, GatewayError> {
        let record = AllowedRegion {
            id: None,
            user_id: user,
            region_id: region,
            region: None,
        };
        self.client.create(&record).await
    }

    async fn revoke(&self, grant: &AllowedRegion) -> Result<(), GatewayError> {
        let Some(id) = grant.id else {
            return Err(GatewayError::Validation(format!(
                "grant of region {} to user {} has no id",
                grant.region_id, grant.user_id
            )));
        };
        self.client.remove::<AllowedRegion>(id).await
    }
}
