//! Application services. Each one owns the rules of one area and talks to
//! storage only through [`Store`](crate::store::Store).

pub mod admin;
pub mod artists;
pub mod carts;
pub mod catalog;
pub mod events;
pub mod orders;
pub mod ratings;
pub mod reports;
pub mod returns;
pub mod rewards;
pub mod user_products;
pub mod users;
pub mod verification;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::UserRole;

pub use admin::AdminService;
pub use artists::ArtistService;
pub use carts::CartService;
pub use catalog::CatalogService;
pub use events::EventService;
pub use orders::OrderService;
pub use ratings::RatingService;
pub use reports::ReportService;
pub use returns::ReturnService;
pub use rewards::RewardService;
pub use user_products::UserProductService;
pub use users::UserService;
pub use verification::VerificationService;

const DEFAULT_PER_PAGE: u32 = 20;
const MAX_PER_PAGE: u32 = 100;

/// The authenticated caller of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: UserRole,
}

impl Actor {
    pub fn is_admin(&self) -> bool { self.role == UserRole::Admin }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ListParams {
    pub fn page(&self) -> u32 { self.page.unwrap_or(1).max(1) }
    pub fn per_page(&self) -> u32 { self.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE) }
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_params_clamp() {
        let p = ListParams { page: Some(0), per_page: Some(500) };
        assert_eq!((p.page(), p.per_page()), (1, 100));
        assert_eq!(ListParams::default().per_page(), 20);
    }
}
